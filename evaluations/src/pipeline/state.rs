use state_machines::state_machine;

state_machine! {
    name: EvaluationMachine,
    state: EvaluationState,
    initial: Ready,
    states: [Ready, InputsLoaded, CasesEvaluated, Summarized, Completed, Failed],
    events {
        load_inputs { transition: { from: Ready, to: InputsLoaded } }
        evaluate_cases { transition: { from: InputsLoaded, to: CasesEvaluated } }
        summarize { transition: { from: CasesEvaluated, to: Summarized } }
        finalize { transition: { from: Summarized, to: Completed } }
        abort {
            transition: { from: Ready, to: Failed }
            transition: { from: InputsLoaded, to: Failed }
            transition: { from: CasesEvaluated, to: Failed }
            transition: { from: Summarized, to: Failed }
            transition: { from: Completed, to: Failed }
        }
    }
}

pub fn ready() -> EvaluationMachine<(), Ready> {
    EvaluationMachine::new(())
}

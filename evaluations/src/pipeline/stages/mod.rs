mod evaluate_cases;
mod finalize;
mod load_inputs;
mod summarize;

pub(crate) use evaluate_cases::evaluate_cases;
pub(crate) use finalize::finalize;
pub(crate) use load_inputs::load_inputs;
pub(crate) use summarize::summarize;

use anyhow::Result;
use state_machines::core::GuardError;

use super::state::EvaluationMachine;

fn map_guard_error(event: &str, guard: GuardError) -> anyhow::Error {
    anyhow::anyhow!("invalid evaluation pipeline transition during {event}: {guard:?}")
}

type StageResult<S> = Result<EvaluationMachine<(), S>>;

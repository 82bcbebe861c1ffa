use crate::types::{BatchSummary, LatencyStats};

pub fn print_console_summary(summary: &BatchSummary) {
    let perf = &summary.performance;
    println!(
        "[perf] cases={} | skipped={} | concurrency={} | duration={}ms",
        summary.evaluated_cases, summary.skipped_cases, summary.concurrency, summary.duration_ms
    );
    println!("[perf] latency total {}", format_latency(&perf.latency_ms));
    println!(
        "[perf] latency retrieval {}",
        format_latency(&perf.retrieval_latency_ms)
    );
    println!("[perf] latency llm {}", format_latency(&perf.llm_latency_ms));
    println!(
        "[perf] tokens={} (embedding {}, input {}, output {}) | cost=${:.4}",
        perf.total_tokens,
        perf.embedding_tokens,
        perf.llm_input_tokens,
        perf.llm_output_tokens,
        perf.total_cost_usd
    );
    let stages = &summary.stage_timings;
    println!(
        "[perf] eval stage ms → load {} | evaluate {} | summarize {} | finalize {}",
        stages.load_inputs_ms, stages.evaluate_cases_ms, stages.summarize_ms, stages.finalize_ms
    );
}

fn format_latency(stats: &LatencyStats) -> String {
    format!(
        "avg {:.1}ms | p50 {}ms | p95 {}ms",
        stats.avg, stats.p50, stats.p95
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latency_format_is_compact() {
        let stats = LatencyStats {
            avg: 12.0,
            p50: 10,
            p95: 30,
        };
        assert_eq!(format_latency(&stats), "avg 12.0ms | p50 10ms | p95 30ms");
    }
}

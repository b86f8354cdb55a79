use tracing::trace;

// Counters are emitted as trace events; the Prometheus handle only renders
// what a recorder has collected.

pub fn inc_requests(route: &'static str) {
    trace!(target = "studio.metrics", route = route, "requests_total_inc");
}

pub fn stage_elapsed(stage: &'static str, elapsed_ms: u128) {
    trace!(
        target = "studio.metrics",
        stage = stage,
        elapsed_ms = elapsed_ms as u64,
        "stage_elapsed"
    );
}

pub fn stage_absorbed(stage: &'static str) {
    trace!(target = "studio.metrics", stage = stage, "stage_absorbed_total_inc");
}

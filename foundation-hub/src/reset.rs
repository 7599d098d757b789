//! Coordinated process-wide reset for testing.

use foundation_logging::{
    coordinator, reset_log_stream, reset_logging_state, reset_pipeline, set_in_reset,
};
use foundation_resilience::reset_all_circuit_breakers;

use crate::hub::get_hub;

/// Tears down every piece of process-wide foundation state, in an order
/// that is part of this function's contract:
///
/// 1. Set the in-reset flag: processors skip enrichment and the hub stops
///    emitting events, so nothing logged during teardown can re-trigger
///    initialization.
/// 2. Drop the pipeline configuration (processor chain, rate buckets).
/// 3. Restore the default log stream.
/// 4. Clear the hub's registries and its foundation-init flag.
/// 5. Reset the logger's lazy-init flag. This must come *after* the hub
///    clear: a pipeline lazily rebuilt by a stray log call during the
///    clear would otherwise survive the reset.
/// 6. Reset the event-set coordinator cache.
/// 7. Reset every registered circuit breaker to CLOSED.
/// 8. Clear the in-reset flag.
pub fn reset_foundation_state() {
    set_in_reset(true);

    reset_pipeline();
    reset_log_stream();

    let hub = get_hub();
    hub.clear(None);
    hub.reset_foundation_flag();

    reset_logging_state();
    coordinator().reset();
    reset_all_circuit_breakers();

    set_in_reset(false);
}

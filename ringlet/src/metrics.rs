//! Reactor metrics.
//!
//! Counters for submission and completion traffic plus pool pressure.
//! Registered statically with metriken; a single driver thread owns all
//! increments, so plain counters suffice.

use metriken::{Counter, Gauge, metric};

#[metric(name = "ringlet/sqe/submitted", description = "Total SQEs pushed to the ring")]
pub static SQE_SUBMITTED: Counter = Counter::new();

#[metric(name = "ringlet/cqe/processed", description = "Total CQEs reaped")]
pub static CQE_PROCESSED: Counter = Counter::new();

#[metric(
    name = "ringlet/submissions/refused",
    description = "Submissions refused because the reactor was stopping"
)]
pub static SUBMISSIONS_REFUSED: Counter = Counter::new();

#[metric(
    name = "ringlet/pool/exhausted_spins",
    description = "Allocation retries while the user-data pool was exhausted"
)]
pub static POOL_EXHAUSTED_SPINS: Counter = Counter::new();

#[metric(
    name = "ringlet/timeouts/fired",
    description = "Link-timeouts that fired and cancelled their operation"
)]
pub static LINK_TIMEOUTS_FIRED: Counter = Counter::new();

#[metric(
    name = "ringlet/ops/in_flight",
    description = "User-data blocks currently held by in-flight operations"
)]
pub static OPS_IN_FLIGHT: Gauge = Gauge::new();

//! Hand-rolled metrics primitives, in the spirit of the teacher's own
//! `linkerd2-metrics`/`http-metrics`: atomic counters/gauges plus a
//! registry that retains entries while they're live or recently
//! touched, pruning the rest on each scrape.

mod counter;
mod registry;

pub use counter::{Counter, Gauge};
pub use registry::{LinkMetrics, Registry};

//! Background outbound health probing and a status table, grounded on
//! the teacher's `app/outbound`/`control` health-check loop, modernized
//! onto `junction-task`'s periodic-task primitive.

pub mod observatory;
pub mod prober;
pub mod status;

pub use observatory::{Observatory, ProbeMode};
pub use prober::Prober;
pub use status::ObservationStatus;

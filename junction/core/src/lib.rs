//! Shared data model for the dispatch plane: destinations, sessions, the
//! error taxonomy, and timeout policy. Every other `junction-*` crate
//! depends on this one and nothing else in the workspace.

mod destination;
mod error;
mod policy;
mod session;

pub use destination::{Address, Destination, Network};
pub use error::{regex_error, Error, Result, Severity};
pub use policy::Policy;
pub use session::{next_session_id, Content, InboundDescriptor, OutboundDescriptor, Session, SpliceHint};

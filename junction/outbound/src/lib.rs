//! The outbound registry: a tag-indexed map of `OutboundHandler`s plus a
//! default slot and prefix-based selection, grounded on `leaf`'s
//! `app::outbound::manager` and the teacher's `app/outbound`.

pub mod handler;
pub mod manager;

pub use handler::{AsyncReadWrite, BoxedStream, OutboundHandler};
pub use manager::OutboundManager;

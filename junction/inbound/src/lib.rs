//! Inbound listener lifecycle: socket construction, per-transport
//! accept/recv workers, a UDP NAT table, and a tag-indexed manager.
//! Grounded on the teacher's `app/inbound` endpoint plumbing, with the
//! registry shape borrowed from `leaf`'s `app::outbound::manager`.

pub mod allocator;
pub mod handler;
pub mod manager;
pub mod nat;
pub mod socket_factory;
pub mod stream_settings;
pub mod worker;

pub use allocator::PortAllocator;
pub use handler::ConnectionHandler;
pub use manager::{InboundHandler, InboundManager};
pub use nat::NatTable;
pub use socket_factory::{LoopbackSocketFactory, SocketFactory, SystemSocketFactory};
pub use stream_settings::{recover_original_destination, StreamSettings};
pub use worker::{BindAddress, TcpWorker, UdpWorker, UnixWorker};

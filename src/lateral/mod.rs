//! Lateral Module
//!
//! Propagation of cache updates and invalidations to peer nodes over a
//! group channel. A node that cannot join keeps working locally.
//!
//! # Pieces
//! - `transport`: joins a group and moves frames
//! - `dispatcher`: broadcasts operations and applies inbound ones
//! - `connector`: bounded-time join producing a dispatcher

mod connector;
mod dispatcher;
mod listener;
mod message;
mod transport;

pub use connector::LateralConnector;
pub use dispatcher::RpcDispatcher;
pub use listener::LateralListener;
pub use message::{Envelope, LateralMessage, NodeId};
pub use transport::{
    FrameSink, GroupChannel, GroupTransport, MemoryTransport, UdpMulticastTransport,
};

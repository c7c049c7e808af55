//! Peer-to-peer networking
//!
//! Nodes exchange JSON messages over short TCP connections. Every peer has
//! its own outbound queue, and received chains are only adopted when they
//! carry more cumulative difficulty than the local one.

pub mod message;
pub mod node;
pub mod peers;
pub mod server;

pub use message::{send_message, Message};
pub use node::{BlockCheck, Node};
pub use peers::Peers;
pub use server::Server;

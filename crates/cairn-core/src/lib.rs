//! cairn-core — wire format, address matching, and configuration.
//! All other Cairn crates depend on this one.

pub mod addr;
pub mod config;
pub mod fingerprint;
pub mod packet;

pub use packet::{extract_id, MessageType, Packet, PacketBuilder, SigAlgo, WireError};

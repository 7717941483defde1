//! parley-protocol: Shared wire definitions for client-server communication
//!
//! This crate defines the message types and line-oriented JSON codec used
//! for communication between the parley client and relay server over TCP.

pub mod codec;
pub mod messages;

// Re-export main types at crate root
pub use codec::{ClientCodec, CodecError, ServerCodec, MAX_FRAME_SIZE};
pub use messages::{ClientFrame, ServerFrame};

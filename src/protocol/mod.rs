//! STOMP wire protocol
//!
//! Clients speak STOMP 1.2 over a WebSocket. Each text or binary WebSocket
//! message carries one or more frames (or part of one); the decoder buffers
//! across message boundaries.

pub mod constants;
pub mod frame;
pub mod ws;

pub use frame::{Command, Frame, FrameDecoder};

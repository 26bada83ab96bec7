//! Streaming helpers shared by the transport backends.

pub mod progress;

//! Real-time speech-to-text streaming server: a `whisper-rs` backed
//! `Transcriber` plus the TCP/WebSocket server wiring it into
//! `ears-streaming`'s session engine.

pub mod asr;
pub mod server;

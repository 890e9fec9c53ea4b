//! Streaming strategies, the capability traits they're built on, and the
//! per-connection session state machine.

mod capability;
mod config;
mod error;
mod session;
mod strategy;
mod strategies;

pub use capability::{
    NativeStream, NativeStreamUpdate, NativeStreamingTranscriber, TranscribeOutput, TranscribeRequest, Transcriber,
    TranscriberCapabilities, TranscriberError,
};
pub use config::StreamingConfig;
pub use error::{FinalizeError, StreamingError};
pub use session::{SessionState, StreamingMetrics, StreamingSession};
pub use strategy::{StreamingResult, StreamingStrategy};
pub use strategies::{select_strategy, ChunkedStrategy, LocalAgreementStrategy, NativeStrategy, TranscriberHandle};

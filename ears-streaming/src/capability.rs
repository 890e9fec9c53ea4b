//! The `Transcriber` capability: the boundary between the streaming core
//! and whatever ASR backend is actually running (Whisper, a native
//! streaming model, anything with the same shape).

use ears_hypothesis::TimestampedWord;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TranscriberError {
    #[error("transcription backend failed: {0}")]
    Backend(String),
    #[error("native stream closed unexpectedly")]
    StreamClosed,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TranscriberCapabilities {
    /// The backend exposes a scoped streaming context (`NativeStreamingTranscriber`).
    pub native_streaming: bool,
    /// The backend returns per-word timestamps, enabling LocalAgreement.
    pub word_timestamps: bool,
    /// The backend can only be invoked by one caller at a time process-wide
    /// (single-device GPU/MLX), requiring the server's serialization semaphore.
    pub requires_exclusive_access: bool,
}

pub struct TranscribeRequest<'a> {
    pub wav_bytes: &'a [u8],
    pub prompt: &'a str,
    pub language_hint: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct TranscribeOutput {
    pub text: String,
    /// Per-word timestamps, if the backend provides them. Absent for
    /// backends the Chunked strategy is selected for.
    pub words: Option<Vec<TimestampedWord>>,
    pub audio_duration_seconds: f64,
    pub language: String,
}

/// A batch transcriber: one full-window call in, one hypothesis out.
pub trait Transcriber: Send + Sync {
    fn capabilities(&self) -> TranscriberCapabilities;
    fn transcribe(&self, request: TranscribeRequest<'_>) -> Result<TranscribeOutput, TranscriberError>;
}

#[derive(Debug, Clone, Default)]
pub struct NativeStreamUpdate {
    pub finalized: String,
    pub draft: String,
}

/// A scoped incremental-decoding resource. Dropping it without calling
/// `finalize` still releases whatever it holds, since `Drop` runs on every
/// exit path including abort and panic unwind.
pub trait NativeStream: Send {
    fn feed(&mut self, audio: &[f32]) -> Result<NativeStreamUpdate, TranscriberError>;
    fn finalize(self: Box<Self>) -> Result<NativeStreamUpdate, TranscriberError>;
}

/// A transcriber offering a native streaming context in addition to the
/// batch interface its `Transcriber` supertrait provides.
pub trait NativeStreamingTranscriber: Transcriber {
    fn open_stream(&self) -> Result<Box<dyn NativeStream>, TranscriberError>;
}

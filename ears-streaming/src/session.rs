//! The per-connection state machine: owns exactly one strategy, which owns
//! its own buffers. No session ever shares mutable state with another.

use std::time::Instant;

use crate::error::{FinalizeError, StreamingError};
use crate::strategy::{StreamingResult, StreamingStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
    Finalizing,
    Completed,
    Error,
}

impl SessionState {
    fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Active => "Active",
            SessionState::Finalizing => "Finalizing",
            SessionState::Completed => "Completed",
            SessionState::Error => "Error",
        }
    }
}

/// Ambient observability, not part of the core algorithm: counters a caller
/// can expose on a status endpoint or log at session end.
#[derive(Debug, Clone, Default)]
pub struct StreamingMetrics {
    pub chunks_received: u64,
    pub transcriptions_run: u64,
    pub total_transcription_time_ms: u64,
    pub confirmed_word_count: usize,
}

impl StreamingMetrics {
    pub fn average_transcription_time_ms(&self) -> f64 {
        if self.transcriptions_run == 0 {
            0.0
        } else {
            self.total_transcription_time_ms as f64 / self.transcriptions_run as f64
        }
    }
}

pub struct StreamingSession {
    state: SessionState,
    strategy: Box<dyn StreamingStrategy>,
    sample_rate: u32,
    session_timeout_seconds: f64,
    start_time: Option<Instant>,
    last_activity_time: Instant,
    total_audio_seconds: f64,
    metrics: StreamingMetrics,
}

impl StreamingSession {
    pub fn new(strategy: Box<dyn StreamingStrategy>, sample_rate: u32, session_timeout_seconds: f64) -> Self {
        Self {
            state: SessionState::Idle,
            strategy,
            sample_rate,
            session_timeout_seconds,
            start_time: None,
            last_activity_time: Instant::now(),
            total_audio_seconds: 0.0,
            metrics: StreamingMetrics::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn metrics(&self) -> &StreamingMetrics {
        &self.metrics
    }

    pub fn total_audio_seconds(&self) -> f64 {
        self.total_audio_seconds
    }

    /// Idle → Active, or a no-op if already active. Called explicitly or
    /// implicitly by the first `process_chunk`.
    pub fn start(&mut self) {
        if self.state == SessionState::Idle {
            self.state = SessionState::Active;
            self.start_time = Some(Instant::now());
        }
    }

    pub fn process_chunk(&mut self, chunk: &[f32]) -> Result<StreamingResult, StreamingError> {
        if self.state == SessionState::Idle {
            self.start();
        }
        if self.state != SessionState::Active {
            return Err(StreamingError::NotActive { state: self.state.as_str() });
        }

        let now = Instant::now();
        let idle_seconds = now.duration_since(self.last_activity_time).as_secs_f64();
        if idle_seconds > self.session_timeout_seconds {
            self.strategy.cleanup();
            self.state = SessionState::Error;
            return Err(StreamingError::SessionTimeout { idle_seconds });
        }

        let result = self.strategy.process_audio(chunk)?;
        self.last_activity_time = now;
        self.total_audio_seconds += chunk.len() as f64 / self.sample_rate as f64;
        self.metrics.chunks_received += 1;
        self.metrics.confirmed_word_count = result.confirmed_word_count;
        if result.processing_time_ms > 0 {
            self.metrics.transcriptions_run += 1;
            self.metrics.total_transcription_time_ms += result.processing_time_ms;
        }
        Ok(result)
    }

    /// Finalize and move to `Completed`. Idempotent only in the sense that a
    /// second call always fails with `AlreadyFinalized` — it never re-runs
    /// the transcriber. On failure, the error carries the best-effort
    /// confirmed text the strategy had accumulated before the failure.
    pub fn finalize(&mut self) -> Result<StreamingResult, FinalizeError> {
        match self.state {
            SessionState::Completed | SessionState::Finalizing => {
                return Err(FinalizeError {
                    source: StreamingError::AlreadyFinalized,
                    confirmed_text: self.strategy.confirmed_text_snapshot(),
                })
            }
            SessionState::Error => {
                return Err(FinalizeError {
                    source: StreamingError::NotActive { state: self.state.as_str() },
                    confirmed_text: self.strategy.confirmed_text_snapshot(),
                })
            }
            SessionState::Idle | SessionState::Active => {}
        }

        self.state = SessionState::Finalizing;
        match self.strategy.finalize() {
            Ok(result) => {
                self.state = SessionState::Completed;
                self.metrics.confirmed_word_count = result.confirmed_word_count;
                if result.processing_time_ms > 0 {
                    self.metrics.transcriptions_run += 1;
                    self.metrics.total_transcription_time_ms += result.processing_time_ms;
                }
                Ok(result)
            }
            Err(err) => {
                let confirmed_text = self.strategy.confirmed_text_snapshot();
                self.state = SessionState::Error;
                Err(FinalizeError { source: err, confirmed_text })
            }
        }
    }

    /// Abort from any non-terminal state. Idempotent: aborting twice, or
    /// aborting a completed session, is a no-op.
    pub fn abort(&mut self) {
        if matches!(self.state, SessionState::Error | SessionState::Completed) {
            return;
        }
        self.strategy.cleanup();
        self.state = SessionState::Error;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{TranscribeOutput, TranscribeRequest, Transcriber, TranscriberCapabilities};
    use crate::config::StreamingConfig;
    use crate::strategies::ChunkedStrategy;
    use std::sync::Arc;

    struct EchoTranscriber;
    impl Transcriber for EchoTranscriber {
        fn capabilities(&self) -> TranscriberCapabilities {
            TranscriberCapabilities::default()
        }
        fn transcribe(&self, _r: TranscribeRequest<'_>) -> Result<TranscribeOutput, crate::capability::TranscriberError> {
            Ok(TranscribeOutput { text: "ok".into(), words: None, audio_duration_seconds: 0.5, language: "en".into() })
        }
    }

    fn session() -> StreamingSession {
        let strategy = Box::new(ChunkedStrategy::new(Arc::new(EchoTranscriber), &StreamingConfig::default()));
        StreamingSession::new(strategy, 16_000, 30.0)
    }

    #[test]
    fn first_chunk_transitions_idle_to_active() {
        let mut s = session();
        assert_eq!(s.state(), SessionState::Idle);
        s.process_chunk(&[0.0; 8_000]).unwrap();
        assert_eq!(s.state(), SessionState::Active);
    }

    #[test]
    fn finalize_twice_fails_the_second_time_without_retranscribing() {
        let mut s = session();
        s.process_chunk(&[0.0; 8_000]).unwrap();
        s.finalize().unwrap();
        assert_eq!(s.state(), SessionState::Completed);
        let err = s.finalize().unwrap_err();
        assert!(matches!(err.source, StreamingError::AlreadyFinalized));
    }

    #[test]
    fn idle_timeout_runs_cleanup_and_moves_to_error() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct CleanupTrackingStrategy {
            cleanup_calls: Arc<AtomicUsize>,
        }
        impl StreamingStrategy for CleanupTrackingStrategy {
            fn process_audio(&mut self, _chunk: &[f32]) -> Result<StreamingResult, StreamingError> {
                Ok(StreamingResult::default())
            }
            fn finalize(&mut self) -> Result<StreamingResult, StreamingError> {
                Ok(StreamingResult::default())
            }
            fn cleanup(&mut self) {
                self.cleanup_calls.fetch_add(1, Ordering::SeqCst);
            }
            fn confirmed_text_snapshot(&self) -> String {
                String::new()
            }
        }

        let cleanup_calls = Arc::new(AtomicUsize::new(0));
        let strategy = Box::new(CleanupTrackingStrategy { cleanup_calls: Arc::clone(&cleanup_calls) });
        let mut s = StreamingSession::new(strategy, 16_000, 0.05);
        s.process_chunk(&[0.0; 1_000]).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(80));
        let err = s.process_chunk(&[0.0; 1_000]).unwrap_err();
        assert!(matches!(err, StreamingError::SessionTimeout { .. }));
        assert_eq!(s.state(), SessionState::Error);
        assert_eq!(cleanup_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn abort_is_idempotent() {
        let mut s = session();
        s.process_chunk(&[0.0; 8_000]).unwrap();
        s.abort();
        assert_eq!(s.state(), SessionState::Error);
        s.abort();
        assert_eq!(s.state(), SessionState::Error);
    }

    #[test]
    fn abort_after_completion_is_a_no_op() {
        let mut s = session();
        s.process_chunk(&[0.0; 8_000]).unwrap();
        s.finalize().unwrap();
        s.abort();
        assert_eq!(s.state(), SessionState::Completed);
    }

    #[test]
    fn a_fatal_finalize_error_carries_the_best_effort_confirmed_text() {
        struct FailsOnFinalize {
            confirmed_text: String,
        }
        impl StreamingStrategy for FailsOnFinalize {
            fn process_audio(&mut self, _chunk: &[f32]) -> Result<StreamingResult, StreamingError> {
                self.confirmed_text = "hello world".into();
                Ok(StreamingResult::default())
            }
            fn finalize(&mut self) -> Result<StreamingResult, StreamingError> {
                Err(StreamingError::TranscriberFailed(crate::capability::TranscriberError::Backend(
                    "gone".into(),
                )))
            }
            fn cleanup(&mut self) {}
            fn confirmed_text_snapshot(&self) -> String {
                self.confirmed_text.clone()
            }
        }

        let strategy = Box::new(FailsOnFinalize { confirmed_text: String::new() });
        let mut s = StreamingSession::new(strategy, 16_000, 30.0);
        s.process_chunk(&[0.0; 8_000]).unwrap();
        let err = s.finalize().unwrap_err();
        assert_eq!(err.confirmed_text, "hello world");
        assert!(matches!(err.source, StreamingError::TranscriberFailed(_)));
        assert_eq!(s.state(), SessionState::Error);
    }

    #[test]
    fn metrics_track_chunks_and_confirmed_words() {
        let mut s = session();
        s.process_chunk(&[0.0; 8_000]).unwrap();
        s.process_chunk(&[0.0; 8_000]).unwrap();
        assert_eq!(s.metrics().chunks_received, 2);
        assert!(s.total_audio_seconds() > 0.0);
    }
}

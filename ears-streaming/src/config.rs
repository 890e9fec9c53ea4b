//! Tunables for the streaming strategies and session orchestrator.
//!
//! These exist as configuration rather than hard-coded constants because
//! the defaults below (overlap tolerance, trim back-off) are empirically
//! chosen, not physical constants.

#[derive(Debug, Clone)]
pub struct StreamingConfig {
    pub sample_rate: u32,
    /// Maximum seconds of audio kept in the sliding window.
    pub max_buffer_seconds: f64,
    /// `N` in LocalAgreement-N: a word confirms once it survives this many
    /// consecutive hypotheses unchanged.
    pub agreement_n: usize,
    /// Minimum new samples between successive transcriber invocations.
    pub transcribe_interval_samples: usize,
    /// Max length of the continuity prompt handed to the transcriber.
    pub prompt_suffix_chars: usize,
    /// Tolerance for matching a new hypothesis's leading words against
    /// already-confirmed text at a window boundary.
    pub overlap_tolerance_seconds: f64,
    /// Safety back-off applied when trimming buffers after a confirmation,
    /// so a word isn't cut mid-utterance.
    pub trim_backoff_seconds: f64,
    /// Idle time after which an active session is aborted with a timeout.
    pub session_timeout_seconds: f64,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            max_buffer_seconds: 30.0,
            agreement_n: 2,
            transcribe_interval_samples: 8_000, // 0.5s @ 16kHz
            prompt_suffix_chars: 200,
            overlap_tolerance_seconds: 0.1,
            trim_backoff_seconds: 1.0,
            session_timeout_seconds: 30.0,
        }
    }
}

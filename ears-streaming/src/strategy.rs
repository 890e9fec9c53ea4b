use ears_hypothesis::TimestampedWord;

use crate::error::StreamingError;

#[derive(Debug, Clone, Default)]
pub struct StreamingResult {
    pub confirmed_text: String,
    pub tentative_text: String,
    pub is_final: bool,
    pub confirmed_word_count: usize,
    pub tentative_word_count: usize,
    pub audio_duration_seconds: f64,
    pub processing_time_ms: u64,
}

/// The common contract all three streaming strategies implement.
pub trait StreamingStrategy: Send {
    fn process_audio(&mut self, chunk: &[f32]) -> Result<StreamingResult, StreamingError>;
    fn finalize(&mut self) -> Result<StreamingResult, StreamingError>;
    fn cleanup(&mut self);

    /// The best-effort confirmed text accumulated so far, independent of
    /// whether `finalize` itself succeeds. Used to attach partial output to
    /// a fatal finalize error instead of losing it.
    fn confirmed_text_snapshot(&self) -> String;
}

/// Divide `text` evenly across its whitespace-split tokens over
/// `duration_seconds`, for backends that don't return word timestamps.
/// Confidence is fixed at 0.8, matching the synthesized-timestamp fallback.
pub(crate) fn synthesize_words(text: &str, duration_seconds: f64) -> Vec<TimestampedWord> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.is_empty() {
        return Vec::new();
    }
    let span = duration_seconds / tokens.len() as f64;
    tokens
        .iter()
        .enumerate()
        .map(|(i, token)| {
            let start = i as f64 * span;
            let end = start + span;
            TimestampedWord::new(*token, start, end, 0.8)
        })
        .collect()
}

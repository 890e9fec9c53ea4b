use std::sync::Arc;
use std::time::Instant;

use ears_audio::AudioBuffer;

use tracing::warn;

use crate::capability::{Transcriber, TranscribeRequest};
use crate::config::StreamingConfig;
use crate::error::StreamingError;
use crate::strategy::{StreamingResult, StreamingStrategy};

/// Fallback for transcribers with no word timestamps: each batch
/// transcription's full text directly replaces `confirmed_text`. There is no
/// stability algorithm, so a later transcription can rewrite an earlier
/// word — callers relying on a monotone confirmed prefix should pick a
/// transcriber with word timestamps instead.
pub struct ChunkedStrategy {
    audio: AudioBuffer,
    transcriber: Arc<dyn Transcriber>,
    transcribe_interval_samples: usize,
    last_transcribed_at: u64,
    last_processing_time_ms: u64,
    confirmed_text: String,
}

impl ChunkedStrategy {
    pub fn new(transcriber: Arc<dyn Transcriber>, config: &StreamingConfig) -> Self {
        Self {
            audio: AudioBuffer::new(config.max_buffer_seconds, config.sample_rate),
            transcriber,
            transcribe_interval_samples: config.transcribe_interval_samples,
            last_transcribed_at: 0,
            last_processing_time_ms: 0,
            confirmed_text: String::new(),
        }
    }

    fn transcribe_once(&mut self) -> Result<(), StreamingError> {
        let wav_bytes = self.audio.to_wav_bytes();
        let started = Instant::now();
        let output = self.transcriber.transcribe(TranscribeRequest {
            wav_bytes: &wav_bytes,
            prompt: "",
            language_hint: None,
        })?;
        self.last_processing_time_ms = started.elapsed().as_millis() as u64;
        self.confirmed_text = output.text;
        self.last_transcribed_at = self.audio.total_samples();
        Ok(())
    }

    fn snapshot(&self, is_final: bool) -> StreamingResult {
        let confirmed_word_count = self.confirmed_text.split_whitespace().count();
        StreamingResult {
            confirmed_text: self.confirmed_text.clone(),
            tentative_text: String::new(),
            is_final,
            confirmed_word_count,
            tentative_word_count: 0,
            audio_duration_seconds: self.audio.total_duration_seconds(),
            processing_time_ms: self.last_processing_time_ms,
        }
    }
}

impl StreamingStrategy for ChunkedStrategy {
    fn process_audio(&mut self, chunk: &[f32]) -> Result<StreamingResult, StreamingError> {
        self.audio.append(chunk);
        let elapsed = self.audio.total_samples().saturating_sub(self.last_transcribed_at);
        if elapsed as usize >= self.transcribe_interval_samples {
            if let Err(err) = self.transcribe_once() {
                // Transient transcriber failure: keep the last confirmed text
                // and retry on the next cadence tick.
                warn!(error = %err, "chunked transcription iteration failed, continuing");
            }
        }
        Ok(self.snapshot(false))
    }

    fn finalize(&mut self) -> Result<StreamingResult, StreamingError> {
        self.transcribe_once()?;
        Ok(self.snapshot(true))
    }

    fn cleanup(&mut self) {
        self.audio.reset();
        self.confirmed_text.clear();
        self.last_transcribed_at = 0;
    }

    fn confirmed_text_snapshot(&self) -> String {
        self.confirmed_text.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{TranscriberCapabilities, TranscribeOutput};

    struct FixedTranscriber(&'static str);

    impl Transcriber for FixedTranscriber {
        fn capabilities(&self) -> TranscriberCapabilities {
            TranscriberCapabilities::default()
        }

        fn transcribe(
            &self,
            request: TranscribeRequest<'_>,
        ) -> Result<TranscribeOutput, crate::capability::TranscriberError> {
            let duration = (request.wav_bytes.len() as f64) / 2.0 / 16_000.0;
            Ok(TranscribeOutput {
                text: self.0.to_string(),
                words: None,
                audio_duration_seconds: duration,
                language: "en".into(),
            })
        }
    }

    struct FailingTranscriber;

    impl Transcriber for FailingTranscriber {
        fn capabilities(&self) -> TranscriberCapabilities {
            TranscriberCapabilities::default()
        }

        fn transcribe(
            &self,
            _request: TranscribeRequest<'_>,
        ) -> Result<TranscribeOutput, crate::capability::TranscriberError> {
            Err(crate::capability::TranscriberError::Backend("backend unavailable".into()))
        }
    }

    fn config() -> StreamingConfig {
        StreamingConfig {
            transcribe_interval_samples: 8_000,
            ..Default::default()
        }
    }

    #[test]
    fn later_transcription_replaces_earlier_text_wholesale() {
        let transcriber = Arc::new(FixedTranscriber("hello world"));
        let mut strategy = ChunkedStrategy::new(transcriber, &config());
        let result = strategy.process_audio(&vec![0.0f32; 8_000]).unwrap();
        assert_eq!(result.confirmed_text, "hello world");
        assert!(result.tentative_text.is_empty());
    }

    #[test]
    fn finalize_runs_one_more_transcription_and_marks_final() {
        let transcriber = Arc::new(FixedTranscriber("final text"));
        let mut strategy = ChunkedStrategy::new(transcriber, &config());
        let result = strategy.finalize().unwrap();
        assert_eq!(result.confirmed_text, "final text");
        assert!(result.is_final);
    }

    #[test]
    fn a_transient_transcriber_failure_keeps_the_session_alive_with_text_unchanged() {
        let transcriber = Arc::new(FailingTranscriber);
        let mut strategy = ChunkedStrategy::new(transcriber, &config());
        let result = strategy.process_audio(&vec![0.0f32; 8_000]).unwrap();
        assert_eq!(result.confirmed_text, "");
        assert!(!result.is_final);
    }

    #[test]
    fn cleanup_clears_confirmed_text() {
        let transcriber = Arc::new(FixedTranscriber("hello"));
        let mut strategy = ChunkedStrategy::new(transcriber, &config());
        strategy.process_audio(&vec![0.0f32; 8_000]).unwrap();
        strategy.cleanup();
        assert_eq!(strategy.snapshot(false).confirmed_text, "");
    }
}

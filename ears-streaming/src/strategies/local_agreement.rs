use std::sync::Arc;
use std::time::Instant;

use ears_audio::AudioBuffer;
use ears_hypothesis::HypothesisBuffer;
use tracing::warn;

use crate::capability::{Transcriber, TranscribeRequest};
use crate::config::StreamingConfig;
use crate::error::StreamingError;
use crate::strategy::{synthesize_words, StreamingResult, StreamingStrategy};

/// The subject of most of the hard engineering: drives a batch transcriber
/// at a fixed cadence and stabilizes its successive hypotheses into a
/// monotone confirmed prefix via [`HypothesisBuffer`].
pub struct LocalAgreementStrategy {
    audio: AudioBuffer,
    hypothesis: HypothesisBuffer,
    transcriber: Arc<dyn Transcriber>,
    transcribe_interval_samples: usize,
    prompt_suffix_chars: usize,
    trim_backoff_seconds: f64,
    last_transcribed_at: u64,
    last_processing_time_ms: u64,
}

impl LocalAgreementStrategy {
    pub fn new(transcriber: Arc<dyn Transcriber>, config: &StreamingConfig) -> Self {
        Self {
            audio: AudioBuffer::new(config.max_buffer_seconds, config.sample_rate),
            hypothesis: HypothesisBuffer::with_config(
                config.agreement_n,
                config.overlap_tolerance_seconds,
                500,
            ),
            transcriber,
            transcribe_interval_samples: config.transcribe_interval_samples,
            prompt_suffix_chars: config.prompt_suffix_chars,
            trim_backoff_seconds: config.trim_backoff_seconds,
            last_transcribed_at: 0,
            last_processing_time_ms: 0,
        }
    }

    fn maybe_transcribe(&mut self) -> Result<(), StreamingError> {
        let elapsed = self.audio.total_samples().saturating_sub(self.last_transcribed_at);
        if (elapsed as usize) < self.transcribe_interval_samples {
            return Ok(());
        }
        self.transcribe_once()
    }

    fn transcribe_once(&mut self) -> Result<(), StreamingError> {
        let wav_bytes = self.audio.to_wav_bytes();
        let (_, offset_seconds) = self.audio.get_audio();
        let prompt = self.hypothesis.get_prompt_suffix(self.prompt_suffix_chars);

        let started = Instant::now();
        let output = self.transcriber.transcribe(TranscribeRequest {
            wav_bytes: &wav_bytes,
            prompt: &prompt,
            language_hint: None,
        })?;
        self.last_processing_time_ms = started.elapsed().as_millis() as u64;

        let words = output
            .words
            .unwrap_or_else(|| synthesize_words(&output.text, output.audio_duration_seconds));
        self.hypothesis.insert(&words, offset_seconds);
        let newly_confirmed = self.hypothesis.flush();
        if let Some(last) = newly_confirmed.last() {
            let trim_at = last.end - self.trim_backoff_seconds;
            self.audio.trim_to_time(trim_at);
            self.hypothesis.trim_to_time(trim_at);
        }
        self.last_transcribed_at = self.audio.total_samples();
        Ok(())
    }

    fn snapshot(&self, is_final: bool) -> StreamingResult {
        StreamingResult {
            confirmed_text: self.hypothesis.get_confirmed_text(),
            tentative_text: self.hypothesis.get_tentative_text(),
            is_final,
            confirmed_word_count: self.hypothesis.confirmed_word_count(),
            tentative_word_count: self.hypothesis.tentative_word_count(),
            audio_duration_seconds: self.audio.total_duration_seconds(),
            processing_time_ms: self.last_processing_time_ms,
        }
    }
}

impl StreamingStrategy for LocalAgreementStrategy {
    fn process_audio(&mut self, chunk: &[f32]) -> Result<StreamingResult, StreamingError> {
        self.audio.append(chunk);
        if let Err(err) = self.maybe_transcribe() {
            // Transient transcriber failure: keep existing confirmed/tentative
            // text and retry on the next cadence tick.
            warn!(error = %err, "local agreement transcription iteration failed, continuing");
        }
        Ok(self.snapshot(false))
    }

    fn finalize(&mut self) -> Result<StreamingResult, StreamingError> {
        self.transcribe_once()?;
        self.hypothesis.force_confirm_all();
        let mut result = self.snapshot(true);
        result.tentative_text.clear();
        result.tentative_word_count = 0;
        Ok(result)
    }

    fn cleanup(&mut self) {
        self.audio.reset();
        self.hypothesis.clear();
    }

    fn confirmed_text_snapshot(&self) -> String {
        self.hypothesis.get_confirmed_text()
    }
}

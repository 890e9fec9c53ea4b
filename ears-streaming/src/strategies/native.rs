use std::sync::Arc;

use crate::capability::{NativeStream, NativeStreamingTranscriber};
use crate::error::StreamingError;
use crate::strategy::{StreamingResult, StreamingStrategy};

/// Delegates entirely to a backend's own incremental decoding context. The
/// backend, not this crate, owns stability: whatever it reports as
/// `finalized` is taken as confirmed without a second opinion.
pub struct NativeStrategy {
    transcriber: Arc<dyn NativeStreamingTranscriber>,
    stream: Option<Box<dyn NativeStream>>,
    confirmed_text: String,
    tentative_text: String,
    total_samples: u64,
    sample_rate: u32,
}

impl NativeStrategy {
    pub fn new(transcriber: Arc<dyn NativeStreamingTranscriber>, sample_rate: u32) -> Self {
        Self {
            transcriber,
            stream: None,
            confirmed_text: String::new(),
            tentative_text: String::new(),
            total_samples: 0,
            sample_rate,
        }
    }

    fn snapshot(&self, is_final: bool) -> StreamingResult {
        StreamingResult {
            confirmed_text: self.confirmed_text.clone(),
            tentative_text: self.tentative_text.clone(),
            is_final,
            confirmed_word_count: self.confirmed_text.split_whitespace().count(),
            tentative_word_count: self.tentative_text.split_whitespace().count(),
            audio_duration_seconds: self.total_samples as f64 / self.sample_rate as f64,
            processing_time_ms: 0,
        }
    }

    fn append_confirmed(&mut self, finalized: &str) {
        if finalized.is_empty() {
            return;
        }
        if self.confirmed_text.is_empty() {
            self.confirmed_text.push_str(finalized);
        } else {
            self.confirmed_text.push(' ');
            self.confirmed_text.push_str(finalized);
        }
    }
}

impl StreamingStrategy for NativeStrategy {
    fn process_audio(&mut self, chunk: &[f32]) -> Result<StreamingResult, StreamingError> {
        self.total_samples += chunk.len() as u64;
        if self.stream.is_none() {
            self.stream = Some(self.transcriber.open_stream().map_err(StreamingError::TranscriberFailed)?);
        }
        let update = self
            .stream
            .as_mut()
            .expect("just opened above")
            .feed(chunk)
            .map_err(StreamingError::TranscriberFailed)?;
        self.append_confirmed(&update.finalized);
        self.tentative_text = update.draft;
        Ok(self.snapshot(false))
    }

    fn finalize(&mut self) -> Result<StreamingResult, StreamingError> {
        if let Some(stream) = self.stream.take() {
            let update = stream.finalize().map_err(StreamingError::TranscriberFailed)?;
            self.append_confirmed(&update.finalized);
            if !update.draft.is_empty() {
                self.append_confirmed(&update.draft);
            }
        }
        self.tentative_text.clear();
        Ok(self.snapshot(true))
    }

    fn cleanup(&mut self) {
        // Dropping the stream (if any) releases its resources even though
        // we never called `finalize` on it — `NativeStream` guarantees this.
        self.stream = None;
        self.confirmed_text.clear();
        self.tentative_text.clear();
        self.total_samples = 0;
    }

    fn confirmed_text_snapshot(&self) -> String {
        self.confirmed_text.clone()
    }
}

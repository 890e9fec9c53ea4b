//! The `Transcriber` capability backed by `whisper-rs`, adapted from the
//! teacher's inline `Session::transcribe` to the batch, word-timestamped
//! shape `ears_streaming::Transcriber` expects.

use std::sync::{Arc, Mutex};

use ears_audio::decode_wav_to_f32;
use ears_hypothesis::TimestampedWord;
use ears_streaming::{TranscribeOutput, TranscribeRequest, Transcriber, TranscriberCapabilities, TranscriberError};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperState};

/// One whisper.cpp context with one reusable decode state. `WhisperState`
/// requires `&mut` for `full()`, but `Transcriber::transcribe` takes `&self`
/// — any backend without inherent internal concurrency holds its mutable
/// state behind a `Mutex`; GPU serialization at the session layer means only
/// one call is ever in flight per process anyway when this matters.
pub struct WhisperTranscriber {
    ctx: Arc<WhisperContext>,
    state: Mutex<WhisperState>,
    sampling_strategy: SamplingStrategy,
    language: Option<String>,
    gpu: bool,
}

impl WhisperTranscriber {
    pub fn new(ctx: Arc<WhisperContext>, sampling_strategy: SamplingStrategy, language: Option<String>, gpu: bool) -> anyhow::Result<Self> {
        let state = ctx.create_state()?;
        Ok(Self {
            ctx,
            state: Mutex::new(state),
            sampling_strategy,
            language,
            gpu,
        })
    }
}

impl Transcriber for WhisperTranscriber {
    fn capabilities(&self) -> TranscriberCapabilities {
        TranscriberCapabilities {
            native_streaming: false,
            word_timestamps: true,
            requires_exclusive_access: self.gpu,
        }
    }

    fn transcribe(&self, request: TranscribeRequest<'_>) -> Result<TranscribeOutput, TranscriberError> {
        let samples = decode_wav_to_f32(request.wav_bytes).map_err(|e| TranscriberError::Backend(e.to_string()))?;
        let audio_duration_seconds = samples.len() as f64 / 16_000.0;
        if samples.is_empty() {
            return Ok(TranscribeOutput {
                text: String::new(),
                words: None,
                audio_duration_seconds,
                language: self.language.clone().unwrap_or_else(|| "auto".into()),
            });
        }

        let mut params = FullParams::new(self.sampling_strategy.clone());
        params.set_language(self.language.as_deref());
        params.set_suppress_nst(true);
        params.set_print_progress(false);
        params.set_print_special(false);
        params.set_print_realtime(false);
        params.set_token_timestamps(true);
        params.set_no_context(true);
        if !request.prompt.is_empty() {
            params.set_initial_prompt(request.prompt);
        }

        let mut state = self.state.lock().expect("whisper state mutex poisoned");
        state.full(params, &samples).map_err(|e| TranscriberError::Backend(e.to_string()))?;

        let n_segments = state.full_n_segments();
        let eot_id = self.ctx.token_eot();
        let mut words = Vec::new();
        let mut text = String::new();

        for i in 0..n_segments {
            let Some(segment) = state.get_segment(i) else { continue };
            for j in 0..segment.n_tokens() {
                let Some(token) = segment.get_token(j) else { continue };
                if token.token_id() >= eot_id {
                    continue;
                }
                let Ok(token_text) = token.to_str_lossy() else { continue };
                let token_text = token_text.trim();
                if token_text.is_empty() {
                    continue;
                }
                let data = token.token_data();
                let start = data.t0 as f64 / 100.0;
                let end = data.t1 as f64 / 100.0;
                if !text.is_empty() {
                    text.push(' ');
                }
                text.push_str(token_text);
                words.push(TimestampedWord::new(token_text.to_string(), start, end, token.token_probability()));
            }
        }

        Ok(TranscribeOutput {
            text,
            words: if words.is_empty() { None } else { Some(words) },
            audio_duration_seconds,
            language: self.language.clone().unwrap_or_else(|| "auto".into()),
        })
    }
}

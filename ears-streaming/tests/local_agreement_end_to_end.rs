use std::sync::{Arc, Mutex};

use ears_streaming::{
    select_strategy, SessionState, StreamingConfig, StreamingSession, TranscribeOutput, TranscribeRequest,
    Transcriber, TranscriberCapabilities, TranscriberError, TranscriberHandle,
};

/// Returns word `w_k` for `k` in `[1..=n]` where `n = duration / 0.5`, the
/// same oracle used by the unit-level seed test, driven here through the
/// full `StreamingSession` rather than the strategy directly.
struct SequenceTranscriber {
    calls: Mutex<usize>,
}

impl Transcriber for SequenceTranscriber {
    fn capabilities(&self) -> TranscriberCapabilities {
        TranscriberCapabilities { word_timestamps: true, ..Default::default() }
    }

    fn transcribe(&self, request: TranscribeRequest<'_>) -> Result<TranscribeOutput, TranscriberError> {
        *self.calls.lock().unwrap() += 1;
        let duration = (request.wav_bytes.len() as f64) / 2.0 / 16_000.0;
        let n = (duration / 0.5).round() as usize;
        let words = (1..=n)
            .map(|k| {
                let start = (k - 1) as f64 * 0.5;
                ears_hypothesis::TimestampedWord::new(format!("w_{k}"), start, start + 0.5, 0.9)
            })
            .collect();
        Ok(TranscribeOutput { text: String::new(), words: Some(words), audio_duration_seconds: duration, language: "en".into() })
    }
}

#[test]
fn session_drives_local_agreement_to_a_monotone_confirmed_prefix() {
    let transcriber: Arc<dyn Transcriber> = Arc::new(SequenceTranscriber { calls: Mutex::new(0) });
    let config = StreamingConfig {
        transcribe_interval_samples: 8_000,
        trim_backoff_seconds: 100.0,
        ..Default::default()
    };
    let strategy = select_strategy(TranscriberHandle::Batch(transcriber), &config);
    let mut session = StreamingSession::new(strategy, config.sample_rate, config.session_timeout_seconds);

    let chunk = vec![0.0f32; 8_000];
    let mut confirmed_so_far = String::new();
    for _ in 0..6 {
        let result = session.process_chunk(&chunk).unwrap();
        assert!(result.confirmed_text.starts_with(&confirmed_so_far));
        confirmed_so_far = result.confirmed_text;
    }
    assert_eq!(session.state(), SessionState::Active);

    let final_result = session.finalize().unwrap();
    assert_eq!(final_result.confirmed_text, "w_1 w_2 w_3 w_4 w_5 w_6");
    assert!(final_result.is_final);
    assert_eq!(session.state(), SessionState::Completed);

    assert!(session.finalize().is_err(), "a second finalize must never re-invoke the transcriber");
}

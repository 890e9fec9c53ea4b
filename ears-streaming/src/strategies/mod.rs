mod chunked;
mod local_agreement;
mod native;

pub use chunked::ChunkedStrategy;
pub use local_agreement::LocalAgreementStrategy;
pub use native::NativeStrategy;

use std::sync::Arc;

use crate::capability::{NativeStreamingTranscriber, Transcriber};
use crate::config::StreamingConfig;
use crate::strategy::StreamingStrategy;

/// Both trait objects a caller may hold for the same concrete transcriber.
///
/// `NativeStreamingTranscriber: Transcriber` means an `Arc<dyn
/// NativeStreamingTranscriber>` could in principle be upcast to `Arc<dyn
/// Transcriber>`, but that coercion depends on a toolchain feature this
/// crate doesn't assume is available. Instead the caller — which holds the
/// concrete sized type — constructs both trait objects directly via two
/// separate unsizing coercions and hands this enum to `select_strategy`.
pub enum TranscriberHandle {
    Streaming(Arc<dyn NativeStreamingTranscriber>),
    Batch(Arc<dyn Transcriber>),
}

/// Picks a strategy per the transcriber's advertised capabilities: native
/// streaming context first, then word timestamps, then plain batch text.
pub fn select_strategy(handle: TranscriberHandle, config: &StreamingConfig) -> Box<dyn StreamingStrategy> {
    match handle {
        TranscriberHandle::Streaming(transcriber) => Box::new(NativeStrategy::new(transcriber, config.sample_rate)),
        TranscriberHandle::Batch(transcriber) => {
            if transcriber.capabilities().word_timestamps {
                Box::new(LocalAgreementStrategy::new(transcriber, config))
            } else {
                Box::new(ChunkedStrategy::new(transcriber, config))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{TranscribeOutput, TranscribeRequest, TranscriberCapabilities};

    struct WordTimestampTranscriber;
    impl Transcriber for WordTimestampTranscriber {
        fn capabilities(&self) -> TranscriberCapabilities {
            TranscriberCapabilities { word_timestamps: true, ..Default::default() }
        }
        fn transcribe(&self, _r: TranscribeRequest<'_>) -> Result<TranscribeOutput, crate::capability::TranscriberError> {
            unimplemented!()
        }
    }

    struct PlainTranscriber;
    impl Transcriber for PlainTranscriber {
        fn capabilities(&self) -> TranscriberCapabilities {
            TranscriberCapabilities::default()
        }
        fn transcribe(&self, _r: TranscribeRequest<'_>) -> Result<TranscribeOutput, crate::capability::TranscriberError> {
            unimplemented!()
        }
    }

    #[test]
    fn word_timestamp_capability_selects_local_agreement() {
        let handle = TranscriberHandle::Batch(Arc::new(WordTimestampTranscriber));
        let strategy = select_strategy(handle, &StreamingConfig::default());
        // No direct downcast available through the trait object; the
        // meaningful assertion is that selection didn't panic and produced
        // a usable strategy, exercised further in session-level tests.
        drop(strategy);
    }

    #[test]
    fn plain_capability_selects_chunked() {
        let handle = TranscriberHandle::Batch(Arc::new(PlainTranscriber));
        let strategy = select_strategy(handle, &StreamingConfig::default());
        drop(strategy);
    }
}

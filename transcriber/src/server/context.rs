//! State shared by every connection task: the loaded transcriber, the GPU
//! serialization permit, and per-client bookkeeping (rate limits, the
//! session registry used to verify disconnect cleanup).

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use ears_streaming::{StreamingConfig, Transcriber};
use tokio::sync::Semaphore;

use super::rate_limit::RateLimiter;

pub struct ServerContext {
    pub transcriber: Arc<dyn Transcriber>,
    /// Single-permit gate around every `spawn_blocking` transcription call
    /// when the backend reports `requires_exclusive_access` (a single-device
    /// GPU can only run one decode at a time process-wide).
    pub gpu_semaphore: Arc<Semaphore>,
    pub config: StreamingConfig,
    pub expected_token: Option<String>,
    rate_limiters: Mutex<HashMap<String, RateLimiter>>,
    active_session_ids: Mutex<HashSet<String>>,
}

impl ServerContext {
    pub fn new(transcriber: Arc<dyn Transcriber>, config: StreamingConfig, expected_token: Option<String>) -> Self {
        Self {
            transcriber,
            gpu_semaphore: Arc::new(Semaphore::new(1)),
            config,
            expected_token,
            rate_limiters: Mutex::new(HashMap::new()),
            active_session_ids: Mutex::new(HashSet::new()),
        }
    }

    /// Records a `start_stream` attempt for `client_id` and returns whether
    /// it's within the 60s/10-request budget.
    pub fn check_rate_limit(&self, client_id: &str) -> bool {
        let mut limiters = self.rate_limiters.lock().expect("rate limiter mutex poisoned");
        limiters.entry(client_id.to_string()).or_insert_with(RateLimiter::new).try_acquire(Instant::now())
    }

    pub fn register_session(&self, session_id: &str) {
        self.active_session_ids.lock().expect("session registry mutex poisoned").insert(session_id.to_string());
    }

    pub fn unregister_session(&self, session_id: &str) {
        self.active_session_ids.lock().expect("session registry mutex poisoned").remove(session_id);
    }

    pub fn is_registered(&self, session_id: &str) -> bool {
        self.active_session_ids.lock().expect("session registry mutex poisoned").contains(session_id)
    }

    pub fn active_session_count(&self) -> usize {
        self.active_session_ids.lock().expect("session registry mutex poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ears_streaming::{TranscribeOutput, TranscribeRequest, TranscriberCapabilities, TranscriberError};

    struct NoopTranscriber;
    impl Transcriber for NoopTranscriber {
        fn capabilities(&self) -> TranscriberCapabilities {
            TranscriberCapabilities::default()
        }
        fn transcribe(&self, _r: TranscribeRequest<'_>) -> Result<TranscribeOutput, TranscriberError> {
            unimplemented!()
        }
    }

    fn context() -> ServerContext {
        ServerContext::new(Arc::new(NoopTranscriber), StreamingConfig::default(), None)
    }

    #[test]
    fn registering_and_unregistering_sessions_tracks_membership() {
        let ctx = context();
        ctx.register_session("s1");
        assert!(ctx.is_registered("s1"));
        assert_eq!(ctx.active_session_count(), 1);
        ctx.unregister_session("s1");
        assert!(!ctx.is_registered("s1"));
        assert_eq!(ctx.active_session_count(), 0);
    }

    #[test]
    fn rate_limit_is_tracked_per_client() {
        let ctx = context();
        for _ in 0..10 {
            assert!(ctx.check_rate_limit("client-a"));
        }
        assert!(!ctx.check_rate_limit("client-a"));
        assert!(ctx.check_rate_limit("client-b"));
    }
}

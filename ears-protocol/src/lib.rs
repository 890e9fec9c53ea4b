//! Wire types exchanged between the ears streaming server and its clients.
//!
//! Client messages are tagged JSON (`{"type": "...", ...}`); server messages
//! are always wrapped in an [`Envelope`] carrying a `service`/`task` pair plus
//! either a `result` or an `error` payload.

use serde::{Deserialize, Serialize};

/// Samples per second the core always operates on after decode/resample.
pub const SAMPLE_RATE: u32 = 16_000;

/// Sample rates the server accepts from a client before resampling.
pub const ACCEPTED_SAMPLE_RATES: [u32; 2] = [8_000, 16_000];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    Ping,
    Auth {
        token: String,
    },
    StartStream {
        session_id: Option<String>,
        sample_rate: u32,
        channels: u16,
        #[serde(default)]
        binary: bool,
        token: Option<String>,
    },
    AudioChunk {
        session_id: String,
        /// base64-encoded Opus bytes.
        audio_data: String,
        #[serde(default)]
        ack_requested: bool,
    },
    PcmChunk {
        session_id: String,
        /// base64-encoded little-endian int16 PCM.
        audio_data: String,
        sample_rate: Option<u32>,
        channels: Option<u16>,
    },
    EndStream {
        session_id: String,
        expected_chunks: Option<u64>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    NotReady,
    RateLimited,
    InternalError,
    Timeout,
    UnknownSession,
    InvalidSampleRate,
    MalformedMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
    /// Best-effort confirmed text accumulated before a fatal error, carried
    /// alongside e.g. a finalize failure instead of discarded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_text: Option<String>,
}

impl ErrorPayload {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retryable: None,
            confirmed_text: None,
        }
    }

    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = Some(retryable);
        self
    }

    pub fn confirmed_text(mut self, confirmed_text: impl Into<String>) -> Self {
        self.confirmed_text = Some(confirmed_text.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WelcomeResult {
    pub client_id: String,
    pub server_ready: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthResult {
    pub client_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamStartedResult {
    pub session_id: String,
    pub streaming_enabled: bool,
    pub backend: String,
    pub strategy: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PartialResultPayload {
    pub session_id: String,
    pub confirmed_text: String,
    pub tentative_text: String,
    pub is_final: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompleteResult {
    pub session_id: String,
    pub confirmed_text: String,
    pub tentative_text: String,
    pub is_final: bool,
    pub audio_duration: f64,
    pub language: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PongResult {
    pub server_time_ms: u128,
}

/// Envelope wrapping every outgoing message: `{request_id, service, task, result|error}`.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T: Serialize> {
    pub request_id: Option<String>,
    pub service: &'static str,
    pub task: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

impl<T: Serialize> Envelope<T> {
    pub fn result(task: &'static str, result: T) -> Self {
        Self {
            request_id: None,
            service: "ears",
            task,
            result: Some(result),
            error: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl Envelope<()> {
    pub fn error(error: ErrorPayload) -> Self {
        Self {
            request_id: None,
            service: "ears",
            task: "error",
            result: None,
            error: Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_message_start_stream_round_trips() {
        let json = r#"{"type":"start_stream","session_id":null,"sample_rate":16000,"channels":1,"binary":true,"token":null}"#;
        let parsed: ClientMessage = serde_json::from_str(json).unwrap();
        match parsed {
            ClientMessage::StartStream {
                sample_rate,
                channels,
                binary,
                ..
            } => {
                assert_eq!(sample_rate, 16_000);
                assert_eq!(channels, 1);
                assert!(binary);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn envelope_error_has_no_result_field() {
        let envelope = Envelope::error(ErrorPayload::new(ErrorCode::RateLimited, "slow down").retryable(true));
        let json = serde_json::to_value(&envelope).unwrap();
        assert!(json.get("result").is_none());
        assert_eq!(json["error"]["code"], "rate_limited");
        assert_eq!(json["error"]["retryable"], true);
    }

    #[test]
    fn error_payload_omits_confirmed_text_when_absent_but_carries_it_when_set() {
        let bare = ErrorPayload::new(ErrorCode::InternalError, "boom");
        let json = serde_json::to_value(&bare).unwrap();
        assert!(json.get("confirmed_text").is_none());

        let with_text = ErrorPayload::new(ErrorCode::InternalError, "boom")
            .retryable(false)
            .confirmed_text("hello world");
        let json = serde_json::to_value(&with_text).unwrap();
        assert_eq!(json["confirmed_text"], "hello world");
        assert_eq!(json["retryable"], false);
    }

    #[test]
    fn envelope_result_omits_error_field() {
        let envelope = Envelope::result(
            "stream_started",
            StreamStartedResult {
                session_id: "s1".into(),
                streaming_enabled: true,
                backend: "whisper".into(),
                strategy: "local_agreement".into(),
            },
        );
        let json = serde_json::to_value(&envelope).unwrap();
        assert!(json.get("error").is_none());
        assert_eq!(json["result"]["strategy"], "local_agreement");
    }
}

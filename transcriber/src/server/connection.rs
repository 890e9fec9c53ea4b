//! Per-connection message loop. One task per TCP connection, processing
//! inbound messages strictly in arrival order (mirroring the teacher's
//! single sequential drain loop) — there is no per-chunk fan-out, so a
//! session's own state is only ever touched by this one task while it's
//! being processed.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use base64::Engine;
use ears_audio::{decode_pcm16_le, downmix_to_mono, resample_to_16k, AudioDecoder, OpusFrameDecoder, DEFAULT_FRAME_SAMPLES};
use ears_protocol::{
    AuthResult, ClientMessage, CompleteResult, Envelope, ErrorCode, ErrorPayload, PartialResultPayload, PongResult,
    StreamStartedResult, WelcomeResult, ACCEPTED_SAMPLE_RATES,
};
use ears_streaming::{select_strategy, StreamingError, StreamingSession, TranscriberHandle};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};
use uuid::Uuid;

use super::auth::check_token;
use super::context::ServerContext;

struct ClientSession {
    session: StreamingSession,
    decoder: OpusFrameDecoder,
    client_sample_rate: u32,
    channels: u16,
}

type WsSink = futures_util::stream::SplitSink<tokio_tungstenite::WebSocketStream<TcpStream>, Message>;

async fn send<T: Serialize>(sink: &mut WsSink, envelope: Envelope<T>) -> Result<()> {
    let json = envelope.to_json()?;
    sink.send(Message::Text(json)).await?;
    Ok(())
}

async fn send_error(sink: &mut WsSink, code: ErrorCode, message: impl Into<String>) -> Result<()> {
    send(sink, Envelope::error(ErrorPayload::new(code, message))).await
}

pub async fn handle_connection(stream: TcpStream, peer_addr: SocketAddr, ctx: Arc<ServerContext>) -> Result<()> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut sender, mut receiver) = ws_stream.split();

    let client_id = Uuid::new_v4().to_string();
    let mut authenticated = ctx.expected_token.is_none();
    let mut sessions: HashMap<String, ClientSession> = HashMap::new();
    let mut binary_session_id: Option<String> = None;

    send(&mut sender, Envelope::result("welcome", WelcomeResult { client_id: client_id.clone(), server_ready: true })).await?;

    while let Some(msg) = receiver.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                warn!("websocket error from {peer_addr}: {e}");
                break;
            }
        };

        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => {
                    handle_client_message(
                        &ctx,
                        &client_id,
                        &mut authenticated,
                        &mut sessions,
                        &mut binary_session_id,
                        client_msg,
                        &mut sender,
                    )
                    .await?;
                }
                Err(e) => send_error(&mut sender, ErrorCode::MalformedMessage, e.to_string()).await?,
            },
            Message::Binary(data) => {
                let Some(session_id) = binary_session_id.clone() else {
                    send_error(&mut sender, ErrorCode::UnknownSession, "no binary-mode session is open").await?;
                    continue;
                };
                process_compressed_chunk(&ctx, &mut sessions, &session_id, &data, &mut sender).await?;
            }
            Message::Ping(data) => sender.send(Message::Pong(data)).await?,
            Message::Pong(_) | Message::Frame(_) => {}
            Message::Close(_) => break,
        }
    }

    for (session_id, mut client) in sessions.into_iter() {
        client.session.abort();
        ctx.unregister_session(&session_id);
    }
    info!("connection from {peer_addr} closed (client {client_id})");
    Ok(())
}

async fn handle_client_message(
    ctx: &Arc<ServerContext>,
    client_id: &str,
    authenticated: &mut bool,
    sessions: &mut HashMap<String, ClientSession>,
    binary_session_id: &mut Option<String>,
    message: ClientMessage,
    sender: &mut WsSink,
) -> Result<()> {
    match message {
        ClientMessage::Ping => {
            let server_time_ms = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or(0);
            send(sender, Envelope::result("pong", PongResult { server_time_ms })).await
        }

        ClientMessage::Auth { token } => {
            if check_token(&ctx.expected_token, Some(token.as_str())) {
                *authenticated = true;
                send(sender, Envelope::result("auth_success", AuthResult { client_id: client_id.to_string() })).await
            } else {
                send_error(sender, ErrorCode::Unauthorized, "invalid token").await
            }
        }

        ClientMessage::StartStream { session_id, sample_rate, channels, binary, token } => {
            if !*authenticated && !check_token(&ctx.expected_token, token.as_deref()) {
                return send_error(sender, ErrorCode::Unauthorized, "authentication required").await;
            }
            if !ACCEPTED_SAMPLE_RATES.contains(&sample_rate) {
                return send_error(sender, ErrorCode::InvalidSampleRate, format!("unsupported sample rate {sample_rate}")).await;
            }
            if !ctx.check_rate_limit(client_id) {
                return send_error(sender, ErrorCode::RateLimited, "too many streams started in the last minute").await;
            }

            let session_id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
            let handle = TranscriberHandle::Batch(Arc::clone(&ctx.transcriber));
            let strategy = select_strategy(handle, &ctx.config);
            let strategy_name = strategy_label(ctx);
            let session = StreamingSession::new(strategy, ctx.config.sample_rate, ctx.config.session_timeout_seconds);
            let decoder = OpusFrameDecoder::new(sample_rate, channels, DEFAULT_FRAME_SAMPLES)?;

            ctx.register_session(&session_id);
            if binary {
                *binary_session_id = Some(session_id.clone());
            }
            sessions.insert(session_id.clone(), ClientSession { session, decoder, client_sample_rate: sample_rate, channels });

            send(
                sender,
                Envelope::result(
                    "stream_started",
                    StreamStartedResult {
                        session_id,
                        streaming_enabled: true,
                        backend: "whisper".into(),
                        strategy: strategy_name,
                    },
                ),
            )
            .await
        }

        ClientMessage::AudioChunk { session_id, audio_data, .. } => {
            let Some(bytes) = decode_base64(sender, &audio_data).await? else { return Ok(()) };
            process_compressed_chunk(ctx, sessions, &session_id, &bytes, sender).await
        }

        ClientMessage::PcmChunk { session_id, audio_data, sample_rate, channels } => {
            let Some(bytes) = decode_base64(sender, &audio_data).await? else { return Ok(()) };
            let samples = decode_pcm16_le(&bytes);
            let from_rate = sample_rate.unwrap_or(16_000);
            let channels = channels.unwrap_or(1);
            finish_chunk(ctx, sessions, &session_id, samples, from_rate, channels, sender).await
        }

        ClientMessage::EndStream { session_id, .. } => end_stream(ctx, sessions, binary_session_id, &session_id, sender).await,
    }
}

async fn decode_base64(sender: &mut WsSink, data: &str) -> Result<Option<Vec<u8>>> {
    match base64::engine::general_purpose::STANDARD.decode(data) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) => {
            send_error(sender, ErrorCode::MalformedMessage, format!("invalid base64 audio: {e}")).await?;
            Ok(None)
        }
    }
}

async fn process_compressed_chunk(
    ctx: &Arc<ServerContext>,
    sessions: &mut HashMap<String, ClientSession>,
    session_id: &str,
    opus_bytes: &[u8],
    sender: &mut WsSink,
) -> Result<()> {
    let Some(client) = sessions.get_mut(session_id) else {
        return send_error(sender, ErrorCode::UnknownSession, "no such session").await;
    };
    let from_rate = client.client_sample_rate;
    let channels = client.channels;
    let samples = match client.decoder.decode(opus_bytes) {
        Ok(samples) => samples,
        Err(e) => {
            warn!("opus decode failed for session {session_id}: {e}");
            return Ok(());
        }
    };
    finish_chunk(ctx, sessions, session_id, samples, from_rate, channels, sender).await
}

/// Shared tail of chunk handling once raw samples at the client's declared
/// rate/channel count are in hand: downmix, resample to 16 kHz, then hand
/// off to the session.
async fn finish_chunk(
    ctx: &Arc<ServerContext>,
    sessions: &mut HashMap<String, ClientSession>,
    session_id: &str,
    samples: Vec<f32>,
    from_rate: u32,
    channels: u16,
    sender: &mut WsSink,
) -> Result<()> {
    let mono = downmix_to_mono(&samples, channels);
    let Some(resampled) = resample_to_16k(&mono, from_rate) else {
        return send_error(sender, ErrorCode::InvalidSampleRate, format!("unsupported sample rate {from_rate}")).await;
    };
    route_chunk(ctx, sessions, session_id, resampled, sender).await
}

async fn route_chunk(
    ctx: &Arc<ServerContext>,
    sessions: &mut HashMap<String, ClientSession>,
    session_id: &str,
    samples: Vec<f32>,
    sender: &mut WsSink,
) -> Result<()> {
    let Some(client) = sessions.remove(session_id) else {
        return send_error(sender, ErrorCode::UnknownSession, "no such session").await;
    };
    let requires_exclusive = ctx.transcriber.capabilities().requires_exclusive_access;
    let gpu_semaphore = Arc::clone(&ctx.gpu_semaphore);
    let _permit = if requires_exclusive { Some(gpu_semaphore.acquire_owned().await.expect("gpu semaphore closed")) } else { None };

    let ClientSession { mut session, decoder, client_sample_rate, channels } = client;
    let (session, result) = tokio::task::spawn_blocking(move || {
        let r = session.process_chunk(&samples);
        (session, r)
    })
    .await
    .expect("transcription worker panicked");

    sessions.insert(session_id.to_string(), ClientSession { session, decoder, client_sample_rate, channels });

    match result {
        Ok(r) => {
            send(
                sender,
                Envelope::result(
                    "partial_result",
                    PartialResultPayload {
                        session_id: session_id.to_string(),
                        confirmed_text: r.confirmed_text,
                        tentative_text: r.tentative_text,
                        is_final: false,
                    },
                ),
            )
            .await
        }
        Err(StreamingError::SessionTimeout { idle_seconds }) => {
            warn!("session {session_id} timed out after {idle_seconds:.1}s idle");
            if let Some(mut client) = sessions.remove(session_id) {
                client.session.abort();
            }
            ctx.unregister_session(session_id);
            send_error(sender, ErrorCode::Timeout, format!("session idle for {idle_seconds:.1}s")).await
        }
        Err(e) => send_error(sender, ErrorCode::InternalError, e.to_string()).await,
    }
}

async fn end_stream(
    ctx: &Arc<ServerContext>,
    sessions: &mut HashMap<String, ClientSession>,
    binary_session_id: &mut Option<String>,
    session_id: &str,
    sender: &mut WsSink,
) -> Result<()> {
    let Some(client) = sessions.remove(session_id) else {
        return send_error(sender, ErrorCode::UnknownSession, "no such session").await;
    };
    if binary_session_id.as_deref() == Some(session_id) {
        *binary_session_id = None;
    }
    ctx.unregister_session(session_id);

    let requires_exclusive = ctx.transcriber.capabilities().requires_exclusive_access;
    let gpu_semaphore = Arc::clone(&ctx.gpu_semaphore);
    let _permit = if requires_exclusive { Some(gpu_semaphore.acquire_owned().await.expect("gpu semaphore closed")) } else { None };

    let mut session = client.session;
    let result = tokio::task::spawn_blocking(move || session.finalize()).await.expect("finalize worker panicked");

    match result {
        Ok(r) => {
            send(
                sender,
                Envelope::result(
                    "stream_transcription_complete",
                    CompleteResult {
                        session_id: session_id.to_string(),
                        confirmed_text: r.confirmed_text,
                        tentative_text: String::new(),
                        is_final: true,
                        audio_duration: r.audio_duration_seconds,
                        language: "auto".into(),
                    },
                ),
            )
            .await
        }
        Err(e) => {
            let payload = ErrorPayload::new(ErrorCode::InternalError, e.source.to_string())
                .retryable(false)
                .confirmed_text(e.confirmed_text);
            send(sender, Envelope::error(payload)).await
        }
    }
}

fn strategy_label(ctx: &ServerContext) -> String {
    let caps = ctx.transcriber.capabilities();
    if caps.native_streaming {
        "native".to_string()
    } else if caps.word_timestamps {
        "local_agreement".to_string()
    } else {
        "chunked".to_string()
    }
}

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use ears_streaming::StreamingConfig;
use tokio::net::TcpListener;
use tracing::{error, info};
use transcriber::asr::WhisperTranscriber;
use transcriber::server::{handle_connection, ServerContext};
use whisper_rs::{SamplingStrategy, WhisperContext, WhisperContextParameters};

#[derive(Parser, Debug)]
#[command(name = "transcriber")]
struct Args {
    #[arg(short, long, default_value = "[::]", help = "address to listen on")]
    address: String,

    #[arg(short, long, default_value = "8001", help = "port to listen on")]
    port: u16,

    #[arg(short, long, help = "path to whisper model file")]
    model: String,

    #[arg(long, help = "path to optional API token")]
    token_file: Option<String>,

    #[arg(long, help = "language hint passed to whisper (default: auto-detect)")]
    language: Option<String>,

    #[arg(
        long,
        help = "Best-of (default: 1, mutually exclusive with --beam-size)",
        conflicts_with = "beam_size"
    )]
    best_of: Option<i32>,
    #[arg(
        long,
        help = "Beam search size (mutually exclusive with --best-of)",
        conflicts_with = "best_of"
    )]
    beam_size: Option<i32>,

    #[arg(long, default_value_t = 30.0, help = "max seconds of audio kept in the sliding window")]
    max_buffer_seconds: f64,

    #[arg(long, default_value_t = 2, help = "LocalAgreement-N: hypotheses a word must survive unchanged to confirm")]
    agreement_n: usize,

    #[arg(long, default_value_t = 0.5, help = "seconds of new audio required between transcriber invocations")]
    transcribe_interval_seconds: f64,

    #[arg(long, default_value_t = 200, help = "max characters of continuity prompt handed to the transcriber")]
    prompt_suffix_chars: usize,

    #[arg(long, default_value_t = 0.1, help = "tolerance for matching hypothesis words against confirmed text")]
    overlap_tolerance_seconds: f64,

    #[arg(long, default_value_t = 1.0, help = "safety back-off applied when trimming buffers after a confirmation")]
    trim_backoff_seconds: f64,

    #[arg(long, default_value_t = 30.0, help = "idle seconds after which an active session is aborted with a timeout")]
    session_timeout_seconds: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let addr: SocketAddr = format!("{}:{}", args.address, args.port).parse()?;
    info!("Loading whisper model: {}", args.model);

    let gpu_enabled = cfg!(feature = "vulkan");
    let ctx = {
        let mut params = WhisperContextParameters::default();
        params.flash_attn(true);
        #[cfg(not(feature = "vulkan"))]
        info!("Running on CPU");
        #[cfg(feature = "vulkan")]
        {
            info!("Running with GPU acceleration (Vulkan)");
            params.use_gpu(true);
        }
        Arc::new(WhisperContext::new_with_params(&args.model, params)?)
    };

    let expected_token = match &args.token_file {
        Some(path) => {
            info!("API token authentication enabled");
            Some(std::fs::read_to_string(path).map(|s| s.trim().to_string())?)
        }
        None => None,
    };

    let sampling_strategy = match (args.beam_size, args.best_of) {
        (Some(beam_size), None) => {
            info!("Using beam search with beam_size={}", beam_size);
            SamplingStrategy::BeamSearch { beam_size, patience: -1.0 }
        }
        (None, Some(best_of)) => {
            info!("Using greedy search with best_of={}", best_of);
            SamplingStrategy::Greedy { best_of }
        }
        (None, None) => {
            info!("Using greedy search with best_of=1 (default)");
            SamplingStrategy::Greedy { best_of: 1 }
        }
        (Some(_), Some(_)) => unreachable!("beam_size and best_of are mutually exclusive"),
    };

    let transcriber = Arc::new(WhisperTranscriber::new(ctx, sampling_strategy, args.language, gpu_enabled)?);

    let config = StreamingConfig {
        sample_rate: 16_000,
        max_buffer_seconds: args.max_buffer_seconds,
        agreement_n: args.agreement_n,
        transcribe_interval_samples: (args.transcribe_interval_seconds * 16_000.0) as usize,
        prompt_suffix_chars: args.prompt_suffix_chars,
        overlap_tolerance_seconds: args.overlap_tolerance_seconds,
        trim_backoff_seconds: args.trim_backoff_seconds,
        session_timeout_seconds: args.session_timeout_seconds,
    };

    let server_ctx = Arc::new(ServerContext::new(transcriber, config, expected_token));

    info!("Listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                error!("accept failed: {e}");
                continue;
            }
        };
        info!("Connection from {}", peer_addr);
        let ctx = Arc::clone(&server_ctx);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer_addr, ctx).await {
                error!("Connection error: {}", e);
            }
        });
    }
}

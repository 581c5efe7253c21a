//! Stage saver entry point
//!
//! Subscribes to one participant of a stage and records it to a Matroska file.
//!
//! # Usage
//!
//! ```bash
//! # Record participant into ./out.mkv
//! stage-saver "$STAGE_TOKEN" "$PARTICIPANT_ID"
//!
//! # Custom output, give up if no relay candidate shows up within 10s
//! stage-saver "$STAGE_TOKEN" "$PARTICIPANT_ID" \
//!   --output recordings/stage.mkv \
//!   --relay-timeout-ms 10000
//!
//! # JSON logs with debug output for this crate
//! RUST_LOG=stage_saver=debug stage-saver "$STAGE_TOKEN" "$PARTICIPANT_ID" --log-format json
//! ```

use anyhow::Context;
use clap::Parser;
use stage_saver::{
    subscribe_url, HttpSignaling, Recorder, SaverConfig, SessionNegotiator, StageMediaSetup,
    TokenDetails,
};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Record a stage participant's audio and video to disk
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Stage bearer token
    token: String,

    /// Participant to subscribe to
    participant_id: String,

    /// Output file
    #[arg(short, long, default_value = "out.mkv", env = "STAGE_SAVER_OUTPUT")]
    output: PathBuf,

    /// Audio reassembly depth in packets
    #[arg(long, default_value_t = 10, env = "STAGE_SAVER_AUDIO_JITTER_DEPTH")]
    audio_jitter_depth: u16,

    /// Video reassembly depth in packets
    #[arg(long, default_value_t = 150, env = "STAGE_SAVER_VIDEO_JITTER_DEPTH")]
    video_jitter_depth: u16,

    /// Minimum wait before a relay candidate pair is accepted, in milliseconds
    #[arg(long, default_value_t = 1000, env = "STAGE_SAVER_RELAY_MIN_WAIT_MS")]
    relay_min_wait_ms: u64,

    /// Fail if no relay candidate is gathered in time (default: wait forever)
    #[arg(long, env = "STAGE_SAVER_RELAY_TIMEOUT_MS")]
    relay_timeout_ms: Option<u64>,

    /// Redirect hops followed on signaling requests
    #[arg(long, default_value_t = 10, env = "STAGE_SAVER_MAX_REDIRECTS")]
    max_redirects: usize,

    /// Log output format
    #[arg(long, default_value = "text", env = "STAGE_SAVER_LOG_FORMAT")]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum LogFormat {
    /// Human readable lines
    Text,
    /// One JSON object per line
    Json,
}

/// Build SaverConfig from CLI arguments
fn build_config_from_args(args: &Args) -> anyhow::Result<SaverConfig> {
    let config = SaverConfig {
        output_path: args.output.clone(),
        audio_jitter_depth: args.audio_jitter_depth,
        video_jitter_depth: args.video_jitter_depth,
        relay_acceptance_min_wait_ms: args.relay_min_wait_ms,
        relay_candidate_timeout_ms: args.relay_timeout_ms,
        max_redirects: args.max_redirects,
        ..Default::default()
    };

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing(args.log_format);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .thread_name("stage-saver-worker")
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(async_main(args))
}

async fn async_main(args: Args) -> anyhow::Result<()> {
    let config = build_config_from_args(&args)?;

    let details = TokenDetails::from_token(&args.token)
        .map_err(|e| with_hint(e, "Failed to decode stage token"))?;
    info!(
        signaling_url = %details.signaling_url,
        version_major = %details.version_major,
        relay_mandatory = details.relay_mandatory(),
        send_audio = details.audio_required_to_receive(),
        "Decoded stage token"
    );

    let endpoint = subscribe_url(&details.signaling_url, &args.participant_id)
        .context("Failed to build subscribe URL")?;

    let (recorder, mut fatal) = Recorder::new(config.clone());
    let setup = StageMediaSetup::new(
        details.audio_required_to_receive(),
        config.silence_interval(),
        recorder,
    );

    let signaling = HttpSignaling::new(args.token.as_str(), config.max_redirects)
        .context("Failed to create signaling client")?;
    let negotiator = SessionNegotiator::new(signaling, config.clone());

    let peer_connection = negotiator
        .negotiate(&endpoint, details.relay_mandatory(), &setup)
        .await
        .map_err(|e| with_hint(e, "Failed to establish session"))?;

    info!(output = %config.output_path.display(), "Waiting for media");

    let outcome = tokio::select! {
        Some(e) = fatal.recv() => {
            error!(error = %e, "Recording failed");
            Err(with_hint(e, "Recording failed"))
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl+C")?;
            info!("Ctrl+C received, stopping");
            Ok(())
        }
    };

    if let Err(e) = peer_connection.close().await {
        error!(error = %e, "Failed to close peer connection");
    }

    if outcome.is_ok() && !config.output_path.exists() {
        warn!("No video was received; nothing was recorded");
    }

    outcome
}

/// Operator-facing hint for a failure, chosen by error class
fn failure_hint(e: &stage_saver::Error) -> &'static str {
    if e.is_credential_error() {
        "the stage token is unusable; request a new one"
    } else if e.is_negotiation_error() {
        "the stage could not be reached or refused the session"
    } else if e.is_recording_error() {
        "the output file could not be written"
    } else {
        "unexpected failure"
    }
}

fn with_hint(e: stage_saver::Error, step: &'static str) -> anyhow::Error {
    let hint = failure_hint(&e);
    anyhow::Error::new(e).context(format!("{} ({})", step, hint))
}

fn init_tracing(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use bookline::agent::{OpenAiCompatProvider, ReasoningRouter};
use bookline::booking::{Calendar, InMemoryCalendar, Notifier, TwilioSms};
use bookline::db::{AppointmentRepo, CallLogRepo};
use bookline::session::SessionDeps;
use bookline::tools::ToolExecutor;
use bookline::voice::{DeepgramStt, ElevenLabsTts, SpeechSynth, SpeechToText};
use bookline::{telephony, timezone, Config};

/// Bookline - voice-driven appointment booking gateway
#[derive(Parser)]
#[command(name = "bookline", version, about)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "BOOKLINE_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(long, env = "BOOKLINE_PORT", default_value = "8080")]
    port: u16,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Infer a caller timezone from a spoken local time
    TestTimezone {
        /// Time as the caller would say it, e.g. "2:30 pm"
        time: String,
    },
    /// Synthesize a test utterance and report the audio produced
    TestTts {
        /// Text to synthesize
        #[arg(default_value = "Thank you for calling! This is a test.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,bookline=info",
        1 => "info,bookline=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref())?;

    if let Some(command) = cli.command {
        return match command {
            Command::TestTimezone { time } => {
                let inferred = timezone::infer_timezone(&time, chrono::Utc::now())
                    .map_err(|reason| anyhow::anyhow!("could not parse {time:?}: {reason}"))?;
                println!(
                    "{} (offset {:+} min, reported {})",
                    inferred.tz, inferred.offset_minutes, inferred.reported_local_24h
                );
                Ok(())
            }
            Command::TestTts { text } => {
                let tts = build_tts(&config)?;
                let mut chunks = tts.synthesize(&text).await?;
                let mut samples = 0usize;
                while let Some(chunk) = chunks.recv().await {
                    samples += chunk.len();
                }
                println!(
                    "synthesized {samples} samples ({:.2}s at 8 kHz)",
                    samples as f64 / 8000.0
                );
                Ok(())
            }
        };
    }

    serve(config, cli.port).await
}

async fn serve(config: Config, port: u16) -> anyhow::Result<()> {
    std::fs::create_dir_all(&config.data_dir)?;
    let pool = bookline::db::init(config.data_dir.join("bookline.db"))?;
    let appointments = AppointmentRepo::new(pool.clone());
    let call_logs = CallLogRepo::new(pool);

    let stt = build_stt(&config)?;
    let tts = build_tts(&config)?;
    let router = Arc::new(build_router(&config)?);

    let calendar: Arc<dyn Calendar> = Arc::new(InMemoryCalendar::new(&config.business)?);
    let notifier = build_notifier(&config);
    let executor = Arc::new(ToolExecutor::new(
        calendar,
        notifier,
        appointments,
        config.business.clone(),
    )?);

    let deps = SessionDeps {
        config: Arc::new(config),
        stt,
        tts,
        router,
        executor,
        call_logs,
    };

    let app = telephony::router(deps);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_stt(config: &Config) -> anyhow::Result<Arc<dyn SpeechToText>> {
    let api_key = config
        .providers
        .deepgram_api_key
        .clone()
        .ok_or_else(|| anyhow::anyhow!("DEEPGRAM_API_KEY is required"))?;
    Ok(Arc::new(DeepgramStt::new(
        api_key,
        config.providers.deepgram_model.clone(),
    )?))
}

fn build_tts(config: &Config) -> anyhow::Result<Arc<dyn SpeechSynth>> {
    let api_key = config
        .providers
        .elevenlabs_api_key
        .clone()
        .ok_or_else(|| anyhow::anyhow!("ELEVENLABS_API_KEY is required"))?;
    Ok(Arc::new(ElevenLabsTts::new(
        api_key,
        config.providers.elevenlabs_voice.clone(),
    )?))
}

fn build_router(config: &Config) -> anyhow::Result<ReasoningRouter> {
    let groq = config
        .providers
        .groq_api_key
        .clone()
        .map(|key| OpenAiCompatProvider::groq(key, config.providers.groq_model.clone()))
        .transpose()?;
    let openai = config
        .providers
        .openai_api_key
        .clone()
        .map(|key| OpenAiCompatProvider::openai(key, config.providers.openai_model.clone()))
        .transpose()?;

    // Config validation guarantees at least one key; Groq leads when both
    // are present
    match (groq, openai) {
        (Some(primary), fallback) => Ok(ReasoningRouter::new(
            Arc::new(primary),
            fallback.map(|provider| Arc::new(provider) as _),
        )),
        (None, Some(primary)) => Ok(ReasoningRouter::new(Arc::new(primary), None)),
        (None, None) => Err(anyhow::anyhow!("no reasoning provider configured")),
    }
}

fn build_notifier(config: &Config) -> Option<Arc<dyn Notifier>> {
    let providers = &config.providers;
    match (
        providers.twilio_account_sid.clone(),
        providers.twilio_auth_token.clone(),
        providers.twilio_from_number.clone(),
    ) {
        (Some(sid), Some(token), Some(from)) => {
            Some(Arc::new(TwilioSms::new(sid, token, from)) as _)
        }
        _ => {
            tracing::warn!("twilio credentials not set; sms confirmations disabled");
            None
        }
    }
}

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scribe_capture::{
    create_router, AppState, AudioBackendFactory, AudioSource, BackendAudioSource, CaptureError,
    CapturePipeline, Config, HttpSessionStore, InputDevice,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "scribe-capture", version, about = "Chunked audio capture for recording sessions")]
struct Cli {
    /// Config file, without extension
    #[arg(long, default_value = "config/scribe-capture")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record one session end to end from an input file
    Record {
        /// Audio file to replay as the input device
        #[arg(short, long)]
        input: String,

        /// Stop after this many seconds (Ctrl-C finishes early)
        #[arg(short, long)]
        duration: Option<u64>,

        /// Notes to attach to the session
        #[arg(long)]
        notes: Option<String>,
    },
    /// Run the local control API
    Serve {
        /// Audio file to replay as the input device (silence if omitted)
        #[arg(short, long)]
        input: Option<String>,
    },
}

fn input_device(input: Option<&str>) -> InputDevice {
    match input {
        Some(path) => InputDevice::File(PathBuf::from(shellexpand::tilde(path).as_ref())),
        None => InputDevice::Silence,
    }
}

fn build_pipeline(cfg: &Config, device: InputDevice) -> Result<CapturePipeline> {
    let store = HttpSessionStore::new(&cfg.store).context("Failed to build session store client")?;
    let backend_config = cfg.backend_config();

    let sources = move || -> Result<Box<dyn AudioSource>, CaptureError> {
        let backend = AudioBackendFactory::create(device.clone(), backend_config.clone())
            .map_err(|e| CaptureError::DeviceUnavailable(format!("{:#}", e)))?;
        Ok(Box::new(BackendAudioSource::new(backend, backend_config.clone())))
    };

    Ok(CapturePipeline::new(
        Arc::new(store),
        Arc::new(sources),
        cfg.capture_config(),
    ))
}

async fn record(cfg: Config, input: String, duration: Option<u64>, notes: Option<String>) -> Result<()> {
    let pipeline = build_pipeline(&cfg, input_device(Some(&input)))?;

    let session = pipeline.create_and_attach().await?;
    info!("Recording session {} created", session.id);

    if let Some(notes) = notes {
        pipeline.update_notes(&notes).await?;
    }

    pipeline.start().await?;

    let limit = async {
        match duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::select! {
        _ = limit => info!("Recording duration reached"),
        _ = tokio::signal::ctrl_c() => info!("Interrupted; finishing recording"),
    }

    pipeline.finish().await?;

    let stats = pipeline.stats();
    info!(
        "Recording {} finished: {} chunk(s) uploaded, {} failed, {}s elapsed",
        session.id, stats.chunks_uploaded, stats.chunks_failed, stats.elapsed_secs
    );
    if stats.chunks_failed > 0 {
        warn!("{} chunk(s) were not delivered", stats.chunks_failed);
    }

    Ok(())
}

async fn serve(cfg: Config, input: Option<String>) -> Result<()> {
    let pipeline = build_pipeline(&cfg, input_device(input.as_deref()))?;
    let app = create_router(AppState::new(pipeline.clone()));

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Control API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;

    // Finishes an in-progress recording before exit
    pipeline.detach().await?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    let cfg = Config::load(&cli.config).context("Failed to load configuration")?;
    info!("Scribe Capture v{}", env!("CARGO_PKG_VERSION"));
    info!("Session store: {}", cfg.store.base_url);

    match cli.command {
        Command::Record {
            input,
            duration,
            notes,
        } => record(cfg, input, duration, notes).await,
        Command::Serve { input } => serve(cfg, input).await,
    }
}

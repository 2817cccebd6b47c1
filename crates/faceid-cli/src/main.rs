use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use faceid_core::capability::Embedder;
use faceid_core::controller::{Command, Controller, Outcome};
use faceid_core::database::FaceDatabase;
use faceid_core::remote::HttpVerifier;
use faceid_core::store::{self, DatabaseStore};
use faceid_core::types::{ChannelOrder, Frame};
use faceid_onnx::{ArcFaceExtractor, YoloFaceDetector};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod inspect;
mod session;

use config::Config;
use engine::{EngineError, EngineHandle};
use session::SessionLine;

#[derive(Parser)]
#[command(name = "faceid", about = "Face enrollment and verification against a local index")]
struct Cli {
    /// TOML config file (default: $FACEID_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Treat decoded images as BGR frames
    #[arg(long, global = true)]
    bgr: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll the face in an image
    Register { image: PathBuf },
    /// Look up the face in an image
    Search { image: PathBuf },
    /// Search locally, then ask the remote verifier
    Verify { image: PathBuf },
    /// Read commands from stdin, one cycle per line
    Session,
    /// Report on the persisted database without modifying it
    Inspect {
        /// Print each label with its vector
        #[arg(long)]
        vectors: bool,
        /// Number of leading components to print per vector
        #[arg(long, default_value_t = 8)]
        dims: usize,
        /// Machine-readable output
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let order = if cli.bgr { ChannelOrder::Bgr } else { ChannelOrder::Rgb };

    match cli.command {
        Commands::Inspect { vectors, dims, json } => {
            let paths = Config::load_paths(cli.config.as_deref())?;
            let inspection = store::inspect(&paths)?;
            let report = inspect::Report::build(
                &inspection,
                inspect::ReportOptions { show_vectors: vectors, dims },
            );
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report.render_text());
            }
        }
        Commands::Register { image } => one_shot(cli.config.as_deref(), &image, order, Command::Register).await?,
        Commands::Search { image } => one_shot(cli.config.as_deref(), &image, order, Command::Search).await?,
        Commands::Verify { image } => one_shot(cli.config.as_deref(), &image, order, Command::Verify).await?,
        Commands::Session => {
            let engine = start(cli.config.as_deref())?;
            run_session(&engine, order).await?;
        }
    }

    Ok(())
}

/// Load configuration, models and the database, and spawn the engine.
///
/// Every failure here is fatal, including a corrupt database.
fn start(config_path: Option<&Path>) -> Result<EngineHandle> {
    let config = Config::load(config_path)?;
    tracing::info!(
        policy = %config.normalization,
        threshold = config.distance_threshold.value(),
        remote = config.remote_url.as_deref().unwrap_or("none"),
        "faceid starting"
    );

    let detector = YoloFaceDetector::load(&config.detector_model, config.intra_threads)
        .context("loading face detector")?;
    let extractor = ArcFaceExtractor::load(&config.extractor_model, config.intra_threads)
        .context("loading descriptor extractor")?;

    let store = DatabaseStore::new(config.database_paths(), config.normalization);
    let database = FaceDatabase::open(store).context("opening face database")?.into_shared();

    let mut controller = Controller::new(
        detector,
        Embedder::new(extractor, config.normalization),
        database,
        config.controller_settings(),
    );
    if let Some(remote) = config.verifier_config() {
        let verifier = HttpVerifier::new(remote);
        tracing::info!(enroll = verifier.enroll_url(), verify = verifier.verify_url(), "remote verifier configured");
        controller = controller.with_verifier(Arc::new(verifier));
    }

    Ok(engine::spawn_engine(controller, "faceid-engine")?)
}

async fn one_shot(config_path: Option<&Path>, image: &Path, order: ChannelOrder, command: Command) -> Result<()> {
    let engine = start(config_path)?;
    run_cycle(&engine, image, order, command).await;
    Ok(())
}

/// Run one cycle and print its outcome line. Per-cycle failures are reported,
/// never propagated.
async fn run_cycle(engine: &EngineHandle, image: &Path, order: ChannelOrder, command: Command) {
    let frame = match load_frame(image, order) {
        Ok(frame) => frame,
        Err(e) => {
            println!("ERROR image: {e:#}");
            return;
        }
    };
    match engine.cycle(frame, command).await {
        Ok(outcome) => println!("{outcome}"),
        Err(EngineError::Pipeline(e)) => println!("ERROR {}: {e}", e.kind()),
        Err(e) => println!("ERROR engine: {e}"),
    }
}

async fn run_session(engine: &EngineHandle, order: ChannelOrder) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    tracing::info!("session ready: r|s|v|d <image>, q to quit");

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("reading stdin")?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
        };
        let Some(line) = line else { break };

        match session::parse_line(&line) {
            Ok(SessionLine::Skip) => {}
            Ok(SessionLine::Quit) => {
                println!("{}", Outcome::Quit);
                break;
            }
            Ok(SessionLine::Cycle { command, image }) => run_cycle(engine, &image, order, command).await,
            Err(e) => println!("ERROR input: {e}"),
        }
    }

    tracing::info!("session finished");
    Ok(())
}

fn load_frame(path: &Path, order: ChannelOrder) -> Result<Frame> {
    let image = image::open(path)
        .with_context(|| format!("decoding {}", path.display()))?
        .to_rgb8();
    Ok(Frame::new(image, order))
}

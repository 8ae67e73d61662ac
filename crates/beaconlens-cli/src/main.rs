//! beaconlens CLI — read beacon LED levels from camera frames.

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use beaconlens::{
    parse_detection_request, AnalysisReport, AnalyzerConfig, BeaconAnalyzer, DetectionResult,
    DeviceCatalog, ImageSequence, JobRegistry, JobStatus,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "beaconlens")]
#[command(about = "Locate beacon devices' calibration markers and read their LED levels")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze every requested detection in a single frame.
    Analyze(CliAnalyzeArgs),

    /// Analyze an image sequence on a background job.
    AnalyzeSequence(CliSequenceArgs),

    /// Print the loaded device definitions.
    DeviceInfo {
        /// Path to the device definition document (JSON).
        #[arg(long)]
        definitions: PathBuf,
    },
}

#[derive(Debug, Clone, Args)]
struct CliAnalyzeArgs {
    /// Path to the device definition document (JSON).
    #[arg(long)]
    definitions: PathBuf,

    /// Path to the input frame.
    #[arg(long)]
    image: PathBuf,

    /// Path to the detection request (JSON).
    #[arg(long)]
    request: PathBuf,

    /// Path to write the report (JSON). Printed to stdout when omitted.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Path to an analyzer configuration (JSON).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory to save rectified device images into (PNG).
    #[arg(long)]
    rectified_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct CliSequenceArgs {
    /// Path to the device definition document (JSON).
    #[arg(long)]
    definitions: PathBuf,

    /// Path to the detection request (JSON), applied to every frame.
    #[arg(long)]
    request: PathBuf,

    /// Frame images, in order.
    #[arg(long, num_args = 1.., required = true)]
    frames: Vec<PathBuf>,

    /// Path to write the report (JSON).
    #[arg(long)]
    out: PathBuf,

    /// Path to an analyzer configuration (JSON).
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze(args) => run_analyze(&args),
        Commands::AnalyzeSequence(args) => run_analyze_sequence(&args),
        Commands::DeviceInfo { definitions } => run_device_info(&definitions),
    }
}

fn load_analyzer(definitions: &Path, config: Option<&Path>) -> CliResult<BeaconAnalyzer> {
    tracing::info!("Loading device definitions: {}", definitions.display());
    let catalog = DeviceCatalog::from_json_file(definitions)?;
    let config = match config {
        Some(path) => {
            tracing::info!("Loading analyzer config: {}", path.display());
            AnalyzerConfig::from_json_file(path)?
        }
        None => AnalyzerConfig::default(),
    };
    Ok(BeaconAnalyzer::with_config(catalog, config))
}

fn load_request(path: &Path) -> CliResult<Vec<DetectionResult>> {
    let data = std::fs::read_to_string(path)?;
    let detections = parse_detection_request(&data)?;
    tracing::info!("{} detection(s) requested", detections.len());
    Ok(detections)
}

fn run_device_info(definitions: &Path) -> CliResult<()> {
    let catalog = DeviceCatalog::from_json_file(definitions)?;
    println!("{} device type(s)", catalog.len());
    print!("{}", catalog);
    Ok(())
}

fn run_analyze(args: &CliAnalyzeArgs) -> CliResult<()> {
    let analyzer = load_analyzer(&args.definitions, args.config.as_deref())?;
    let detections = load_request(&args.request)?;

    tracing::info!("Loading image: {}", args.image.display());
    let frame = image::open(&args.image)?.to_rgb8();
    let (w, h) = frame.dimensions();
    tracing::info!("Image size: {}x{}", w, h);

    if let Some(dir) = &args.rectified_dir {
        std::fs::create_dir_all(dir)?;
    }

    let mut report = AnalysisReport::new();
    let mut degraded = 0usize;
    for det in &detections {
        let result = analyzer.analyze(&frame, det)?;
        if result.is_degraded() {
            degraded += 1;
        }
        if let (Some(dir), Some(img)) = (&args.rectified_dir, &result.rectified) {
            let path = dir.join(format!("{}.png", result.device_key()));
            img.save(&path)?;
            tracing::debug!("Rectified image written to {}", path.display());
        }
        report.record(&result, 0);
    }

    tracing::info!(
        "Analyzed {} device(s), {} without markers",
        detections.len(),
        degraded
    );

    match &args.out {
        Some(out) => {
            report.write_json(out, 1)?;
            tracing::info!("Results written to {}", out.display());
        }
        None => println!("{}", report.to_json_string(1)),
    }
    Ok(())
}

fn run_analyze_sequence(args: &CliSequenceArgs) -> CliResult<()> {
    let analyzer = load_analyzer(&args.definitions, args.config.as_deref())?;
    let detections = load_request(&args.request)?;

    let registry = JobRegistry::new(Arc::new(analyzer));
    let source = ImageSequence::new(args.frames.iter().cloned());
    let id = registry.submit(source, detections)?;

    let mut updates = registry.subscribe(id)?;
    loop {
        if updates.has_changed().unwrap_or(false) {
            let status = updates.borrow_and_update().clone();
            match status {
                JobStatus::Running {
                    progress,
                    frames_done,
                } => {
                    tracing::info!(
                        "{}: {} frame(s) done ({:.0}%)",
                        id,
                        frames_done,
                        progress * 100.0
                    );
                }
                _ => break,
            }
        }
        if registry.status(id)?.is_terminal() {
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    match registry.wait(id)? {
        JobStatus::Completed { frames, report } => {
            report.write_json(&args.out, frames)?;
            tracing::info!(
                "{}: {} frame(s) analyzed, results written to {}",
                id,
                frames,
                args.out.display()
            );
            Ok(())
        }
        JobStatus::Failed { message } => Err(format!("{} failed: {}", id, message).into()),
        JobStatus::Cancelled { frames_done } => {
            Err(format!("{} cancelled after {} frame(s)", id, frames_done).into())
        }
        JobStatus::Running { .. } => Err(format!("{} did not finish", id).into()),
    }
}

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use cctv_track::io::{
    FrameSource, ImageSequenceSource, ImageSequenceWriter, OutputSink, PrefetchSource,
};
use cctv_track::{
    CancellationToken, InputSource, PacingMode, PipelineConfig, ReplayRecognizer, TrackerPipeline,
};

/// Track recognized persons through an image-sequence video using recorded
/// recognition results.
#[derive(Parser, Debug)]
#[command(name = "cctv-track", version)]
struct Args {
    /// Directory of frames (png/jpg/bmp), read in file-name order
    #[arg(long)]
    input: Option<String>,
    /// JSON recording of per-frame detections
    #[arg(long, value_name = "PATH")]
    detections: PathBuf,
    /// Directory for annotated frames
    #[arg(long, value_name = "DIR")]
    output: Option<PathBuf>,
    /// JSON pipeline configuration; flags override its values
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Frames per second to process (default: every frame)
    #[arg(long)]
    target_fps: Option<f64>,
    /// Native rate of the input sequence
    #[arg(long)]
    source_fps: Option<f64>,
    #[arg(long, value_enum)]
    pacing: Option<Pacing>,
    #[arg(long)]
    iou_threshold: Option<f32>,
    #[arg(long)]
    eviction_threshold: Option<u32>,
    /// Decode frames ahead on a worker thread, up to N queued
    #[arg(long, value_name = "N")]
    prefetch: Option<usize>,
    /// Font used for labels and telemetry text
    #[arg(long, value_name = "PATH")]
    font: Option<PathBuf>,
    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum Pacing {
    Accumulator,
    FixedInterval,
}

impl From<Pacing> for PacingMode {
    fn from(pacing: Pacing) -> Self {
        match pacing {
            Pacing::Accumulator => PacingMode::Accumulator,
            Pacing::FixedInterval => PacingMode::FixedInterval,
        }
    }
}

fn build_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig {
            source_fps: Some(30.0),
            ..PipelineConfig::default()
        },
    };

    if let Some(input) = &args.input {
        config.input_source = input.parse()?;
    }
    if args.output.is_some() {
        config.output_path = args.output.clone();
    }
    if args.target_fps.is_some() {
        config.target_fps = args.target_fps;
    }
    if args.source_fps.is_some() {
        config.source_fps = args.source_fps;
    }
    if let Some(pacing) = args.pacing {
        config.pacing = pacing.into();
    }
    if let Some(iou) = args.iou_threshold {
        config.tracker.iou_threshold = iou;
    }
    if let Some(eviction) = args.eviction_threshold {
        config.tracker.eviction_threshold = eviction;
    }
    if args.prefetch.is_some() {
        config.prefetch_depth = args.prefetch;
    }
    if args.font.is_some() {
        config.annotation.font_path = args.font.clone();
    }
    config.validate()?;
    Ok(config)
}

fn open_source(config: &PipelineConfig) -> Result<Box<dyn FrameSource>> {
    let dir = match &config.input_source {
        InputSource::Path(path) if !path.as_os_str().is_empty() => path.clone(),
        InputSource::Path(_) => bail!("no input given (use --input or input_source in --config)"),
        InputSource::Device(device) => {
            bail!("device:{device}: live capture devices need a capture backend; only image sequences are bundled")
        }
    };
    let source = ImageSequenceSource::new(dir, config.source_fps);
    Ok(match config.prefetch_depth {
        Some(depth) => Box::new(PrefetchSource::new(source, depth)),
        None => Box::new(source),
    })
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let args = Args::parse();
    let config = build_config(&args)?;

    let recognizer = ReplayRecognizer::from_json_file(&args.detections)
        .with_context(|| format!("loading detections {}", args.detections.display()))?;
    info!(frames = recognizer.len(), "detections loaded");

    let source = open_source(&config)?;
    let mut sink = OutputSink::new();
    if let Some(dir) = &config.output_path {
        sink = sink.with_writer(ImageSequenceWriter::new(dir));
    }

    let token = CancellationToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || handler_token.cancel()).context("installing Ctrl-C handler")?;

    let mut pipeline = TrackerPipeline::new(recognizer, source, sink, config)?.with_cancel(token);
    let summary = pipeline.run();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Processing complete: {:?}", summary.termination);
        println!(
            "Frames processed: {}/{}",
            summary.frames_processed, summary.frames_seen
        );
        println!("Peak tracks: {}", summary.peak_tracks);
        println!("Processing time: {:.2} seconds", summary.elapsed_secs);
        println!("Average FPS: {:.2}", summary.average_fps());
    }

    if summary.is_success() {
        return Ok(());
    }
    match summary.error {
        Some(err) => Err(err.into()),
        None => bail!("run ended with {:?}", summary.termination),
    }
}

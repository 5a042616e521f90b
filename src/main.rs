//! Virtual glasses try-on: composites eyewear onto a mirrored camera feed.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use glasses_tryon::{
    config::Config,
    error::Result,
    pipeline::{run_headless, FrameInput, LandmarkInput, Pipeline},
};

/// Try on eyewear styles over a live camera or recorded frames
#[derive(Parser, Debug)]
#[command(name = "glasses-tryon", version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory of still frames to use instead of the camera
    #[arg(long)]
    frames: Option<PathBuf>,

    /// JSON-lines landmark recording to use instead of the face tracker
    #[arg(long)]
    landmarks: Option<PathBuf>,

    /// Eyewear style to start with (overrides config)
    #[arg(short, long)]
    style: Option<u32>,

    /// Write composited frames to this directory instead of opening a window
    #[arg(long, value_name = "OUT_DIR")]
    headless: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(log_level.into())
                .from_env_lossy(),
        )
        .init();

    info!("Starting {} v{}", glasses_tryon::NAME, glasses_tryon::VERSION);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(style) = args.style {
        config.catalog.default_style = style;
        config.validate()?;
    }

    let headless = args.headless.is_some();
    let frames = frame_input(&args, &config, headless)?;
    let landmarks = landmark_input(&args, &config)?;

    if let Some(out_dir) = &args.headless {
        let mut pipeline = Pipeline::from_config(&config, frames, landmarks)?;
        run_headless(&mut pipeline, out_dir)?;
        return Ok(());
    }

    run_viewer(config, frames, landmarks)
}

fn frame_input(args: &Args, config: &Config, headless: bool) -> Result<FrameInput> {
    if let Some(dir) = &args.frames {
        // replay in real time when someone is watching
        let fps = (!headless).then_some(config.camera.fps);
        return Ok(FrameInput::Stills {
            dir: dir.clone(),
            fps,
        });
    }

    #[cfg(feature = "camera")]
    {
        Ok(FrameInput::Webcam(config.camera.clone()))
    }
    #[cfg(not(feature = "camera"))]
    {
        use glasses_tryon::error::ConfigError;
        let _ = config;
        Err(ConfigError::invalid("frames", "built without camera support, pass --frames").into())
    }
}

fn landmark_input(args: &Args, config: &Config) -> Result<LandmarkInput> {
    if let Some(path) = &args.landmarks {
        return Ok(LandmarkInput::Recorded(path.clone()));
    }

    #[cfg(feature = "onnx")]
    {
        Ok(LandmarkInput::FaceMesh(config.tracker.clone()))
    }
    #[cfg(not(feature = "onnx"))]
    {
        use glasses_tryon::error::ConfigError;
        let _ = config;
        Err(ConfigError::invalid("landmarks", "built without face tracking, pass --landmarks").into())
    }
}

#[cfg(feature = "gui")]
fn run_viewer(config: Config, frames: FrameInput, landmarks: LandmarkInput) -> Result<()> {
    use std::sync::{Arc, Mutex};

    use glasses_tryon::app::TryOnApp;
    use glasses_tryon::error::TryOnError;
    use glasses_tryon::pipeline::spawn_worker;
    use glasses_tryon::utils::State;

    let shared_state = Arc::new(Mutex::new(State::default()));
    let worker = spawn_worker(
        move || Pipeline::from_config(&config, frames, landmarks),
        shared_state.clone(),
    )?;

    let native_options = eframe::NativeOptions::default();
    eframe::run_native(
        "Virtual Glasses Try-On",
        native_options,
        Box::new(move |cc| Box::new(TryOnApp::new(cc, shared_state, worker))),
    )
    .map_err(|e| TryOnError::Viewer(e.to_string()))?;

    info!("viewer closed");
    Ok(())
}

#[cfg(not(feature = "gui"))]
fn run_viewer(_config: Config, _frames: FrameInput, _landmarks: LandmarkInput) -> Result<()> {
    use glasses_tryon::error::ConfigError;
    Err(ConfigError::invalid("headless", "built without a viewer, pass --headless <OUT_DIR>").into())
}

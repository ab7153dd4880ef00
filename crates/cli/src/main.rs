use std::path::PathBuf;
use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use faceid_core::capture::infrastructure::ffmpeg_frame_source::{CaptureInput, FfmpegFrameSource};
use faceid_core::dataset::dataset_builder::DatasetBuilder;
use faceid_core::dataset::domain::face_image_store::FaceImageStore;
use faceid_core::dataset::infrastructure::directory_image_store::DirectoryImageStore;
use faceid_core::detection::domain::face_locator::FaceLocator;
use faceid_core::detection::infrastructure::model_resolver;
use faceid_core::detection::infrastructure::onnx_face_locator::OnnxFaceLocator;
use faceid_core::enrollment::capture_session::TickOutcome;
use faceid_core::pipeline::enrollment_driver::run_enrollment;
use faceid_core::pipeline::face_id_controller::{FaceIdComponents, FaceIdController};
use faceid_core::pipeline::identify_face_use_case::IdentifyOutcome;
use faceid_core::pipeline::infrastructure::threaded_training_executor::ThreadedTrainingExecutor;
use faceid_core::pipeline::training_executor::{TrainingJob, TrainingReport};
use faceid_core::recognition::domain::recognition_engine::RecognitionEngine;
use faceid_core::recognition::infrastructure::eigenface_engine::EigenfaceEngine;
use faceid_core::recognition::model_store::ModelStore;
use faceid_core::shared::config::FaceIdConfig;
use faceid_core::shared::constants::{FACE_MODEL_NAME, FACE_MODEL_URL};
use faceid_core::shared::error::MessageCategory;

/// How long to wait for the camera to deliver its first frame.
const FIRST_FRAME_TIMEOUT: Duration = Duration::from_secs(10);

/// Face enrollment and identification from a camera or video.
#[derive(Parser)]
#[command(name = "faceid")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file (defaults to the user config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Camera index.
    #[arg(long, global = true)]
    camera: Option<u32>,

    /// Video file or device path to read instead of the camera.
    #[arg(long, global = true)]
    source: Option<PathBuf>,

    /// Trained model file.
    #[arg(long, global = true)]
    model: Option<PathBuf>,

    /// Directory of enrolled face images.
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Report matches farther than this distance as low confidence.
    #[arg(long, global = true)]
    max_distance: Option<f64>,
}

#[derive(Subcommand)]
enum Command {
    /// Capture a burst of faces for LABEL and retrain the model.
    Enroll {
        /// Numeric identity label.
        label: String,
    },
    /// Identify the face currently in view.
    Identify,
    /// Retrain the model from the stored faces.
    Train,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Command::Enroll { label } => enroll(&config, &label),
        Command::Identify => identify(&config),
        Command::Train => train(&config),
    }
}

fn load_config(cli: &Cli) -> Result<FaceIdConfig, Box<dyn std::error::Error>> {
    let mut config = FaceIdConfig::load(cli.config.as_deref())?;
    if let Some(index) = cli.camera {
        config.camera_index = index;
        config.source = None;
    }
    if let Some(source) = &cli.source {
        config.source = Some(source.clone());
    }
    if let Some(model) = &cli.model {
        config.model_path = model.clone();
    }
    if let Some(store) = &cli.store {
        config.image_store_dir = store.clone();
    }
    if cli.max_distance.is_some() {
        config.max_distance = cli.max_distance;
    }
    config.validate()?;
    Ok(config)
}

fn enroll(config: &FaceIdConfig, label: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut controller = build_controller(config)?;
    let limit = config.tick_limit;
    let mut captured = 0usize;

    let report = run_enrollment(&mut controller, label, config.tick_interval(), |tick, outcome| {
        if matches!(outcome, TickOutcome::Captured(_)) {
            captured += 1;
        }
        eprint!("\rCapturing {tick}/{limit} ({captured} face(s))");
        if tick == limit {
            eprintln!();
            eprintln!("Training...");
        }
    });
    let report = report?;

    print_report(MessageCategory::TrainingComplete, &report);
    Ok(())
}

fn identify(config: &FaceIdConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut controller = build_controller(config)?;
    let outcome = controller.identify_once()?;

    let detail = match outcome {
        IdentifyOutcome::Matched { label, distance } => {
            format!("label {label} (distance {distance:.3})")
        }
        IdentifyOutcome::LowConfidence { label, distance } => {
            format!("closest label {label} (distance {distance:.3})")
        }
        IdentifyOutcome::NoFaceFound => "no face in the current frame".to_string(),
        IdentifyOutcome::NoModelAvailable => {
            "no trained model yet, enroll someone first".to_string()
        }
    };
    println!("{}: {detail}", outcome.category());
    Ok(())
}

fn train(config: &FaceIdConfig) -> Result<(), Box<dyn std::error::Error>> {
    let engine: Arc<dyn RecognitionEngine> = Arc::new(EigenfaceEngine::new(config.num_components));
    let job = TrainingJob {
        builder: DatasetBuilder::new(
            image_store(config),
            config.face_size(),
            config.corrupt_entry_policy,
        ),
        engine: engine.clone(),
        model_store: Arc::new(ModelStore::new(config.model_path.clone(), engine)),
    };

    let report = job.run(&AtomicBool::new(false))?;
    print_report(MessageCategory::TrainingComplete, &report);
    Ok(())
}

fn print_report(category: MessageCategory, report: &TrainingReport) {
    println!(
        "{category}: {} image(s) across {} label(s), {} skipped",
        report.images, report.labels, report.skipped
    );
}

fn image_store(config: &FaceIdConfig) -> Arc<dyn FaceImageStore> {
    Arc::new(DirectoryImageStore::new(config.image_store_dir.clone()))
}

fn build_controller(config: &FaceIdConfig) -> Result<FaceIdController, Box<dyn std::error::Error>> {
    let locator = build_locator(config)?;

    let input = match &config.source {
        Some(path) => CaptureInput::Path(path.clone()),
        None => CaptureInput::Camera(config.camera_index),
    };
    let frames = FfmpegFrameSource::open(input)?;
    if frames.wait_for_frame(FIRST_FRAME_TIMEOUT).is_none() {
        return Err("Frame source delivered no frames".into());
    }

    Ok(FaceIdController::new(
        FaceIdComponents {
            frames: Box::new(frames),
            locator,
            image_store: image_store(config),
            engine: Arc::new(EigenfaceEngine::new(config.num_components)),
            executor: Box::new(ThreadedTrainingExecutor::new()),
        },
        config,
    ))
}

fn build_locator(
    config: &FaceIdConfig,
) -> Result<Box<dyn FaceLocator>, Box<dyn std::error::Error>> {
    log::info!("Resolving model: {FACE_MODEL_NAME}");
    let model_path = model_resolver::resolve(
        FACE_MODEL_NAME,
        FACE_MODEL_URL,
        config.locator.model_path.as_deref(),
        Some(Box::new(download_progress)),
    )?;

    Ok(Box::new(OnnxFaceLocator::new(
        &model_path,
        config.locator.clone(),
    )?))
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading face detection model... {pct}%");
    } else {
        eprint!("\rDownloading face detection model... {downloaded} bytes");
    }
    if total > 0 && downloaded >= total {
        eprintln!();
    }
}

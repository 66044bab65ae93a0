use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rollcall_core::gate::DEFAULT_ACTIVE_DAYS;
use rollcall_core::{
    ActiveWindow, EuclideanMatcher, FaceDetector, FaceMatcher, FaceRecognizer, ReferenceCatalog,
};
use rollcall_hw::Camera;
use rollcall_notify::{ApiSettings, AttendanceNotifier, UreqTransport, TIMESTAMP_FORMAT};
use serde_json::json;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall attendance capture tooling")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the reference catalog and print it as JSON
    Catalog {
        #[command(flatten)]
        models: ModelArgs,
        /// Print names only, without embeddings
        #[arg(long)]
        names: bool,
    },
    /// Match every face in a still image against the catalog
    Probe {
        /// Image file to probe
        #[arg(value_name = "IMAGE")]
        path: PathBuf,
        #[command(flatten)]
        models: ModelArgs,
        /// Maximum embedding distance for a match
        #[arg(long, env = "ROLLCALL_TOLERANCE", default_value_t = rollcall_core::types::DEFAULT_TOLERANCE)]
        tolerance: f32,
    },
    /// Report whether the current local time is inside the active window
    Gate {
        #[arg(long, env = "ROLLCALL_ACTIVE_START", default_value = "07:30")]
        start: String,
        #[arg(long, env = "ROLLCALL_ACTIVE_END", default_value = "23:59")]
        end: String,
    },
    /// Send one attendance record for a name and print the outcome
    Notify {
        /// Name as it appears in the reference directory
        name: String,
        #[command(flatten)]
        api: ApiArgs,
    },
    /// List V4L2 capture devices
    Devices,
}

#[derive(Args)]
struct ModelArgs {
    /// Directory containing the ONNX models
    #[arg(long, env = "ROLLCALL_MODEL_DIR")]
    model_dir: Option<PathBuf>,
    /// Directory of reference images
    #[arg(long, env = "ROLLCALL_REFERENCE_DIR", default_value = "Students")]
    reference_dir: PathBuf,
}

#[derive(Args)]
struct ApiArgs {
    #[arg(long, env = "ROLLCALL_API_URL")]
    api_url: Option<String>,
    #[arg(long, env = "ROLLCALL_CHECKPOINT_ID")]
    checkpoint_id: Option<i64>,
    #[arg(long, env = "ROLLCALL_TIMETABLE_ID")]
    timetable_id: Option<i64>,
    #[arg(long, env = "ROLLCALL_PLATFORM")]
    platform: Option<String>,
}

impl ApiArgs {
    fn settings(self) -> ApiSettings {
        let defaults = ApiSettings::default();
        ApiSettings {
            base_url: self.api_url.unwrap_or(defaults.base_url),
            checkpoint_id: self.checkpoint_id.unwrap_or(defaults.checkpoint_id),
            attendance_timetable_id: self.timetable_id.unwrap_or(defaults.attendance_timetable_id),
            platform: self.platform.unwrap_or(defaults.platform),
        }
    }
}

struct Models {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
    catalog: ReferenceCatalog,
}

fn load_models(args: &ModelArgs) -> Result<Models> {
    let model_dir = args
        .model_dir
        .clone()
        .unwrap_or_else(rollcall_core::default_model_dir);
    let mut detector = FaceDetector::load(&model_path(&model_dir, rollcall_core::detector::SCRFD_MODEL_FILE))
        .context("loading face detector")?;
    let mut recognizer = FaceRecognizer::load(&model_path(&model_dir, rollcall_core::recognizer::ARCFACE_MODEL_FILE))
        .context("loading face recognizer")?;
    let catalog = ReferenceCatalog::load_dir(&mut detector, &mut recognizer, &args.reference_dir)
        .with_context(|| format!("building catalog from {}", args.reference_dir.display()))?;
    Ok(Models { detector, recognizer, catalog })
}

fn model_path(dir: &Path, file: &str) -> String {
    dir.join(file).to_string_lossy().into_owned()
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Catalog { models, names } => {
            let Models { catalog, .. } = load_models(&models)?;
            if names {
                for name in catalog.names() {
                    println!("{name}");
                }
            } else {
                println!("{}", serde_json::to_string_pretty(&catalog)?);
            }
        }
        Commands::Probe { path, models, tolerance } => {
            let Models { mut detector, mut recognizer, catalog } = load_models(&models)?;
            let frame = image::open(&path)
                .with_context(|| format!("opening {}", path.display()))?
                .to_rgb8();
            let matcher = FaceMatcher::new(EuclideanMatcher { tolerance });

            let boxes = detector.detect(&frame)?;
            if boxes.is_empty() {
                println!("No faces found in {}", path.display());
            }
            for bbox in &boxes {
                let result =
                    matcher.identify(&mut detector, &mut recognizer, catalog.entries(), &frame, bbox)?;
                let report = match result {
                    Some(result) => json!({
                        "box": bbox,
                        "identity": result.identity.to_string(),
                        "distance": result.distance,
                    }),
                    None => json!({ "box": bbox, "identity": null }),
                };
                println!("{report}");
            }
        }
        Commands::Gate { start, end } => {
            let window = ActiveWindow::new(&start, &end, &DEFAULT_ACTIVE_DAYS)?;
            let now = chrono::Local::now().naive_local();
            let state = if window.is_active(now) { "active" } else { "inactive" };
            println!("{} {state} ({start}-{end}, Mon-Fri)", now.format("%a %H:%M"));
        }
        Commands::Notify { name, api } => {
            let notifier = AttendanceNotifier::new(UreqTransport::new(), api.settings());
            let date_time_in = chrono::Local::now().naive_local().format(TIMESTAMP_FORMAT).to_string();
            let status = notifier.notify(&name, &date_time_in);
            println!("{name}: {status}");
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No video capture devices found");
            }
            for dev in devices {
                println!("{}  {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
            }
        }
    }

    Ok(())
}

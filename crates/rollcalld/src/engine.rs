use crate::config::Config;
use crate::render::Renderer;
use chrono::NaiveDateTime;
use rollcall_core::{
    ActiveWindow, BoundingBox, CatalogError, DetectorError, EuclideanMatcher, FaceDetector,
    FaceEmbedder, FaceLocator, FaceMatcher, FaceRecognizer, Identity, RecognizerError,
    ReferenceCatalog, SampledDetections,
};
use rollcall_hw::{Camera, CameraError, Frame, FrameSource};
use rollcall_notify::{
    spawn_notifier, AttendanceNotifier, AttendanceStatus, NotifierHandle, Outcome, Submission,
    UreqTransport, WorkerError, TIMESTAMP_FORMAT,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Sleep between gate checks while outside the active window.
const INACTIVE_POLL: Duration = Duration::from_millis(250);
/// Back-off after a failed frame read.
const FRAME_RETRY: Duration = Duration::from_millis(10);

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("config error: {0}")]
    Config(#[from] crate::config::ConfigError),
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("notifier error: {0}")]
    Notifier(#[from] WorkerError),
    #[error("label font: {0}")]
    Font(#[from] ab_glyph::InvalidFont),
}

/// What to draw around one face.
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayLabel {
    Known {
        name: String,
        status: Option<AttendanceStatus>,
    },
    Unknown,
}

/// One located face and what became of it this frame. `label` is `None`
/// when the crop yielded no embedding.
#[derive(Debug, Clone)]
pub struct FaceOverlay {
    pub bbox: BoundingBox,
    pub label: Option<OverlayLabel>,
}

/// Result of one loop iteration.
pub enum Tick {
    /// Outside the active window; the camera was not read.
    Inactive,
    /// The frame read failed and was skipped.
    NoFrame,
    Processed {
        frame: Frame,
        faces: Vec<FaceOverlay>,
        /// The full-frame locator ran on this frame.
        refreshed: bool,
    },
}

/// State carried between iterations, touched only by the loop thread.
pub struct LoopState {
    catalog: ReferenceCatalog,
    detections: SampledDetections,
    statuses: HashMap<String, AttendanceStatus>,
    active: Option<bool>,
}

impl LoopState {
    pub fn new(catalog: ReferenceCatalog, detect_every: u64) -> Self {
        Self {
            catalog,
            detections: SampledDetections::new(detect_every),
            statuses: HashMap::new(),
            active: None,
        }
    }

    fn record_outcome(&mut self, outcome: Outcome) {
        tracing::info!(name = %outcome.name, status = %outcome.status, "attendance outcome");
        self.statuses.insert(outcome.name, outcome.status);
    }

    /// Log active/inactive transitions once each.
    fn note_gate(&mut self, active: bool) {
        if self.active != Some(active) {
            if active {
                tracing::info!("entering active window");
            } else {
                tracing::info!("outside active window, system inactive");
            }
            self.active = Some(active);
        }
    }
}

/// The capture loop: frame source → gate → sampled locator → matcher →
/// notifier, one iteration per [`Engine::tick`].
pub struct Engine<S, L, E> {
    source: S,
    locator: L,
    embedder: E,
    matcher: FaceMatcher<EuclideanMatcher>,
    gate: ActiveWindow,
    notifier: NotifierHandle,
    state: LoopState,
}

impl<S, L, E> Engine<S, L, E>
where
    S: FrameSource,
    L: FaceLocator,
    E: FaceEmbedder,
{
    pub fn new(
        source: S,
        locator: L,
        embedder: E,
        matcher: EuclideanMatcher,
        gate: ActiveWindow,
        notifier: NotifierHandle,
        state: LoopState,
    ) -> Self {
        Self {
            source,
            locator,
            embedder,
            matcher: FaceMatcher::new(matcher),
            gate,
            notifier,
            state,
        }
    }

    /// Run one iteration at local time `now`.
    pub fn tick(&mut self, now: NaiveDateTime) -> Tick {
        for outcome in self.notifier.poll() {
            self.state.record_outcome(outcome);
        }

        let active = self.gate.is_active(now);
        self.state.note_gate(active);
        if !active {
            return Tick::Inactive;
        }

        let frame = match self.source.next_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "frame read failed, skipped");
                return Tick::NoFrame;
            }
        };

        let advanced = self
            .state
            .detections
            .advance(&mut self.locator, &frame.image)
            .map(|(boxes, refreshed)| (boxes.to_vec(), refreshed));
        let (boxes, refreshed) = match advanced {
            Ok(advanced) => advanced,
            Err(e) => {
                tracing::warn!(error = %e, "face location failed, keeping previous boxes");
                (self.state.detections.boxes().to_vec(), false)
            }
        };

        let date_time_in = now.format(TIMESTAMP_FORMAT).to_string();
        let faces = boxes
            .into_iter()
            .map(|bbox| {
                let label = self.label_face(&frame, &bbox, &date_time_in);
                FaceOverlay { bbox, label }
            })
            .collect();

        Tick::Processed {
            frame,
            faces,
            refreshed,
        }
    }

    fn label_face(&mut self, frame: &Frame, bbox: &BoundingBox, date_time_in: &str) -> Option<OverlayLabel> {
        let result = match self.matcher.identify(
            &mut self.locator,
            &mut self.embedder,
            self.state.catalog.entries(),
            &frame.image,
            bbox,
        ) {
            Ok(Some(result)) => result,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "face matching failed, skipped");
                return None;
            }
        };

        tracing::debug!(identity = %result.identity, distance = result.distance, "face matched");

        let Identity::Known(name) = result.identity else {
            return Some(OverlayLabel::Unknown);
        };

        if self.notifier.submit(&name, date_time_in.to_string()) == Submission::Queued {
            self.state.statuses.insert(name.clone(), AttendanceStatus::Processing);
        }
        let status = self.state.statuses.get(&name).copied();
        Some(OverlayLabel::Known { name, status })
    }

    /// Release the frame source, then stop the notifier. Queued requests
    /// that have not started are discarded; one already in flight is
    /// waited for.
    pub fn shutdown(self) {
        let Self { source, notifier, mut state, .. } = self;
        drop(source);
        for outcome in notifier.shutdown() {
            state.record_outcome(outcome);
        }
    }
}

/// Open the camera, load models, build the catalog, and run the loop until
/// `stop` is set. Startup failures are fatal; per-frame failures are not.
pub fn run(config: Config, stop: Arc<AtomicBool>) -> Result<(), EngineError> {
    let gate = config.active_window()?;

    let camera = Camera::open(&config.camera_device, config.frame_width, config.frame_height)?;
    tracing::info!(
        device = %config.camera_device,
        width = camera.width,
        height = camera.height,
        fourcc = ?camera.fourcc,
        "camera opened"
    );

    let scrfd_path = config.scrfd_model_path();
    let mut detector = FaceDetector::load(&scrfd_path)?;
    tracing::info!(path = %scrfd_path, "SCRFD detector loaded");

    let arcface_path = config.arcface_model_path();
    let mut recognizer = FaceRecognizer::load(&arcface_path)?;
    tracing::info!(path = %arcface_path, "ArcFace recognizer loaded");

    let catalog = ReferenceCatalog::load_dir(&mut detector, &mut recognizer, &config.reference_dir)?;
    if catalog.is_empty() {
        tracing::warn!(dir = %config.reference_dir.display(), "reference catalog is empty; every face will be unknown");
    }

    let notifier = AttendanceNotifier::new(UreqTransport::new(), config.api.clone());
    let notifier = spawn_notifier(notifier, config.queue_capacity, config.resubmit_cooldown())?;

    let mut engine = Engine::new(
        camera,
        detector,
        recognizer,
        EuclideanMatcher { tolerance: config.tolerance },
        gate,
        notifier,
        LoopState::new(catalog, config.detect_every),
    );
    let mut renderer = Renderer::new(config.preview_path.clone(), config.frame_width, config.frame_height)?;

    tracing::info!("capture loop running");
    while !stop.load(Ordering::SeqCst) {
        let now = chrono::Local::now().naive_local();
        let tick = engine.tick(now);
        let pause = match &tick {
            Tick::Inactive => Some(INACTIVE_POLL),
            Tick::NoFrame => Some(FRAME_RETRY),
            Tick::Processed { .. } => None,
        };
        renderer.present(tick);
        if let Some(pause) = pause {
            std::thread::sleep(pause);
        }
    }

    tracing::info!("capture loop stopping");
    engine.shutdown();
    Ok(())
}

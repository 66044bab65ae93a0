//! rollcall-core — Face location, embedding and matching for attendance capture.
//!
//! Uses SCRFD for face location and ArcFace for embeddings, both running via
//! ONNX Runtime for CPU inference, plus the pure pieces of the capture loop:
//! the active-window gate, the detection cadence and the reference catalog.

pub mod alignment;
pub mod cadence;
pub mod catalog;
pub mod detector;
pub mod face_match;
pub mod gate;
pub mod recognizer;
pub mod types;

use std::path::PathBuf;

pub use cadence::SampledDetections;
pub use catalog::{CatalogError, ReferenceCatalog};
pub use detector::{DetectorError, FaceDetector, FaceLocator};
pub use face_match::{FaceMatcher, PipelineError};
pub use gate::{ActiveWindow, GateError};
pub use recognizer::{FaceEmbedder, FaceRecognizer, RecognizerError};
pub use types::{BoundingBox, Embedding, EuclideanMatcher, Identity, MatchResult, Matcher, ReferenceEntry};

/// Default location of the ONNX model files: `$XDG_DATA_HOME/rollcall/models`,
/// falling back to `~/.local/share` when the variable is unset or empty.
pub fn default_model_dir() -> PathBuf {
    model_dir_from(|key| std::env::var(key).ok())
}

fn model_dir_from(lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
    let set = |key: &str| lookup(key).filter(|v| !v.is_empty());
    set("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let home = set("HOME").unwrap_or_else(|| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
        .join("models")
}

use serde::{Deserialize, Serialize};

/// Bounding box for a located face, with optional facial landmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Translate the box (and its landmarks) by the given offset.
    pub fn offset(&self, dx: f32, dy: f32) -> BoundingBox {
        BoundingBox {
            x: self.x + dx,
            y: self.y + dy,
            landmarks: self
                .landmarks
                .map(|lms| lms.map(|(lx, ly)| (lx + dx, ly + dy))),
            ..self.clone()
        }
    }
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values, model_version: None }
    }

    /// Compute Euclidean distance between two embeddings.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// One recognisable identity in the reference catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceEntry {
    /// Display name, taken verbatim from the reference file stem.
    pub name: String,
    pub embedding: Embedding,
}

/// Who a probe face was matched to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "lowercase")]
pub enum Identity {
    Known(String),
    Unknown,
}

impl Identity {
    pub fn name(&self) -> Option<&str> {
        match self {
            Identity::Known(name) => Some(name),
            Identity::Unknown => None,
        }
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Identity::Known(name) => f.write_str(name),
            Identity::Unknown => f.write_str("unknown"),
        }
    }
}

/// Result of matching a probe embedding against the reference catalog.
#[derive(Debug, Clone, Serialize)]
pub struct MatchResult {
    pub identity: Identity,
    /// Euclidean distance to the closest reference (infinite for an empty catalog).
    pub distance: f32,
    /// Catalog index of the closest reference, whether accepted or not.
    pub closest: Option<usize>,
}

/// Strategy for comparing a probe embedding against the reference catalog.
pub trait Matcher {
    fn compare(&self, probe: &Embedding, references: &[ReferenceEntry]) -> MatchResult;
}

/// Euclidean-distance matcher with a tolerance gate on the closest reference.
///
/// The closest reference (stable argmin, first occurrence wins on ties) is
/// accepted only if its own distance is strictly below `tolerance`.
#[derive(Debug, Clone, Copy)]
pub struct EuclideanMatcher {
    pub tolerance: f32,
}

pub const DEFAULT_TOLERANCE: f32 = 0.5;

impl Default for EuclideanMatcher {
    fn default() -> Self {
        Self { tolerance: DEFAULT_TOLERANCE }
    }
}

impl Matcher for EuclideanMatcher {
    fn compare(&self, probe: &Embedding, references: &[ReferenceEntry]) -> MatchResult {
        let mut best_dist = f32::INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, entry) in references.iter().enumerate() {
            let dist = probe.euclidean_distance(&entry.embedding);
            // Strict comparison keeps the first occurrence on ties.
            if best_idx.is_none() || dist < best_dist {
                best_dist = dist;
                best_idx = Some(i);
            }
        }

        let identity = match best_idx {
            Some(idx) if best_dist < self.tolerance => Identity::Known(references[idx].name.clone()),
            _ => Identity::Unknown,
        };

        MatchResult {
            identity,
            distance: best_dist,
            closest: best_idx,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, values: Vec<f32>) -> ReferenceEntry {
        ReferenceEntry { name: name.into(), embedding: Embedding::new(values) }
    }

    #[test]
    fn test_euclidean_distance() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![3.0, 4.0]);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_exact_match_is_known() {
        let refs = vec![entry("alice", vec![1.0, 0.0]), entry("bob", vec![0.0, 1.0])];
        let result = EuclideanMatcher::default().compare(&Embedding::new(vec![1.0, 0.0]), &refs);
        assert_eq!(result.identity, Identity::Known("alice".into()));
        assert_eq!(result.closest, Some(0));
        assert!(result.distance.abs() < 1e-6);
    }

    #[test]
    fn test_closest_beyond_tolerance_is_unknown() {
        let refs = vec![entry("alice", vec![0.0, 0.0])];
        let result = EuclideanMatcher::default().compare(&Embedding::new(vec![0.9, 0.0]), &refs);
        assert_eq!(result.identity, Identity::Unknown);
        assert_eq!(result.closest, Some(0));
        assert!((result.distance - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_distance_equal_to_tolerance_is_rejected() {
        let refs = vec![entry("alice", vec![0.0])];
        let result = EuclideanMatcher::default().compare(&Embedding::new(vec![0.5]), &refs);
        assert_eq!(result.identity, Identity::Unknown);
    }

    #[test]
    fn test_argmin_picks_globally_closest() {
        // Both are within tolerance; the closer one wins even though it comes later.
        let refs = vec![entry("far", vec![0.4]), entry("near", vec![0.1])];
        let result = EuclideanMatcher::default().compare(&Embedding::new(vec![0.0]), &refs);
        assert_eq!(result.identity, Identity::Known("near".into()));
        assert_eq!(result.closest, Some(1));
    }

    #[test]
    fn test_tie_breaks_to_first_occurrence() {
        let refs = vec![entry("first", vec![0.2]), entry("second", vec![-0.2])];
        let result = EuclideanMatcher::default().compare(&Embedding::new(vec![0.0]), &refs);
        assert_eq!(result.identity, Identity::Known("first".into()));
        assert_eq!(result.closest, Some(0));
    }

    #[test]
    fn test_empty_catalog_is_unknown() {
        let result = EuclideanMatcher::default().compare(&Embedding::new(vec![1.0]), &[]);
        assert_eq!(result.identity, Identity::Unknown);
        assert_eq!(result.closest, None);
        assert!(result.distance.is_infinite());
    }

    #[test]
    fn test_offset_moves_landmarks() {
        let b = BoundingBox {
            x: 1.0, y: 2.0, width: 10.0, height: 10.0, confidence: 0.9,
            landmarks: Some([(1.0, 1.0); 5]),
        };
        let moved = b.offset(10.0, 20.0);
        assert_eq!((moved.x, moved.y), (11.0, 22.0));
        assert_eq!(moved.landmarks.unwrap()[0], (11.0, 21.0));
        assert_eq!(moved.width, 10.0);
    }
}

//! Frame-sampled detection cache.
//!
//! Detection runs once every `interval` frames; in between, the previous
//! boxes are returned verbatim even if the scene has moved on.

use crate::detector::{DetectorError, FaceLocator};
use crate::types::BoundingBox;
use image::RgbImage;

pub const DEFAULT_DETECT_EVERY: u64 = 5;

/// Cached detection result with a time-to-live measured in frames.
#[derive(Debug, Clone)]
pub struct SampledDetections {
    interval: u64,
    frame_count: u64,
    boxes: Vec<BoundingBox>,
}

impl SampledDetections {
    /// `interval` must be non-zero; zero is treated as one.
    pub fn new(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
            frame_count: 0,
            boxes: Vec::new(),
        }
    }

    /// Count one frame and report whether detection is due on it.
    pub fn tick(&mut self) -> bool {
        self.frame_count += 1;
        self.frame_count % self.interval == 0
    }

    /// Replace the cached boxes.
    pub fn refresh(&mut self, boxes: Vec<BoundingBox>) {
        self.boxes = boxes;
    }

    pub fn boxes(&self) -> &[BoundingBox] {
        &self.boxes
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Count a frame, run the locator on it if due, and return the boxes that
    /// apply to it. A locator error leaves the cache untouched.
    ///
    /// The returned flag is true when the boxes were recomputed on this frame.
    pub fn advance<L: FaceLocator + ?Sized>(
        &mut self,
        locator: &mut L,
        image: &RgbImage,
    ) -> Result<(&[BoundingBox], bool), DetectorError> {
        if !self.tick() {
            return Ok((&self.boxes, false));
        }
        let boxes = locator.locate(image)?;
        tracing::debug!(frame = self.frame_count, faces = boxes.len(), "detection refreshed");
        self.refresh(boxes);
        Ok((&self.boxes, true))
    }
}

impl Default for SampledDetections {
    fn default() -> Self {
        Self::new(DEFAULT_DETECT_EVERY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingLocator {
        calls: usize,
        fail: bool,
    }

    impl FaceLocator for CountingLocator {
        fn locate(&mut self, _image: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
            self.calls += 1;
            if self.fail {
                return Err(DetectorError::InferenceFailed("boom".into()));
            }
            Ok(vec![BoundingBox {
                x: self.calls as f32, y: 0.0, width: 10.0, height: 10.0,
                confidence: 0.9, landmarks: None,
            }])
        }
    }

    #[test]
    fn test_detects_on_every_fifth_frame() {
        let mut cache = SampledDetections::default();
        let mut locator = CountingLocator { calls: 0, fail: false };
        let image = RgbImage::new(4, 4);

        for frame in 1..=4 {
            let (boxes, fresh) = cache.advance(&mut locator, &image).unwrap();
            assert!(boxes.is_empty(), "frame {frame} should have no boxes yet");
            assert!(!fresh);
        }
        let (boxes, fresh) = cache.advance(&mut locator, &image).unwrap();
        assert!(fresh);
        assert_eq!(boxes.len(), 1);
        assert_eq!(locator.calls, 1);
    }

    #[test]
    fn test_stale_boxes_reused_between_samples() {
        let mut cache = SampledDetections::new(2);
        let mut locator = CountingLocator { calls: 0, fail: false };
        let image = RgbImage::new(4, 4);

        cache.advance(&mut locator, &image).unwrap();
        let first = cache.advance(&mut locator, &image).unwrap().0.to_vec();
        let (reused, fresh) = cache.advance(&mut locator, &image).unwrap();
        assert!(!fresh);
        assert_eq!(reused, first.as_slice());
        let (renewed, fresh) = cache.advance(&mut locator, &image).unwrap();
        assert!(fresh);
        assert_eq!(renewed[0].x, 2.0);
        assert_eq!(locator.calls, 2);
    }

    #[test]
    fn test_locator_error_keeps_previous_boxes() {
        let mut cache = SampledDetections::new(1);
        let mut locator = CountingLocator { calls: 0, fail: false };
        let image = RgbImage::new(4, 4);
        cache.advance(&mut locator, &image).unwrap();

        locator.fail = true;
        assert!(cache.advance(&mut locator, &image).is_err());
        assert_eq!(cache.boxes().len(), 1);
        assert_eq!(cache.frame_count(), 2);
    }

    #[test]
    fn test_zero_interval_means_every_frame() {
        let mut cache = SampledDetections::new(0);
        assert!(cache.tick());
        assert!(cache.tick());
    }
}

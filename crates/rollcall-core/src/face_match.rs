//! Per-box identification: crop, re-locate inside the crop, embed, compare.

use crate::detector::{DetectorError, FaceLocator};
use crate::recognizer::{FaceEmbedder, RecognizerError};
use crate::types::{BoundingBox, Embedding, EuclideanMatcher, MatchResult, Matcher, ReferenceEntry};
use image::{imageops, RgbImage};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Cut the box out of the image, clamped to the image bounds.
///
/// Returns `None` when nothing of the box lies inside the image.
pub fn crop_face(image: &RgbImage, bbox: &BoundingBox) -> Option<RgbImage> {
    let (w, h) = (image.width() as f32, image.height() as f32);
    let x0 = bbox.x.max(0.0).floor();
    let y0 = bbox.y.max(0.0).floor();
    let x1 = (bbox.x + bbox.width).min(w).floor();
    let y1 = (bbox.y + bbox.height).min(h).floor();

    if x1 <= x0 || y1 <= y0 {
        return None;
    }

    Some(
        imageops::crop_imm(image, x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32)
            .to_image(),
    )
}

/// Locate the first face in `image` and embed it.
///
/// `Ok(None)` means the locator found no face, which is not an error.
pub fn embed_first_face<L, E>(
    locator: &mut L,
    embedder: &mut E,
    image: &RgbImage,
) -> Result<Option<Embedding>, PipelineError>
where
    L: FaceLocator + ?Sized,
    E: FaceEmbedder + ?Sized,
{
    let faces = locator.locate(image)?;
    let Some(face) = faces.first() else {
        return Ok(None);
    };
    Ok(Some(embedder.embed(image, face)?))
}

/// Identifies located faces against the reference catalog.
#[derive(Debug, Clone, Default)]
pub struct FaceMatcher<M = EuclideanMatcher> {
    matcher: M,
}

impl<M: Matcher> FaceMatcher<M> {
    pub fn new(matcher: M) -> Self {
        Self { matcher }
    }

    /// Identify the face inside `bbox`.
    ///
    /// Returns `Ok(None)` when the crop is empty or the second locator pass
    /// finds no face in it. Otherwise the result is either a known name or
    /// `Identity::Unknown`.
    pub fn identify<L, E>(
        &self,
        locator: &mut L,
        embedder: &mut E,
        references: &[ReferenceEntry],
        image: &RgbImage,
        bbox: &BoundingBox,
    ) -> Result<Option<MatchResult>, PipelineError>
    where
        L: FaceLocator + ?Sized,
        E: FaceEmbedder + ?Sized,
    {
        let Some(crop) = crop_face(image, bbox) else {
            return Ok(None);
        };
        let Some(embedding) = embed_first_face(locator, embedder, &crop)? else {
            return Ok(None);
        };
        Ok(Some(self.matcher.compare(&embedding, references)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Identity;
    use image::Rgb;

    /// Finds a face whenever the top-left pixel of the image is non-black.
    struct PixelLocator;

    impl FaceLocator for PixelLocator {
        fn locate(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
            if image.get_pixel(0, 0)[0] == 0 {
                return Ok(Vec::new());
            }
            Ok(vec![BoundingBox {
                x: 0.0, y: 0.0, width: image.width() as f32, height: image.height() as f32,
                confidence: 0.9, landmarks: None,
            }])
        }
    }

    /// Embeds a face as its top-left pixel's red value scaled to [0, 1].
    struct RedEmbedder;

    impl FaceEmbedder for RedEmbedder {
        fn embed(&mut self, image: &RgbImage, _face: &BoundingBox) -> Result<Embedding, RecognizerError> {
            Ok(Embedding::new(vec![image.get_pixel(0, 0)[0] as f32 / 255.0]))
        }
    }

    fn bbox(x: f32, y: f32, w: f32, h: f32) -> BoundingBox {
        BoundingBox { x, y, width: w, height: h, confidence: 0.9, landmarks: None }
    }

    fn refs() -> Vec<ReferenceEntry> {
        vec![ReferenceEntry { name: "alice".into(), embedding: Embedding::new(vec![1.0]) }]
    }

    #[test]
    fn test_crop_is_clamped_to_image() {
        let image = RgbImage::new(100, 50);
        let crop = crop_face(&image, &bbox(-10.0, 40.0, 30.0, 30.0)).unwrap();
        assert_eq!(crop.dimensions(), (20, 10));
    }

    #[test]
    fn test_crop_outside_image_is_none() {
        let image = RgbImage::new(100, 50);
        assert!(crop_face(&image, &bbox(200.0, 0.0, 30.0, 30.0)).is_none());
        assert!(crop_face(&image, &bbox(10.0, 10.0, 0.0, 30.0)).is_none());
    }

    #[test]
    fn test_identify_known() {
        let image = RgbImage::from_pixel(64, 64, Rgb([255, 0, 0]));
        let result = <FaceMatcher>::default()
            .identify(&mut PixelLocator, &mut RedEmbedder, &refs(), &image, &bbox(8.0, 8.0, 16.0, 16.0))
            .unwrap()
            .unwrap();
        assert_eq!(result.identity, Identity::Known("alice".into()));
    }

    #[test]
    fn test_identify_unknown_when_too_far() {
        // red 25 → 0.098, distance ≈ 0.9 from alice
        let image = RgbImage::from_pixel(64, 64, Rgb([25, 0, 0]));
        let result = <FaceMatcher>::default()
            .identify(&mut PixelLocator, &mut RedEmbedder, &refs(), &image, &bbox(0.0, 0.0, 16.0, 16.0))
            .unwrap()
            .unwrap();
        assert_eq!(result.identity, Identity::Unknown);
    }

    #[test]
    fn test_identify_skips_crop_without_face() {
        let mut image = RgbImage::from_pixel(64, 64, Rgb([255, 0, 0]));
        image.put_pixel(32, 32, Rgb([0, 0, 0]));
        let result = <FaceMatcher>::default()
            .identify(&mut PixelLocator, &mut RedEmbedder, &refs(), &image, &bbox(32.0, 32.0, 8.0, 8.0))
            .unwrap();
        assert!(result.is_none());
    }
}

//! Overlay drawing and preview output. Draws what it is given, nothing more.

use crate::engine::{FaceOverlay, OverlayLabel, Tick};
use ab_glyph::{FontRef, InvalidFont, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_text_mut, text_size};
use std::path::PathBuf;

const BOX_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
const KNOWN_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const UNKNOWN_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const INACTIVE_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const BOX_THICKNESS: i64 = 2;
const LABEL_GAP: i32 = 4;

const NAME_SCALE: PxScale = PxScale { x: 20.0, y: 20.0 };
const STATUS_SCALE: PxScale = PxScale { x: 16.0, y: 16.0 };
const INACTIVE_SCALE: PxScale = PxScale { x: 32.0, y: 32.0 };

const UNKNOWN_TEXT: &str = "UNKNOWN";
const INACTIVE_TEXT: &str = "System Inactive";

static LABEL_FONT: &[u8] = include_bytes!("../assets/DejaVuSans-Bold.ttf");

/// The bundled label font (DejaVu Sans Bold).
pub fn label_font() -> Result<FontRef<'static>, InvalidFont> {
    FontRef::try_from_slice(LABEL_FONT)
}

/// Draw box outlines and labels for every face onto `image`.
///
/// Known faces get their name (upper-cased) above the box and the
/// attendance status below it, in green. Unknown faces get "UNKNOWN" above
/// the box in red. A face whose crop yielded no embedding gets the outline
/// only.
pub fn annotate(image: &mut RgbImage, faces: &[FaceOverlay], font: &FontRef<'_>) {
    for face in faces {
        let x = face.bbox.x.round() as i64;
        let y = face.bbox.y.round() as i64;
        let w = face.bbox.width.round() as i64;
        let h = face.bbox.height.round() as i64;
        draw_outline(image, x, y, w, h, BOX_THICKNESS, BOX_COLOR);

        let (x, y, h) = (x as i32, y as i32, h as i32);
        match &face.label {
            Some(OverlayLabel::Known { name, status }) => {
                draw_above(image, x, y, KNOWN_COLOR, font, &name.to_uppercase());
                if let Some(status) = status {
                    draw_text_mut(image, KNOWN_COLOR, x, y + h + LABEL_GAP, STATUS_SCALE, font, status.as_str());
                }
            }
            Some(OverlayLabel::Unknown) => draw_above(image, x, y, UNKNOWN_COLOR, font, UNKNOWN_TEXT),
            None => {}
        }
    }
}

fn draw_above(image: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>, font: &FontRef<'_>, text: &str) {
    let (_, text_h) = text_size(NAME_SCALE, font, text);
    draw_text_mut(image, color, x, y - text_h as i32 - LABEL_GAP, NAME_SCALE, font, text);
}

/// Blank frame shown outside the active window, "System Inactive" centred
/// in red.
pub fn inactive_frame(width: u32, height: u32, font: &FontRef<'_>) -> RgbImage {
    let mut image = RgbImage::new(width, height);
    let (text_w, text_h) = text_size(INACTIVE_SCALE, font, INACTIVE_TEXT);
    let x = (width as i32 - text_w as i32) / 2;
    let y = (height as i32 - text_h as i32) / 2;
    draw_text_mut(&mut image, INACTIVE_COLOR, x, y, INACTIVE_SCALE, font, INACTIVE_TEXT);
    image
}

fn fill_rect(image: &mut RgbImage, x: i64, y: i64, w: i64, h: i64, color: Rgb<u8>) {
    let x0 = x.max(0);
    let y0 = y.max(0);
    let x1 = (x + w).min(image.width() as i64);
    let y1 = (y + h).min(image.height() as i64);
    for py in y0..y1 {
        for px in x0..x1 {
            image.put_pixel(px as u32, py as u32, color);
        }
    }
}

fn draw_outline(image: &mut RgbImage, x: i64, y: i64, w: i64, h: i64, t: i64, color: Rgb<u8>) {
    fill_rect(image, x, y, w, t, color);
    fill_rect(image, x, y + h - t, w, t, color);
    fill_rect(image, x, y, t, h, color);
    fill_rect(image, x + w - t, y, t, h, color);
}

/// Presents each iteration's result: annotates the frame and, when a
/// preview path is configured, writes it out.
pub struct Renderer {
    preview_path: Option<PathBuf>,
    width: u32,
    height: u32,
    font: FontRef<'static>,
    showing_inactive: bool,
}

impl Renderer {
    pub fn new(preview_path: Option<PathBuf>, width: u32, height: u32) -> Result<Self, InvalidFont> {
        Ok(Self {
            preview_path,
            width,
            height,
            font: label_font()?,
            showing_inactive: false,
        })
    }

    /// Render one iteration. Returns the image that was produced, if any.
    pub fn present(&mut self, tick: Tick) -> Option<RgbImage> {
        match tick {
            Tick::Inactive => {
                let first = !self.showing_inactive;
                self.showing_inactive = true;
                let image = inactive_frame(self.width, self.height, &self.font);
                if first {
                    self.write_preview(&image);
                }
                Some(image)
            }
            Tick::NoFrame => None,
            Tick::Processed { frame, faces, refreshed } => {
                self.showing_inactive = false;
                let mut image = frame.image;
                annotate(&mut image, &faces, &self.font);
                if refreshed {
                    self.write_preview(&image);
                }
                Some(image)
            }
        }
    }

    fn write_preview(&self, image: &RgbImage) {
        let Some(path) = &self.preview_path else {
            return;
        };
        if let Err(e) = image.save(path) {
            tracing::warn!(path = %path.display(), error = %e, "failed to write preview");
        }
    }
}

//! rollcall-hw — Hardware abstraction for camera capture.
//!
//! Provides V4L2-based camera access delivering RGB frames.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, FrameSource, PixelFormat};
pub use frame::Frame;

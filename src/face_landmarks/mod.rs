#[cfg(feature = "onnx")]
pub mod model_mediapipe;
mod recorded;
mod tracker;

use image::DynamicImage;

use crate::error::Result;
use crate::face::FaceLandmarks;
use crate::face_detection::FaceBox;

pub use recorded::RecordedLandmarks;
#[cfg(feature = "onnx")]
pub use tracker::OnnxFaceTracker;
pub use tracker::FaceMeshTracker;

/// Produces at most one face per camera frame.
pub trait LandmarkSource: Send {
    /// Load whatever the source needs before the first frame.
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    /// `Ok(None)` when no face is visible.
    fn process(&mut self, frame: &DynamicImage) -> Result<Option<FaceLandmarks>>;
}

/// Landmarks for one face plus the model's confidence that a face is present.
#[derive(Debug, Clone)]
pub struct LandmarkEstimate {
    pub landmarks: FaceLandmarks,
    pub confidence: f32,
}

pub trait FaceLandmarksModel: Send {
    /// Run the mesh model on the region around `face_box`. Landmarks are
    /// normalized to the full frame.
    fn run(&self, image: &DynamicImage, face_box: &FaceBox) -> Result<Option<LandmarkEstimate>>;
}

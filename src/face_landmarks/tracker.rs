use image::DynamicImage;

use crate::error::Result;
use crate::face::FaceLandmarks;
use crate::face_detection::{FaceBox, FaceDetectionModel};
use crate::face_landmarks::{FaceLandmarksModel, LandmarkSource};

/// Single-face tracker: the detector finds a face, after which the mesh
/// model follows it frame to frame from the box around the previous
/// landmarks. The detector runs again whenever tracking confidence drops.
pub struct FaceMeshTracker<D, L> {
    detector: D,
    landmarker: L,
    min_detection_confidence: f32,
    min_tracking_confidence: f32,
    tracked: Option<FaceBox>,
}

impl<D: FaceDetectionModel, L: FaceLandmarksModel> FaceMeshTracker<D, L> {
    pub fn new(
        detector: D,
        landmarker: L,
        min_detection_confidence: f32,
        min_tracking_confidence: f32,
    ) -> Self {
        Self {
            detector,
            landmarker,
            min_detection_confidence,
            min_tracking_confidence,
            tracked: None,
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.tracked.is_some()
    }

    fn locate(&self, frame: &DynamicImage) -> Result<Option<FaceBox>> {
        if let Some(face_box) = self.tracked {
            return Ok(Some(face_box));
        }
        match self.detector.run(frame)? {
            Some(face_box) if face_box.score >= self.min_detection_confidence => Ok(Some(face_box)),
            Some(face_box) => {
                tracing::trace!("detection score {:.2} below threshold", face_box.score);
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

impl<D: FaceDetectionModel, L: FaceLandmarksModel> LandmarkSource for FaceMeshTracker<D, L> {
    fn process(&mut self, frame: &DynamicImage) -> Result<Option<FaceLandmarks>> {
        let Some(face_box) = self.locate(frame)? else {
            return Ok(None);
        };

        // drop the track first so an error or a miss re-runs detection next frame
        self.tracked = None;

        let Some(estimate) = self.landmarker.run(frame, &face_box)? else {
            return Ok(None);
        };
        if estimate.confidence < self.min_tracking_confidence {
            tracing::debug!("lost face (confidence {:.2})", estimate.confidence);
            return Ok(None);
        }

        self.tracked = FaceBox::enclosing(
            &estimate.landmarks,
            frame.width(),
            frame.height(),
            estimate.confidence,
        );
        Ok(Some(estimate.landmarks))
    }
}

#[cfg(feature = "onnx")]
mod onnx {
    use ort::{Environment, ExecutionProvider};

    use super::*;
    use crate::config::TrackerConfig;
    use crate::error::TryOnError;
    use crate::face_detection::model_blazeface::BlazefaceModel;
    use crate::face_landmarks::model_mediapipe::MediapipeFaceLandmarksModel;

    type OnnxTracker = FaceMeshTracker<BlazefaceModel, MediapipeFaceLandmarksModel>;

    /// Face mesh tracker backed by ONNX models; the models load in `start`.
    pub struct OnnxFaceTracker {
        config: TrackerConfig,
        inner: Option<OnnxTracker>,
    }

    impl OnnxFaceTracker {
        pub fn new(config: TrackerConfig) -> Self {
            Self { config, inner: None }
        }
    }

    impl LandmarkSource for OnnxFaceTracker {
        fn start(&mut self) -> Result<()> {
            let config = &self.config;
            let environment = Environment::builder()
                .with_name("glasses-tryon")
                .with_execution_providers([ExecutionProvider::CPU(Default::default())])
                .build()
                .map_err(|e| TryOnError::Tracker(e.to_string()))?
                .into_arc();

            let detector = BlazefaceModel::new(
                &environment,
                &config.detector_model,
                &config.detector_anchors,
                config.intra_threads,
            )?;
            let landmarker = MediapipeFaceLandmarksModel::new(
                &environment,
                &config.landmark_model,
                config.intra_threads,
            )?;
            tracing::info!("face tracker models loaded");

            self.inner = Some(FaceMeshTracker::new(
                detector,
                landmarker,
                config.min_detection_confidence,
                config.min_tracking_confidence,
            ));
            Ok(())
        }

        fn process(&mut self, frame: &DynamicImage) -> Result<Option<FaceLandmarks>> {
            match self.inner.as_mut() {
                Some(tracker) => tracker.process(frame),
                None => Err(TryOnError::Tracker("face tracker not started".to_string())),
            }
        }
    }
}

#[cfg(feature = "onnx")]
pub use onnx::OnnxFaceTracker;

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use image::RgbImage;
    use nalgebra::Point2;

    use super::*;
    use crate::face_landmarks::LandmarkEstimate;

    struct FixedDetector {
        score: Option<f32>,
        calls: Arc<AtomicUsize>,
    }

    impl FaceDetectionModel for FixedDetector {
        fn run(&self, _image: &DynamicImage) -> Result<Option<FaceBox>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.score.map(|score| FaceBox {
                x: 10.0,
                y: 10.0,
                width: 40.0,
                height: 40.0,
                score,
            }))
        }
    }

    struct ScriptedLandmarks {
        confidences: Vec<f32>,
        calls: AtomicUsize,
    }

    impl FaceLandmarksModel for ScriptedLandmarks {
        fn run(&self, _image: &DynamicImage, _face_box: &FaceBox) -> Result<Option<LandmarkEstimate>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let confidence = self.confidences[call.min(self.confidences.len() - 1)];
            Ok(Some(LandmarkEstimate {
                landmarks: FaceLandmarks::new(vec![Point2::new(0.2, 0.2), Point2::new(0.6, 0.7)]),
                confidence,
            }))
        }
    }

    fn tracker(
        score: Option<f32>,
        confidences: Vec<f32>,
    ) -> (FaceMeshTracker<FixedDetector, ScriptedLandmarks>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let detector = FixedDetector {
            score,
            calls: calls.clone(),
        };
        let landmarks = ScriptedLandmarks {
            confidences,
            calls: AtomicUsize::new(0),
        };
        (FaceMeshTracker::new(detector, landmarks, 0.5, 0.5), calls)
    }

    fn frame() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::new(100, 100))
    }

    #[test]
    fn detects_once_then_tracks() {
        let (mut tracker, detections) = tracker(Some(0.9), vec![0.95]);
        for _ in 0..5 {
            assert!(tracker.process(&frame()).unwrap().is_some());
        }
        assert_eq!(detections.load(Ordering::SeqCst), 1);
        assert!(tracker.is_tracking());
    }

    #[test]
    fn weak_detection_is_no_face() {
        let (mut tracker, detections) = tracker(Some(0.3), vec![0.95]);
        assert!(tracker.process(&frame()).unwrap().is_none());
        assert!(tracker.process(&frame()).unwrap().is_none());
        assert_eq!(detections.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn lost_track_falls_back_to_detection() {
        let (mut tracker, detections) = tracker(Some(0.9), vec![0.9, 0.2, 0.9]);
        assert!(tracker.process(&frame()).unwrap().is_some());
        assert!(tracker.process(&frame()).unwrap().is_none());
        assert!(!tracker.is_tracking());
        assert!(tracker.process(&frame()).unwrap().is_some());
        assert_eq!(detections.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn empty_frame_without_detection() {
        let (mut tracker, _) = tracker(None, vec![0.9]);
        assert!(tracker.process(&frame()).unwrap().is_none());
    }
}

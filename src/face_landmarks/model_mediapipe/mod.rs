use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use image::DynamicImage;
use ndarray::{Array, CowArray};
use ort::tensor::OrtOwnedTensor;
use ort::{Environment, Session, SessionBuilder, Value};

use crate::error::{Result, TryOnError};
use crate::face::FaceLandmarks;
use crate::face_detection::model_blazeface::sigmoid;
use crate::face_detection::FaceBox;
use crate::face_landmarks::{FaceLandmarksModel, LandmarkEstimate};

const INPUT_SIZE: u32 = 256;
// fraction of the face box added on each side before cropping
const CROP_PADDING: f32 = 0.25;

pub struct MediapipeFaceLandmarksModel {
    session: Session,
}

fn ort_error(e: impl std::fmt::Display) -> TryOnError {
    TryOnError::Tracker(e.to_string())
}

impl MediapipeFaceLandmarksModel {
    pub fn new(
        environment: &Arc<Environment>,
        model_path: &Path,
        intra_threads: i16,
    ) -> Result<MediapipeFaceLandmarksModel> {
        let session = SessionBuilder::new(environment)
            .map_err(ort_error)?
            .with_intra_threads(intra_threads)
            .map_err(ort_error)?
            .with_model_from_file(model_path)
            .map_err(|e| {
                TryOnError::Tracker(format!(
                    "failed to load landmark model {}: {}",
                    model_path.display(),
                    e
                ))
            })?;

        Ok(MediapipeFaceLandmarksModel { session })
    }
}

impl FaceLandmarksModel for MediapipeFaceLandmarksModel {
    fn run(&self, image: &DynamicImage, face_box: &FaceBox) -> Result<Option<LandmarkEstimate>> {
        let Some((x, y, w, h)) = face_box
            .padded(CROP_PADDING)
            .clamped(image.width(), image.height())
        else {
            return Ok(None);
        };

        let input = image
            .crop_imm(x, y, w, h)
            .resize_exact(INPUT_SIZE, INPUT_SIZE, image::imageops::FilterType::Nearest)
            .to_rgb8();

        let input: Vec<f32> = input
            .pixels()
            .flat_map(|p| p.0)
            .map(|p| p as f32 / 255.0)
            .collect();

        let array: CowArray<_, _> =
            Array::from_shape_vec((1, INPUT_SIZE as usize, INPUT_SIZE as usize, 3), input)
                .map_err(ort_error)?
                .into_dyn()
                .into();

        let inputs = vec![Value::from_array(self.session.allocator(), &array).map_err(ort_error)?];
        let outputs: Vec<Value> = self.session.run(inputs).map_err(ort_error)?;
        if outputs.len() < 2 {
            return Err(TryOnError::Tracker(format!(
                "landmark model returned {} outputs, expected 2",
                outputs.len()
            )));
        }

        let face_flag: OrtOwnedTensor<f32, _> = outputs[1].try_extract().map_err(ort_error)?;
        let confidence = face_flag
            .view()
            .deref()
            .iter()
            .next()
            .copied()
            .map(sigmoid)
            .unwrap_or(0.0);

        let raw: OrtOwnedTensor<f32, _> = outputs[0].try_extract().map_err(ort_error)?;
        let raw: Vec<f32> = raw.view().deref().iter().copied().collect();

        // model output is (x, y, z) in crop pixels; map to the full frame, normalized
        let (image_w, image_h) = (image.width() as f32, image.height() as f32);
        let scale_x = w as f32 / INPUT_SIZE as f32;
        let scale_y = h as f32 / INPUT_SIZE as f32;
        let normalized: Vec<f32> = raw
            .chunks_exact(3)
            .flat_map(|p| {
                [
                    (p[0] * scale_x + x as f32) / image_w,
                    (p[1] * scale_y + y as f32) / image_h,
                ]
            })
            .collect();

        Ok(Some(LandmarkEstimate {
            landmarks: FaceLandmarks::from_flat(&normalized, 2),
            confidence,
        }))
    }
}

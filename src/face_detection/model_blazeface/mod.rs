use std::fs::File;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use image::DynamicImage;
use ndarray::prelude::*;
use ndarray_npy::ReadNpyExt;
use ort::tensor::OrtOwnedTensor;
use ort::{Environment, Session, SessionBuilder, Value};

use crate::error::{Result, TryOnError};
use crate::face_detection::{FaceBox, FaceDetectionModel};

const INPUT_SIZE: u32 = 256;
// raw box offsets are expressed in this many units per anchor
const BOX_SCALE: f32 = 256.0;

pub struct BlazefaceModel {
    session: Session,
    anchors: Array2<f32>,
}

fn ort_error(e: impl std::fmt::Display) -> TryOnError {
    TryOnError::Tracker(e.to_string())
}

impl BlazefaceModel {
    pub fn new(
        environment: &Arc<Environment>,
        model_path: &Path,
        anchors_path: &Path,
        intra_threads: i16,
    ) -> Result<BlazefaceModel> {
        let session = SessionBuilder::new(environment)
            .map_err(ort_error)?
            .with_intra_threads(intra_threads)
            .map_err(ort_error)?
            .with_model_from_file(model_path)
            .map_err(|e| {
                TryOnError::Tracker(format!(
                    "failed to load face detector {}: {}",
                    model_path.display(),
                    e
                ))
            })?;

        let file = File::open(anchors_path)?;
        let anchors: Array2<f64> = ReadNpyExt::read_npy(file).map_err(|e| {
            TryOnError::Tracker(format!("failed to read anchors {}: {}", anchors_path.display(), e))
        })?;

        tracing::debug!("loaded face detector with {} anchors", anchors.nrows());

        Ok(BlazefaceModel {
            session,
            anchors: anchors.map(|x| *x as f32),
        })
    }

    /// Decode anchor-relative box `i` into normalized `(xmin, ymin, xmax, ymax)`.
    fn decode_box(&self, raw_boxes: &ArrayView3<f32>, i: usize) -> (f32, f32, f32, f32) {
        let anchors = &self.anchors;

        let x_center = raw_boxes[[0, i, 0]] / BOX_SCALE * anchors[[i, 2]] + anchors[[i, 0]];
        let y_center = raw_boxes[[0, i, 1]] / BOX_SCALE * anchors[[i, 3]] + anchors[[i, 1]];
        let w = raw_boxes[[0, i, 2]] / BOX_SCALE * anchors[[i, 2]];
        let h = raw_boxes[[0, i, 3]] / BOX_SCALE * anchors[[i, 3]];

        (
            x_center - w / 2.0,
            y_center - h / 2.0,
            x_center + w / 2.0,
            y_center + h / 2.0,
        )
    }
}

impl FaceDetectionModel for BlazefaceModel {
    fn run(&self, image: &DynamicImage) -> Result<Option<FaceBox>> {
        // cut a centered square from the frame
        let side = image.width().min(image.height());
        let crop_x = (image.width() - side) / 2;
        let crop_y = (image.height() - side) / 2;

        let input = image
            .crop_imm(crop_x, crop_y, side, side)
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
        if outputs.len() < 4 {
            return Err(TryOnError::Tracker(format!(
                "face detector returned {} outputs, expected 4",
                outputs.len()
            )));
        }

        // scores and boxes come split across two feature map resolutions
        let scores_a: OrtOwnedTensor<f32, _> = outputs[0].try_extract().map_err(ort_error)?;
        let scores_b: OrtOwnedTensor<f32, _> = outputs[1].try_extract().map_err(ort_error)?;
        let boxes_a: OrtOwnedTensor<f32, _> = outputs[2].try_extract().map_err(ort_error)?;
        let boxes_b: OrtOwnedTensor<f32, _> = outputs[3].try_extract().map_err(ort_error)?;

        let scores = ndarray::concatenate(
            Axis(1),
            &[scores_a.view().deref().view(), scores_b.view().deref().view()],
        )
        .map_err(ort_error)?
        .into_dimensionality::<Ix3>()
        .map_err(ort_error)?;

        let boxes = ndarray::concatenate(
            Axis(1),
            &[boxes_a.view().deref().view(), boxes_b.view().deref().view()],
        )
        .map_err(ort_error)?
        .into_dimensionality::<Ix3>()
        .map_err(ort_error)?;

        let Some(best) = argmax(scores.iter().copied()) else {
            return Ok(None);
        };
        if best >= self.anchors.nrows() || best >= boxes.shape()[1] {
            return Ok(None);
        }
        let score = sigmoid(scores[[0, best, 0]]);

        let (x1, y1, x2, y2) = self.decode_box(&boxes.view(), best);

        // back from the square crop to full-frame pixels
        let side = side as f32;
        Ok(Some(FaceBox {
            x: x1 * side + crop_x as f32,
            y: y1 * side + crop_y as f32,
            width: (x2 - x1) * side,
            height: (y2 - y1) * side,
            score,
        }))
    }
}

fn argmax(input: impl Iterator<Item = f32>) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, item) in input.enumerate() {
        match best {
            Some((_, max)) if item <= max => {}
            _ => best = Some((i, item)),
        }
    }
    best.map(|(i, _)| i)
}

pub(crate) fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

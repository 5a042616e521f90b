#[cfg(feature = "onnx")]
pub mod model_blazeface;

use image::DynamicImage;

use crate::error::Result;
use crate::face::FaceLandmarks;

pub trait FaceDetectionModel: Send {
    /// Returns the highest scoring face in `image`, if the model reports any.
    fn run(&self, image: &DynamicImage) -> Result<Option<FaceBox>>;
}

/// Bounding box around a face, in pixels of the full frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub score: f32,
}

impl FaceBox {
    /// Square box centered on the extent of `landmarks`, used to seed the
    /// next frame's landmark crop without running the detector.
    pub fn enclosing(landmarks: &FaceLandmarks, image_width: u32, image_height: u32, score: f32) -> Option<Self> {
        let first = landmarks.points.first()?;
        let (mut x_min, mut y_min, mut x_max, mut y_max) = (first.x, first.y, first.x, first.y);
        for p in &landmarks.points {
            x_min = x_min.min(p.x);
            y_min = y_min.min(p.y);
            x_max = x_max.max(p.x);
            y_max = y_max.max(p.y);
        }

        let x_min = x_min * image_width as f32;
        let x_max = x_max * image_width as f32;
        let y_min = y_min * image_height as f32;
        let y_max = y_max * image_height as f32;

        let side = (x_max - x_min).max(y_max - y_min);
        if side <= 0.0 {
            return None;
        }
        let center = ((x_min + x_max) / 2.0, (y_min + y_max) / 2.0);

        Some(FaceBox {
            x: center.0 - side / 2.0,
            y: center.1 - side / 2.0,
            width: side,
            height: side,
            score,
        })
    }

    /// Grow the box by `fraction` of its width on every side.
    pub fn padded(&self, fraction: f32) -> Self {
        let padding = fraction * self.width;
        FaceBox {
            x: self.x - padding,
            y: self.y - padding,
            width: self.width + 2.0 * padding,
            height: self.height + 2.0 * padding,
            score: self.score,
        }
    }

    /// Clamp to the image, shortening the longer side so the aspect ratio
    /// survives. Returns integer pixel bounds `(x, y, w, h)`, or `None` when
    /// nothing of the box is left inside the image.
    pub fn clamped(&self, image_width: u32, image_height: u32) -> Option<(u32, u32, u32, u32)> {
        if self.width <= 0.0 || self.height <= 0.0 {
            return None;
        }
        let aspect = self.width / self.height;

        let x = self.x.max(0.0);
        let y = self.y.max(0.0);
        let w = self.width.min(image_width as f32 - x);
        let h = self.height.min(image_height as f32 - y);
        if w < 1.0 || h < 1.0 {
            return None;
        }

        let short_side = w.min(h);
        let w = (short_side * aspect).min(w);
        let h = (short_side / aspect).min(h);
        if w < 1.0 || h < 1.0 {
            return None;
        }

        Some((x as u32, y as u32, w as u32, h as u32))
    }
}

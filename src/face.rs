use nalgebra::Point2;

use crate::error::{Result, TryOnError};

// struct that stores the landmarks of one tracked face
// (468 points, 478 with iris refinement), normalized to 0..1 of the frame
#[derive(Debug, Clone, PartialEq)]
pub struct FaceLandmarks {
    pub points: Vec<Point2<f32>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandmarkPoint {
    LeftEyeOuter,
    RightEyeOuter,
    NoseBridge,
}

impl LandmarkPoint {
    pub fn index(self) -> usize {
        match self {
            LandmarkPoint::LeftEyeOuter => 33,
            LandmarkPoint::RightEyeOuter => 263,
            LandmarkPoint::NoseBridge => 168,
        }
    }
}

/// The three points eyewear placement is derived from, in surface pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyewearAnchors {
    pub left_eye: Point2<f32>,
    pub right_eye: Point2<f32>,
    pub nose_bridge: Point2<f32>,
}

impl FaceLandmarks {
    pub fn new(points: Vec<Point2<f32>>) -> Self {
        Self { points }
    }

    // construct from a flat vector of x, y(, z) tuples; z is dropped
    pub fn from_flat(values: &[f32], stride: usize) -> FaceLandmarks {
        let stride = stride.max(2);
        let points = values
            .chunks_exact(stride)
            .map(|c| Point2::new(c[0], c[1]))
            .collect();
        FaceLandmarks { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get_point(&self, point: LandmarkPoint) -> Result<Point2<f32>> {
        self.points
            .get(point.index())
            .copied()
            .ok_or(TryOnError::MissingLandmark(point.index()))
    }

    /// Converts a normalized point to surface pixels, mirrored horizontally so
    /// it lines up with the mirrored camera frame.
    pub fn to_surface(point: Point2<f32>, width: u32, height: u32) -> Point2<f32> {
        let width = width as f32;
        let height = height as f32;
        Point2::new(width - point.x * width, point.y * height)
    }

    pub fn anchors(&self, width: u32, height: u32) -> Result<EyewearAnchors> {
        let left_eye = self.get_point(LandmarkPoint::LeftEyeOuter)?;
        let right_eye = self.get_point(LandmarkPoint::RightEyeOuter)?;
        let nose_bridge = self.get_point(LandmarkPoint::NoseBridge)?;

        Ok(EyewearAnchors {
            left_eye: Self::to_surface(left_eye, width, height),
            right_eye: Self::to_surface(right_eye, width, height),
            nose_bridge: Self::to_surface(nose_bridge, width, height),
        })
    }
}

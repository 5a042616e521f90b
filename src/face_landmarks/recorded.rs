use std::fs;
use std::path::PathBuf;

use image::DynamicImage;
use nalgebra::Point2;
use serde::Deserialize;

use crate::error::{Result, TryOnError};
use crate::face::FaceLandmarks;
use crate::face_landmarks::LandmarkSource;

/// One point as written by a recorder: `[x, y]`, `[x, y, z]` or `{"x": .., "y": ..}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RecordedPoint {
    Tuple(Vec<f32>),
    Object { x: f32, y: f32 },
}

/// Replays tracker output captured earlier, one JSON line per frame.
///
/// Each line is `null` (no face) or an array of normalized points. Blank
/// lines count as `null`; frames past the end of the recording have no face.
pub struct RecordedLandmarks {
    path: Option<PathBuf>,
    frames: Vec<Option<FaceLandmarks>>,
    cursor: usize,
}

impl RecordedLandmarks {
    /// Reads `path` when the source is started.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            frames: Vec::new(),
            cursor: 0,
        }
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(Self {
            path: None,
            frames: parse_recording(contents)?,
            cursor: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

fn parse_recording(contents: &str) -> Result<Vec<Option<FaceLandmarks>>> {
    contents
        .lines()
        .enumerate()
        .map(|(i, line)| parse_line(line).map_err(|message| TryOnError::Recording { line: i + 1, message }))
        .collect()
}

fn parse_line(line: &str) -> std::result::Result<Option<FaceLandmarks>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let points: Option<Vec<RecordedPoint>> = serde_json::from_str(line).map_err(|e| e.to_string())?;
    let Some(points) = points else {
        return Ok(None);
    };

    let points = points
        .into_iter()
        .enumerate()
        .map(|(i, point)| match point {
            RecordedPoint::Tuple(coords) if coords.len() >= 2 => Ok(Point2::new(coords[0], coords[1])),
            RecordedPoint::Tuple(coords) => Err(format!(
                "point {} has {} coordinates, expected at least 2",
                i,
                coords.len()
            )),
            RecordedPoint::Object { x, y } => Ok(Point2::new(x, y)),
        })
        .collect::<std::result::Result<Vec<_>, String>>()?;

    Ok(Some(FaceLandmarks::new(points)))
}

impl LandmarkSource for RecordedLandmarks {
    fn start(&mut self) -> Result<()> {
        if let Some(path) = &self.path {
            let contents = fs::read_to_string(path)?;
            self.frames = parse_recording(&contents)?;
            tracing::info!("replaying {} recorded frames from {}", self.frames.len(), path.display());
        }
        self.cursor = 0;
        Ok(())
    }

    fn process(&mut self, _frame: &DynamicImage) -> Result<Option<FaceLandmarks>> {
        let face = self.frames.get(self.cursor).cloned().flatten();
        self.cursor += 1;
        Ok(face)
    }
}

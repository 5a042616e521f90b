//! Camera frame sources.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use image::DynamicImage;

use crate::error::{Result, TryOnError};

/// Yields camera frames in capture order, unmirrored.
pub trait FrameSource {
    fn start(&mut self) -> Result<()>;

    /// `Ok(None)` once the source is exhausted or stopped.
    fn next_frame(&mut self) -> Result<Option<DynamicImage>>;

    fn stop(&mut self) {}
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// Stills from a directory, replayed in file name order.
pub struct ImageSequenceSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
    frame_interval: Option<Duration>,
    last_frame: Option<Instant>,
}

impl ImageSequenceSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            files: Vec::new(),
            cursor: 0,
            frame_interval: None,
            last_frame: None,
        }
    }

    /// Pace playback to roughly `fps` frames per second.
    pub fn with_frame_rate(mut self, fps: u32) -> Self {
        self.frame_interval = (fps > 0).then(|| Duration::from_secs_f64(1.0 / fps as f64));
        self
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn is_image(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }

    fn pace(&mut self) {
        if let (Some(interval), Some(last)) = (self.frame_interval, self.last_frame) {
            let elapsed = last.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
        self.last_frame = Some(Instant::now());
    }
}

impl FrameSource for ImageSequenceSource {
    fn start(&mut self) -> Result<()> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| {
            TryOnError::Camera(format!("cannot read frame directory {}: {}", self.dir.display(), e))
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && Self::is_image(&path) {
                files.push(path);
            }
        }
        files.sort();

        if files.is_empty() {
            return Err(TryOnError::Camera(format!(
                "no frames found in {}",
                self.dir.display()
            )));
        }

        tracing::info!("replaying {} frames from {}", files.len(), self.dir.display());
        self.files = files;
        self.cursor = 0;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<DynamicImage>> {
        let Some(path) = self.files.get(self.cursor) else {
            return Ok(None);
        };
        let image = image::open(path)?;
        self.cursor += 1;
        self.pace();
        Ok(Some(image))
    }

    fn stop(&mut self) {
        self.cursor = self.files.len();
    }
}

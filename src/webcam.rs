// thin wrapper around nokhwa
use image::DynamicImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
};
use nokhwa::Camera;

use crate::config::CameraConfig;
use crate::error::{Result, TryOnError};
use crate::frame_source::FrameSource;

fn camera_error(e: nokhwa::NokhwaError) -> TryOnError {
    TryOnError::Camera(e.to_string())
}

/// Live frames from a local camera. The device is opened in `start`.
pub struct WebcamSource {
    config: CameraConfig,
    camera: Option<Camera>,
}

impl WebcamSource {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            camera: None,
        }
    }
}

impl FrameSource for WebcamSource {
    fn start(&mut self) -> Result<()> {
        let config = &self.config;
        let format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
            CameraFormat::new(
                Resolution::new(config.width, config.height),
                FrameFormat::MJPEG,
                config.fps,
            ),
        ));

        let mut camera = Camera::new(CameraIndex::Index(config.index), format).map_err(camera_error)?;
        camera.open_stream().map_err(camera_error)?;

        tracing::info!(
            "opened camera {} ({}) at {} {:?} {} fps",
            config.index,
            camera.info().human_name(),
            camera.resolution(),
            camera.frame_format(),
            camera.frame_rate()
        );

        self.camera = Some(camera);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<DynamicImage>> {
        let Some(camera) = self.camera.as_mut() else {
            return Ok(None);
        };
        let frame = camera.frame().map_err(camera_error)?;
        let image = frame.decode_image::<RgbFormat>().map_err(camera_error)?;
        Ok(Some(DynamicImage::ImageRgb8(image)))
    }

    fn stop(&mut self) {
        if let Some(mut camera) = self.camera.take() {
            if let Err(e) = camera.stop_stream() {
                tracing::warn!("failed to stop camera stream: {}", e);
            }
        }
    }
}

impl Drop for WebcamSource {
    fn drop(&mut self) {
        self.stop();
    }
}

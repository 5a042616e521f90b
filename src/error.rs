//! Error types for the try-on pipeline.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TryOnError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Camera error: {0}")]
    Camera(String),

    #[error("Tracker error: {0}")]
    Tracker(String),

    #[error("Failed to load sprite {path}: {message}")]
    Sprite { path: String, message: String },

    #[error("Unknown eyewear style: {0}")]
    UnknownStyle(u32),

    #[error("Landmark {0} missing from tracker output")]
    MissingLandmark(usize),

    #[error("Landmark recording error at line {line}: {message}")]
    Recording { line: usize, message: String },

    #[error("Viewer error: {0}")]
    Viewer(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadFile(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid configuration value: {field} - {message}")]
    InvalidValue { field: String, message: String },
}

impl ConfigError {
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TryOnError>;

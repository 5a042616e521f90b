//! Virtual eyewear try-on.
//!
//! Face landmarks from a tracker are turned into an eyewear placement
//! ([`geometry`]), smoothed over time ([`smoothing`]) and composited over the
//! mirrored camera frame ([`compositor`]). [`session::TryOnSession`] ties
//! those together with the style catalog and the session lifecycle.

pub mod catalog;
pub mod compositor;
pub mod config;
pub mod error;
pub mod face;
pub mod face_detection;
pub mod face_landmarks;
pub mod frame_source;
pub mod geometry;
pub mod pipeline;
pub mod session;
pub mod smoothing;
pub mod utils;

#[cfg(feature = "gui")]
pub mod app;
#[cfg(feature = "camera")]
pub mod webcam;

pub use config::Config;
pub use error::{Result, TryOnError};
pub use session::TryOnSession;

pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

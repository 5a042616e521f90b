//! Frame-to-frame smoothing of eyewear placement.
//!
//! Each field of [`FrameGeometry`] runs through its own single-pole
//! exponential filter: the retained value moves a fixed fraction of the way
//! toward every new target, and the filtered value (not the raw target) is
//! what gets retained. The angle is blended along the shorter arc, so a
//! head held level (eye line near +-pi after mirroring) does not spin when
//! the raw angle wraps.

use std::f32::consts::{PI, TAU};

use crate::config::OverlayConfig;
use crate::geometry::{lerp, FrameGeometry};

/// Per-field blend factors in `[0, 1]`. 1 follows the target with no lag,
/// 0 freezes the retained value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothingFactors {
    pub position: f32,
    pub scale: f32,
    pub angle: f32,
}

impl SmoothingFactors {
    pub fn uniform(factor: f32) -> Self {
        Self {
            position: factor,
            scale: factor,
            angle: factor,
        }
    }
}

impl Default for SmoothingFactors {
    fn default() -> Self {
        Self {
            position: 0.4,
            scale: 0.3,
            angle: 0.3,
        }
    }
}

impl From<&OverlayConfig> for SmoothingFactors {
    fn from(config: &OverlayConfig) -> Self {
        Self {
            position: config.position_smoothing,
            scale: config.scale_smoothing,
            angle: config.angle_smoothing,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TemporalSmoother {
    prev: FrameGeometry,
    factors: SmoothingFactors,
}

impl TemporalSmoother {
    /// Starts from an all-zero geometry, so the first detection glides in.
    pub fn new(factors: SmoothingFactors) -> Self {
        Self {
            prev: FrameGeometry::default(),
            factors,
        }
    }

    /// Blend `target` into the retained state and return the new state.
    pub fn smooth(&mut self, target: &FrameGeometry) -> FrameGeometry {
        let prev = self.prev;
        let f = self.factors;

        self.prev = FrameGeometry {
            center_x: lerp(prev.center_x, target.center_x, f.position),
            center_y: lerp(prev.center_y, target.center_y, f.position),
            scale: lerp(prev.scale, target.scale, f.scale),
            angle: lerp_angle(prev.angle, target.angle, f.angle),
        };
        self.prev
    }

    pub fn current(&self) -> FrameGeometry {
        self.prev
    }

    pub fn factors(&self) -> SmoothingFactors {
        self.factors
    }

    pub fn reset(&mut self) {
        self.prev = FrameGeometry::default();
    }
}

// lerp between two angles through the smaller difference; the result is not
// wrapped, it stays within a step of the previous value
fn lerp_angle(start: f32, end: f32, factor: f32) -> f32 {
    let mut delta = end - start;
    if delta > PI {
        delta -= TAU;
    } else if delta < -PI {
        delta += TAU;
    }
    start + delta * factor
}

impl Default for TemporalSmoother {
    fn default() -> Self {
        Self::new(SmoothingFactors::default())
    }
}

//! Eyewear placement from eye and nose landmarks.

use nalgebra::{Matrix3, Vector2};

use crate::config::OverlayConfig;
use crate::face::EyewearAnchors;

pub type Point2 = nalgebra::Point2<f32>;

/// Euclidean distance between two points.
pub fn distance(p1: &Point2, p2: &Point2) -> f32 {
    nalgebra::distance(p1, p2)
}

/// Rotation (radians) that aligns the horizontal axis with the line from
/// `left` to `right`.
pub fn angle(left: &Point2, right: &Point2) -> f32 {
    let d = right - left;
    d.y.atan2(d.x)
}

pub fn lerp(start: f32, end: f32, factor: f32) -> f32 {
    start + (end - start) * factor
}

/// Placement of the eyewear sprite for one frame, in surface pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameGeometry {
    pub center_x: f32,
    pub center_y: f32,
    pub scale: f32,
    pub angle: f32,
}

impl FrameGeometry {
    /// Sprite-to-surface transform: translate to the center, rotate, then
    /// scale with the vertical axis inverted, with the sprite centered on the
    /// origin before any of that.
    pub fn sprite_transform(&self, sprite_width: u32, sprite_height: u32) -> Matrix3<f32> {
        let center = Matrix3::new_translation(&Vector2::new(self.center_x, self.center_y));
        let rotation = Matrix3::new_rotation(self.angle);
        let scaling = Matrix3::new_nonuniform_scaling(&Vector2::new(self.scale, -self.scale));
        let origin = Matrix3::new_translation(&Vector2::new(
            -(sprite_width as f32) / 2.0,
            -(sprite_height as f32) / 2.0,
        ));

        center * rotation * scaling * origin
    }
}

/// Turns the three anchor landmarks into a [`FrameGeometry`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryResolver {
    width_factor: f32,
    vertical_offset: f32,
}

impl GeometryResolver {
    pub fn new(width_factor: f32, vertical_offset: f32) -> Self {
        Self {
            width_factor,
            vertical_offset,
        }
    }

    pub fn from_config(config: &OverlayConfig) -> Self {
        Self::new(config.width_factor, config.vertical_offset)
    }

    /// `anchors` must already be in (mirrored) surface pixel coordinates.
    pub fn resolve(&self, anchors: &EyewearAnchors, sprite_width: u32) -> FrameGeometry {
        let eye_distance = distance(&anchors.left_eye, &anchors.right_eye);
        let face_angle = angle(&anchors.left_eye, &anchors.right_eye);

        let target_width = eye_distance * self.width_factor;
        let scale = if sprite_width == 0 {
            0.0
        } else {
            target_width / sprite_width as f32
        };

        FrameGeometry {
            center_x: anchors.nose_bridge.x,
            center_y: anchors.nose_bridge.y + self.vertical_offset,
            scale,
            angle: face_angle,
        }
    }
}

impl Default for GeometryResolver {
    fn default() -> Self {
        Self::from_config(&OverlayConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;
    use std::f32::consts::PI;

    fn anchors(left: (f32, f32), right: (f32, f32), nose: (f32, f32)) -> EyewearAnchors {
        EyewearAnchors {
            left_eye: Point2::new(left.0, left.1),
            right_eye: Point2::new(right.0, right.1),
            nose_bridge: Point2::new(nose.0, nose.1),
        }
    }

    #[test]
    fn distance_is_symmetric_and_translation_invariant() {
        let pairs = [
            (Point2::new(0.0, 0.0), Point2::new(3.0, 4.0)),
            (Point2::new(-12.5, 7.0), Point2::new(40.0, -3.25)),
            (Point2::new(640.0, 360.0), Point2::new(641.0, 360.0)),
        ];
        let shift = Vector2::new(123.0, -45.5);

        for (p1, p2) in pairs {
            assert_relative_eq!(distance(&p1, &p2), distance(&p2, &p1));
            assert_relative_eq!(
                distance(&p1, &p2),
                distance(&(p1 + shift), &(p2 + shift)),
                epsilon = 1e-3
            );
        }
        assert_relative_eq!(distance(&pairs[0].0, &pairs[0].1), 5.0);
    }

    #[test]
    fn angle_is_translation_invariant_and_flips_by_pi() {
        let p1 = Point2::new(100.0, 200.0);
        let p2 = Point2::new(300.0, 260.0);
        let shift = Vector2::new(-50.0, 75.0);

        assert_relative_eq!(angle(&p1, &p2), angle(&(p1 + shift), &(p2 + shift)), epsilon = 1e-5);

        let forward = angle(&p1, &p2);
        let backward = angle(&p2, &p1);
        let diff = (forward - backward).rem_euclid(2.0 * PI);
        assert_relative_eq!(diff, PI, epsilon = 1e-5);
    }

    #[test]
    fn level_eyes_resolve_to_reference_scale() {
        let resolver = GeometryResolver::new(1.7, 0.0);
        let geometry = resolver.resolve(&anchors((100.0, 200.0), (300.0, 200.0), (200.0, 210.0)), 400);

        assert_relative_eq!(geometry.angle, 0.0);
        assert_relative_eq!(geometry.scale, 0.85, epsilon = 1e-6);
        assert_relative_eq!(geometry.center_x, 200.0);
        assert_relative_eq!(geometry.center_y, 210.0);
    }

    #[test]
    fn vertical_offset_applies_to_center_only() {
        let resolver = GeometryResolver::default();
        let geometry = resolver.resolve(&anchors((100.0, 200.0), (300.0, 200.0), (200.0, 210.0)), 400);

        assert_relative_eq!(geometry.center_y, 225.0);
        assert_relative_eq!(geometry.center_x, 200.0);
        assert_relative_eq!(geometry.scale, 0.85, epsilon = 1e-6);
    }

    #[test]
    fn tilted_head_yields_rotation() {
        let resolver = GeometryResolver::default();
        let geometry = resolver.resolve(&anchors((0.0, 0.0), (100.0, 100.0), (50.0, 50.0)), 100);
        assert_relative_eq!(geometry.angle, PI / 4.0, epsilon = 1e-6);
    }

    #[test]
    fn mirrored_level_eyes_sit_at_half_turn() {
        // landmark 33 is on the image's left, so after mirroring it is the
        // rightmost anchor and the eye line points in -x
        let resolver = GeometryResolver::new(1.7, 0.0);
        let geometry = resolver.resolve(&anchors((300.0, 200.0), (100.0, 200.0), (200.0, 210.0)), 400);

        assert_relative_eq!(geometry.angle.abs(), PI, epsilon = 1e-6);
        assert_relative_eq!(geometry.scale, 0.85, epsilon = 1e-6);

        let tilted = resolver.resolve(&anchors((300.0, 200.0), (100.0, 200.5), (200.0, 210.0)), 400);
        assert!(tilted.angle > 0.0 && tilted.angle < PI);
    }

    #[test]
    fn zero_width_sprite_gives_zero_scale() {
        let geometry = GeometryResolver::default().resolve(
            &anchors((100.0, 200.0), (300.0, 200.0), (200.0, 210.0)),
            0,
        );
        assert_eq!(geometry.scale, 0.0);
    }

    #[test]
    fn sprite_transform_maps_sprite_center_to_geometry_center() {
        let geometry = FrameGeometry {
            center_x: 320.0,
            center_y: 240.0,
            scale: 0.5,
            angle: 0.3,
        };
        let m = geometry.sprite_transform(400, 200);
        let center = m * Vector3::new(200.0, 100.0, 1.0);
        assert_relative_eq!(center.x, 320.0, epsilon = 1e-3);
        assert_relative_eq!(center.y, 240.0, epsilon = 1e-3);
    }

    #[test]
    fn sprite_transform_inverts_vertical_axis() {
        let geometry = FrameGeometry {
            center_x: 0.0,
            center_y: 0.0,
            scale: 1.0,
            angle: 0.0,
        };
        let m = geometry.sprite_transform(10, 10);
        // top-left corner of the sprite lands below the center
        let top_left = m * Vector3::new(0.0, 0.0, 1.0);
        assert_relative_eq!(top_left.x, -5.0);
        assert_relative_eq!(top_left.y, 5.0);
    }

    #[test]
    fn lerp_endpoints() {
        assert_eq!(lerp(2.0, 10.0, 0.0), 2.0);
        assert_eq!(lerp(2.0, 10.0, 1.0), 10.0);
        assert_relative_eq!(lerp(2.0, 10.0, 0.25), 4.0);
    }
}

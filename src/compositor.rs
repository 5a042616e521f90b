//! Per-frame drawing: mirrored camera feed plus the transformed eyewear sprite.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma, Rgba, RgbaImage};
use imageproc::drawing::draw_cross_mut;
use nalgebra::{Matrix3, Point2, Vector3};
use rayon::prelude::*;

use crate::catalog::Sprite;
use crate::config::{OverlayConfig, ShadowConfig};
use crate::face::EyewearAnchors;
use crate::geometry::FrameGeometry;

/// A 2D drawing target.
pub trait Surface {
    fn dimensions(&self) -> (u32, u32);

    /// A surface with no area has not been mounted yet.
    fn is_mounted(&self) -> bool {
        let (w, h) = self.dimensions();
        w > 0 && h > 0
    }

    fn clear(&mut self);

    /// Draw `frame` flipped horizontally and stretched to the surface bounds.
    fn draw_mirrored_frame(&mut self, frame: &DynamicImage);

    /// Draw `sprite` through `transform` (sprite pixels to surface pixels),
    /// with an optional drop shadow underneath.
    fn draw_sprite(&mut self, sprite: &Sprite, transform: &Matrix3<f32>, shadow: Option<&ShadowConfig>);

    fn draw_marker(&mut self, at: Point2<f32>);
}

/// What ended up on the surface for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Nothing was drawn (sprite or surface not ready, or session inactive).
    Skipped,
    CameraOnly,
    WithSprite,
}

/// Sprite placement for one frame.
#[derive(Debug, Clone, Copy)]
pub struct Overlay<'a> {
    pub sprite: &'a Sprite,
    pub geometry: FrameGeometry,
    pub anchors: EyewearAnchors,
}

#[derive(Debug, Clone)]
pub struct Compositor {
    shadow: ShadowConfig,
    debug_landmarks: bool,
}

impl Compositor {
    pub fn new(shadow: ShadowConfig, debug_landmarks: bool) -> Self {
        Self {
            shadow,
            debug_landmarks,
        }
    }

    pub fn from_config(config: &OverlayConfig) -> Self {
        Self::new(config.shadow, config.debug_landmarks)
    }

    pub fn render<S: Surface + ?Sized>(
        &self,
        surface: &mut S,
        frame: &DynamicImage,
        overlay: Option<Overlay<'_>>,
    ) -> FrameOutcome {
        if !surface.is_mounted() {
            return FrameOutcome::Skipped;
        }

        surface.clear();
        surface.draw_mirrored_frame(frame);

        let Some(overlay) = overlay else {
            return FrameOutcome::CameraOnly;
        };

        let transform = overlay
            .geometry
            .sprite_transform(overlay.sprite.width(), overlay.sprite.height());
        let shadow = (self.shadow.opacity > 0.0).then_some(&self.shadow);
        surface.draw_sprite(overlay.sprite, &transform, shadow);

        if self.debug_landmarks {
            surface.draw_marker(overlay.anchors.left_eye);
            surface.draw_marker(overlay.anchors.right_eye);
            surface.draw_marker(overlay.anchors.nose_bridge);
        }

        FrameOutcome::WithSprite
    }
}

impl Default for Compositor {
    fn default() -> Self {
        Self::from_config(&OverlayConfig::default())
    }
}

/// CPU surface backed by an RGBA buffer.
#[derive(Debug, Clone)]
pub struct RasterSurface {
    buffer: RgbaImage,
}

impl RasterSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            buffer: RgbaImage::new(width, height),
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.buffer
    }

    pub fn into_image(self) -> RgbaImage {
        self.buffer
    }

    // rasterize the sprite into a layer covering `bounds`
    fn render_layer(&self, sprite: &RgbaImage, inverse: &Matrix3<f32>, bounds: &Bounds) -> RgbaImage {
        let mut layer = RgbaImage::new(bounds.width, bounds.height);
        let row_len = bounds.width as usize * 4;

        layer
            .par_chunks_mut(row_len)
            .enumerate()
            .for_each(|(row, pixels)| {
                let y = (bounds.y + row as i32) as f32 + 0.5;
                for (col, px) in pixels.chunks_exact_mut(4).enumerate() {
                    let x = (bounds.x + col as i32) as f32 + 0.5;
                    let src = inverse * Vector3::new(x, y, 1.0);
                    px.copy_from_slice(&sample_bilinear(sprite, src.x - 0.5, src.y - 0.5));
                }
            });

        layer
    }

    fn draw_shadow(&mut self, layer: &RgbaImage, bounds: &Bounds, shadow: &ShadowConfig) {
        let sigma = shadow_sigma(shadow);
        let margin = blur_margin(shadow);

        let mut alpha = GrayImage::new(layer.width() + 2 * margin, layer.height() + 2 * margin);
        for (x, y, px) in layer.enumerate_pixels() {
            alpha.put_pixel(x + margin, y + margin, Luma([px[3]]));
        }
        if sigma > 0.0 {
            alpha = imageproc::filter::gaussian_blur_f32(&alpha, sigma);
        }

        let origin_x = bounds.x - margin as i32 + shadow.offset_x.round() as i32;
        let origin_y = bounds.y - margin as i32 + shadow.offset_y.round() as i32;
        for (x, y, a) in alpha.enumerate_pixels() {
            if a[0] == 0 {
                continue;
            }
            let opacity = (a[0] as f32 * shadow.opacity).round() as u8;
            self.blend_at(
                origin_x + x as i32,
                origin_y + y as i32,
                Rgba([0, 0, 0, opacity]),
            );
        }
    }

    fn blend_at(&mut self, x: i32, y: i32, src: Rgba<u8>) {
        if x < 0 || y < 0 || x >= self.buffer.width() as i32 || y >= self.buffer.height() as i32 {
            return;
        }
        let dst = self.buffer.get_pixel_mut(x as u32, y as u32);
        *dst = source_over(*dst, src);
    }
}

impl Surface for RasterSurface {
    fn dimensions(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }

    fn clear(&mut self) {
        for px in self.buffer.pixels_mut() {
            *px = Rgba([0, 0, 0, 0]);
        }
    }

    fn draw_mirrored_frame(&mut self, frame: &DynamicImage) {
        let (width, height) = self.buffer.dimensions();
        let mut rgba = frame.to_rgba8();
        if rgba.dimensions() != (width, height) {
            rgba = imageops::resize(&rgba, width, height, FilterType::Triangle);
        }
        imageops::flip_horizontal_in_place(&mut rgba);

        for (dst, src) in self.buffer.pixels_mut().zip(rgba.pixels()) {
            *dst = source_over(*dst, *src);
        }
    }

    fn draw_sprite(&mut self, sprite: &Sprite, transform: &Matrix3<f32>, shadow: Option<&ShadowConfig>) {
        let Some(inverse) = transform.try_inverse() else {
            tracing::trace!("degenerate sprite transform, nothing drawn");
            return;
        };
        // off-surface parts of the sprite can still cast a shadow onto it
        let reach = shadow.map_or(0, |s| {
            blur_margin(s) + s.offset_x.abs().max(s.offset_y.abs()).ceil() as u32
        });
        let Some(bounds) = Bounds::of_transformed(
            transform,
            sprite.width(),
            sprite.height(),
            self.buffer.width(),
            self.buffer.height(),
            reach,
        ) else {
            return;
        };

        let layer = self.render_layer(sprite.image(), &inverse, &bounds);

        if let Some(shadow) = shadow {
            self.draw_shadow(&layer, &bounds, shadow);
        }

        for (x, y, px) in layer.enumerate_pixels() {
            if px[3] > 0 {
                self.blend_at(bounds.x + x as i32, bounds.y + y as i32, *px);
            }
        }
    }

    fn draw_marker(&mut self, at: Point2<f32>) {
        let red = Rgba([255u8, 0u8, 0u8, 255u8]);
        draw_cross_mut(&mut self.buffer, red, at.x.round() as i32, at.y.round() as i32);
    }
}

/// Axis-aligned pixel rectangle on the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Bounds {
    x: i32,
    y: i32,
    width: u32,
    height: u32,
}

impl Bounds {
    // bounding box of the transformed sprite rectangle, clipped to the surface
    // grown by `reach` pixels on every side
    fn of_transformed(
        transform: &Matrix3<f32>,
        width: u32,
        height: u32,
        surface_width: u32,
        surface_height: u32,
        reach: u32,
    ) -> Option<Bounds> {
        let (w, h) = (width as f32, height as f32);
        let corners = [(0.0, 0.0), (w, 0.0), (0.0, h), (w, h)].map(|(x, y)| transform * Vector3::new(x, y, 1.0));

        let min_x = corners.iter().map(|c| c.x).fold(f32::INFINITY, f32::min);
        let max_x = corners.iter().map(|c| c.x).fold(f32::NEG_INFINITY, f32::max);
        let min_y = corners.iter().map(|c| c.y).fold(f32::INFINITY, f32::min);
        let max_y = corners.iter().map(|c| c.y).fold(f32::NEG_INFINITY, f32::max);

        if !(min_x.is_finite() && max_x.is_finite() && min_y.is_finite() && max_y.is_finite()) {
            return None;
        }

        let reach = reach as i64;
        let x0 = (min_x.floor() as i64).max(-reach);
        let y0 = (min_y.floor() as i64).max(-reach);
        let x1 = (max_x.ceil() as i64).min(surface_width as i64 + reach);
        let y1 = (max_y.ceil() as i64).min(surface_height as i64 + reach);

        if x1 <= x0 || y1 <= y0 {
            return None;
        }

        Some(Bounds {
            x: x0 as i32,
            y: y0 as i32,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
        })
    }
}

// canvas shadow blur maps to a gaussian with sigma = blur / 2
fn shadow_sigma(shadow: &ShadowConfig) -> f32 {
    shadow.blur / 2.0
}

// pixels the blurred shadow spreads beyond the sprite's alpha
fn blur_margin(shadow: &ShadowConfig) -> u32 {
    (shadow_sigma(shadow) * 3.0).ceil().max(0.0) as u32
}

// bilinear sample at continuous pixel coordinates; outside the image is transparent
fn sample_bilinear(image: &RgbaImage, x: f32, y: f32) -> [u8; 4] {
    let (w, h) = (image.width() as i64, image.height() as i64);
    if x < -1.0 || y < -1.0 || x > w as f32 || y > h as f32 {
        return [0; 4];
    }

    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (x0, y0) = (x0 as i64, y0 as i64);

    let fetch = |px: i64, py: i64| -> [f32; 4] {
        if px < 0 || py < 0 || px >= w || py >= h {
            return [0.0; 4];
        }
        let p = image.get_pixel(px as u32, py as u32);
        let a = p[3] as f32;
        // premultiply so transparent neighbours don't bleed colour
        [p[0] as f32 * a, p[1] as f32 * a, p[2] as f32 * a, a]
    };

    let taps = [
        (fetch(x0, y0), (1.0 - fx) * (1.0 - fy)),
        (fetch(x0 + 1, y0), fx * (1.0 - fy)),
        (fetch(x0, y0 + 1), (1.0 - fx) * fy),
        (fetch(x0 + 1, y0 + 1), fx * fy),
    ];

    let mut acc = [0.0f32; 4];
    for (px, weight) in taps {
        for c in 0..4 {
            acc[c] += px[c] * weight;
        }
    }

    if acc[3] <= 0.0 {
        return [0; 4];
    }
    [
        (acc[0] / acc[3]).round().clamp(0.0, 255.0) as u8,
        (acc[1] / acc[3]).round().clamp(0.0, 255.0) as u8,
        (acc[2] / acc[3]).round().clamp(0.0, 255.0) as u8,
        acc[3].round().clamp(0.0, 255.0) as u8,
    ]
}

fn source_over(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let sa = src[3] as f32 / 255.0;
    if sa >= 1.0 {
        return src;
    }
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let mut out = [0u8; 4];
    for c in 0..3 {
        let v = (src[c] as f32 * sa + dst[c] as f32 * da * (1.0 - sa)) / out_a;
        out[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgba(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

    #[derive(Default)]
    struct RecordingSurface {
        width: u32,
        height: u32,
        calls: Vec<&'static str>,
        transforms: Vec<Matrix3<f32>>,
    }

    impl RecordingSurface {
        fn new(width: u32, height: u32) -> Self {
            Self {
                width,
                height,
                ..Default::default()
            }
        }
    }

    impl Surface for RecordingSurface {
        fn dimensions(&self) -> (u32, u32) {
            (self.width, self.height)
        }
        fn clear(&mut self) {
            self.calls.push("clear");
        }
        fn draw_mirrored_frame(&mut self, _frame: &DynamicImage) {
            self.calls.push("frame");
        }
        fn draw_sprite(&mut self, _sprite: &Sprite, transform: &Matrix3<f32>, shadow: Option<&ShadowConfig>) {
            self.calls.push(if shadow.is_some() { "sprite+shadow" } else { "sprite" });
            self.transforms.push(*transform);
        }
        fn draw_marker(&mut self, _at: Point2<f32>) {
            self.calls.push("marker");
        }
    }

    fn overlay(sprite: &Sprite) -> Overlay<'_> {
        Overlay {
            sprite,
            geometry: FrameGeometry {
                center_x: 32.0,
                center_y: 24.0,
                scale: 1.0,
                angle: 0.0,
            },
            anchors: EyewearAnchors {
                left_eye: Point2::new(20.0, 20.0),
                right_eye: Point2::new(44.0, 20.0),
                nose_bridge: Point2::new(32.0, 24.0),
            },
        }
    }

    fn camera_frame(width: u32, height: u32) -> DynamicImage {
        // left half blue, right half green
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, _| {
            if x < width / 2 {
                image::Rgb([0, 0, 255])
            } else {
                image::Rgb([0, 255, 0])
            }
        }))
    }

    #[test]
    fn no_face_renders_camera_only() {
        let mut surface = RecordingSurface::new(64, 48);
        let outcome = Compositor::default().render(&mut surface, &camera_frame(64, 48), None);

        assert_eq!(outcome, FrameOutcome::CameraOnly);
        assert_eq!(surface.calls, ["clear", "frame"]);
    }

    #[test]
    fn face_draws_sprite_with_shadow_after_frame() {
        let sprite = Sprite::new(RgbaImage::from_pixel(8, 4, RED));
        let mut surface = RecordingSurface::new(64, 48);
        let outcome = Compositor::default().render(&mut surface, &camera_frame(64, 48), Some(overlay(&sprite)));

        assert_eq!(outcome, FrameOutcome::WithSprite);
        assert_eq!(surface.calls, ["clear", "frame", "sprite+shadow"]);
        let expected = overlay(&sprite).geometry.sprite_transform(8, 4);
        assert_eq!(surface.transforms[0], expected);
    }

    #[test]
    fn debug_markers_follow_sprite() {
        let sprite = Sprite::new(RgbaImage::from_pixel(8, 4, RED));
        let mut surface = RecordingSurface::new(64, 48);
        let mut shadow = ShadowConfig::default();
        shadow.opacity = 0.0;
        Compositor::new(shadow, true).render(&mut surface, &camera_frame(64, 48), Some(overlay(&sprite)));

        assert_eq!(surface.calls, ["clear", "frame", "sprite", "marker", "marker", "marker"]);
    }

    #[test]
    fn unmounted_surface_is_skipped() {
        let sprite = Sprite::new(RgbaImage::from_pixel(8, 4, RED));
        let mut surface = RecordingSurface::new(0, 0);
        let outcome = Compositor::default().render(&mut surface, &camera_frame(64, 48), Some(overlay(&sprite)));

        assert_eq!(outcome, FrameOutcome::Skipped);
        assert!(surface.calls.is_empty());
    }

    #[test]
    fn raster_frame_is_mirrored_and_resized() {
        let mut surface = RasterSurface::new(32, 16);
        surface.draw_mirrored_frame(&camera_frame(64, 32));

        // camera left (blue) ends up on the right
        assert_eq!(*surface.image().get_pixel(2, 8), Rgba([0, 255, 0, 255]));
        assert_eq!(*surface.image().get_pixel(29, 8), Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn raster_sprite_lands_on_center() {
        let mut surface = RasterSurface::new(64, 48);
        surface.draw_mirrored_frame(&camera_frame(64, 48));

        let sprite = Sprite::new(RgbaImage::from_pixel(10, 6, RED));
        let geometry = FrameGeometry {
            center_x: 20.0,
            center_y: 30.0,
            scale: 2.0,
            angle: 0.0,
        };
        surface.draw_sprite(&sprite, &geometry.sprite_transform(10, 6), None);

        let image = surface.image();
        assert_eq!(*image.get_pixel(20, 30), RED);
        assert_eq!(*image.get_pixel(12, 25), RED);
        // outside the 20x12 footprint the camera frame is untouched
        assert_eq!(*image.get_pixel(20, 40), Rgba([0, 255, 0, 255]));
        assert_eq!(*image.get_pixel(5, 30), Rgba([0, 255, 0, 255]));
    }

    #[test]
    fn raster_shadow_darkens_below_right() {
        let mut surface = RasterSurface::new(64, 48);
        for px in surface.buffer.pixels_mut() {
            *px = Rgba([200, 200, 200, 255]);
        }

        let sprite = Sprite::new(RgbaImage::from_pixel(10, 10, RED));
        let geometry = FrameGeometry {
            center_x: 20.0,
            center_y: 20.0,
            scale: 1.0,
            angle: 0.0,
        };
        let shadow = ShadowConfig {
            opacity: 0.5,
            blur: 0.0,
            offset_x: 5.0,
            offset_y: 5.0,
        };
        surface.draw_sprite(&sprite, &geometry.sprite_transform(10, 10), Some(&shadow));

        let image = surface.image();
        // sprite covers 15..25, shadow covers 20..30
        assert_eq!(*image.get_pixel(20, 20), RED);
        let shaded = image.get_pixel(27, 27);
        assert!(shaded[0] < 200 && shaded[0] > 0);
        assert_eq!(*image.get_pixel(40, 40), Rgba([200, 200, 200, 255]));
    }

    #[test]
    fn sprite_off_the_edge_still_casts_shadow() {
        let gray = Rgba([200, 200, 200, 255]);
        let mut surface = RasterSurface::new(32, 32);
        for px in surface.buffer.pixels_mut() {
            *px = gray;
        }

        // sprite spans x -10..-2, entirely left of the surface
        let sprite = Sprite::new(RgbaImage::from_pixel(8, 8, RED));
        let geometry = FrameGeometry {
            center_x: -6.0,
            center_y: 16.0,
            scale: 1.0,
            angle: 0.0,
        };
        let shadow = ShadowConfig {
            opacity: 0.5,
            blur: 0.0,
            offset_x: 5.0,
            offset_y: 5.0,
        };
        surface.draw_sprite(&sprite, &geometry.sprite_transform(8, 8), Some(&shadow));

        let image = surface.image();
        // shadow spans x -5..3, y 17..25
        let shaded = image.get_pixel(1, 22);
        assert!(shaded[0] < 200, "expected shadow, got {:?}", shaded);
        assert_eq!(*image.get_pixel(1, 14), gray);
        assert_eq!(*image.get_pixel(10, 22), gray);
    }

    #[test]
    fn degenerate_transform_draws_nothing() {
        let mut surface = RasterSurface::new(16, 16);
        let before = surface.image().clone();
        let sprite = Sprite::new(RgbaImage::from_pixel(4, 4, RED));
        let geometry = FrameGeometry {
            center_x: 8.0,
            center_y: 8.0,
            scale: 0.0,
            angle: 0.0,
        };
        surface.draw_sprite(&sprite, &geometry.sprite_transform(4, 4), None);
        assert_eq!(surface.image(), &before);
    }

    #[test]
    fn source_over_blends_half_alpha() {
        let out = source_over(Rgba([0, 0, 0, 255]), Rgba([255, 255, 255, 128]));
        assert_eq!(out[3], 255);
        assert!((out[0] as i32 - 128).abs() <= 1);
    }
}

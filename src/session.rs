//! Try-on session: lifecycle state, sprite selection and the per-frame handler.

use std::fmt;
use std::sync::Arc;

use image::DynamicImage;

use crate::catalog::{Catalog, Sprite, SpriteLoad, SpriteLoader};
use crate::compositor::{Compositor, FrameOutcome, Overlay, Surface};
use crate::config::Config;
use crate::error::Result;
use crate::face::FaceLandmarks;
use crate::geometry::{FrameGeometry, GeometryResolver};
use crate::smoothing::{SmoothingFactors, TemporalSmoother};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Initializing,
    Ready { face_detected: bool },
    Failed(String),
    Stopped,
}

/// User-facing status shown over the surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Loading,
    InitFailed(String),
    SpriteFailed(String),
    NoFace,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Loading => write!(f, "Initializing camera and face detection..."),
            Notice::InitFailed(_) => write!(f, "Failed to initialize camera or face detection"),
            Notice::SpriteFailed(_) => write!(f, "Failed to load glasses image"),
            Notice::NoFace => write!(f, "No face detected. Please look at the camera."),
        }
    }
}

pub struct TryOnSession {
    state: SessionState,
    resolver: GeometryResolver,
    smoother: TemporalSmoother,
    compositor: Compositor,
    catalog: Catalog,
    selected_style: u32,
    sprite: Option<Arc<Sprite>>,
    sprite_error: Option<String>,
    loader: SpriteLoader,
}

impl TryOnSession {
    /// Creates a session in `Initializing` and starts loading the catalog's
    /// default style.
    pub fn new(config: &Config) -> Result<Self> {
        let catalog = Catalog::from_config(&config.catalog);
        let default_style = catalog.default_entry()?.id;

        let mut session = Self {
            state: SessionState::Initializing,
            resolver: GeometryResolver::from_config(&config.overlay),
            smoother: TemporalSmoother::new(SmoothingFactors::from(&config.overlay)),
            compositor: Compositor::from_config(&config.overlay),
            catalog,
            selected_style: default_style,
            sprite: None,
            sprite_error: None,
            loader: SpriteLoader::new(),
        };
        session.select_style(default_style)?;
        Ok(session)
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, SessionState::Ready { .. })
    }

    /// Camera and tracker are up.
    pub fn mark_ready(&mut self) {
        if self.state == SessionState::Initializing {
            tracing::info!("try-on session ready");
            self.state = SessionState::Ready {
                face_detected: false,
            };
        }
    }

    /// Camera or tracker failed to start. Terminal; there is no retry.
    pub fn fail(&mut self, reason: impl fmt::Display) {
        if self.state == SessionState::Initializing {
            tracing::error!("try-on session failed to start: {}", reason);
            self.state = SessionState::Failed(reason.to_string());
        }
    }

    pub fn stop(&mut self) {
        if self.state != SessionState::Stopped {
            tracing::info!("try-on session stopped");
            self.state = SessionState::Stopped;
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn selected_style(&self) -> u32 {
        self.selected_style
    }

    /// Swap to another catalog style. The previous sprite keeps being drawn
    /// until the new one has loaded; placement smoothing is left untouched.
    pub fn select_style(&mut self, id: u32) -> Result<()> {
        let entry = self.catalog.get(id)?;
        let path = self.catalog.image_path(entry);
        tracing::info!("selected style {} ({})", entry.id, entry.name);

        self.selected_style = id;
        self.sprite_error = None;
        self.loader.request(id, path);
        Ok(())
    }

    /// Use an already decoded sprite for `style`.
    pub fn select_sprite(&mut self, style: u32, sprite: Sprite) {
        self.selected_style = style;
        self.sprite_error = None;
        self.loader.resolve_now(style, Ok(Arc::new(sprite)));
    }

    /// Block until the pending sprite load completes.
    pub fn wait_for_sprite(&mut self) {
        if let Some(load) = self.loader.wait() {
            self.apply_sprite_load(load);
        }
    }

    pub fn sprite(&self) -> Option<&Sprite> {
        self.sprite.as_deref()
    }

    pub fn sprite_error(&self) -> Option<&str> {
        self.sprite_error.as_deref()
    }

    /// Placement retained from the last processed face.
    pub fn smoothed_geometry(&self) -> FrameGeometry {
        self.smoother.current()
    }

    pub fn notices(&self) -> Vec<Notice> {
        let mut notices = Vec::new();
        match &self.state {
            SessionState::Initializing => notices.push(Notice::Loading),
            SessionState::Failed(reason) => notices.push(Notice::InitFailed(reason.clone())),
            _ => {}
        }
        if let Some(err) = &self.sprite_error {
            notices.push(Notice::SpriteFailed(err.clone()));
        }
        if notices.is_empty() && self.state == (SessionState::Ready { face_detected: false }) {
            notices.push(Notice::NoFace);
        }
        notices
    }

    /// Handle one tracker result: resolve, smooth and draw.
    ///
    /// Nothing is drawn while the session is not ready, the surface is not
    /// mounted, or the first sprite is still loading. A failed sprite leaves
    /// the camera feed on its own.
    pub fn on_frame<S: Surface + ?Sized>(
        &mut self,
        surface: &mut S,
        frame: &DynamicImage,
        landmarks: Option<&FaceLandmarks>,
    ) -> FrameOutcome {
        self.poll_sprite();

        if !self.is_ready() || !surface.is_mounted() {
            return FrameOutcome::Skipped;
        }
        if self.sprite.is_none() && self.sprite_error.is_none() {
            return FrameOutcome::Skipped;
        }

        let (width, height) = surface.dimensions();
        let anchors = landmarks.and_then(|face| match face.anchors(width, height) {
            Ok(anchors) => Some(anchors),
            Err(e) => {
                tracing::warn!("ignoring tracker output: {}", e);
                None
            }
        });

        self.state = SessionState::Ready {
            face_detected: anchors.is_some(),
        };

        let overlay = match (anchors, self.sprite.as_deref()) {
            (Some(anchors), Some(sprite)) => {
                let target = self.resolver.resolve(&anchors, sprite.width());
                let geometry = self.smoother.smooth(&target);
                Some(Overlay {
                    sprite,
                    geometry,
                    anchors,
                })
            }
            _ => None,
        };

        self.compositor.render(surface, frame, overlay)
    }

    fn poll_sprite(&mut self) {
        if let Some(load) = self.loader.poll() {
            self.apply_sprite_load(load);
        }
    }

    fn apply_sprite_load(&mut self, load: SpriteLoad) {
        match load.result {
            Ok(sprite) => {
                tracing::debug!(
                    "sprite for style {} ready ({}x{})",
                    load.style,
                    sprite.width(),
                    sprite.height()
                );
                self.sprite = Some(sprite);
                self.sprite_error = None;
            }
            Err(e) => {
                tracing::warn!("{}", e);
                self.sprite = None;
                self.sprite_error = Some(e.to_string());
            }
        }
    }
}

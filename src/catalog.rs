//! Eyewear style catalog and sprite loading.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::config::CatalogConfig;
use crate::error::{Result, TryOnError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: u32,
    pub name: String,
    pub image: PathBuf,
}

impl CatalogEntry {
    pub fn new(id: u32, name: &str, image: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            image: PathBuf::from(image),
        }
    }
}

pub fn default_styles() -> Vec<CatalogEntry> {
    vec![
        CatalogEntry::new(1, "Sun Glasses", "glasses/sun-glasses.png"),
        CatalogEntry::new(2, "Transparent", "glasses/transparent-glasses.png"),
        CatalogEntry::new(3, "Study", "glasses/study-glasses.png"),
        CatalogEntry::new(4, "Fashion", "glasses/fashion-glasses.png"),
        CatalogEntry::new(5, "Eye Glasses", "glasses/eye-glasses.png"),
        CatalogEntry::new(6, "Heart", "glasses/heart-glasses.png"),
    ]
}

#[derive(Debug, Clone)]
pub struct Catalog {
    asset_dir: PathBuf,
    default_style: u32,
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn new(asset_dir: impl Into<PathBuf>, default_style: u32, entries: Vec<CatalogEntry>) -> Self {
        Self {
            asset_dir: asset_dir.into(),
            default_style,
            entries,
        }
    }

    pub fn from_config(config: &CatalogConfig) -> Self {
        Self::new(
            config.asset_dir.clone(),
            config.default_style,
            config.styles.clone(),
        )
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn get(&self, id: u32) -> Result<&CatalogEntry> {
        self.entries
            .iter()
            .find(|e| e.id == id)
            .ok_or(TryOnError::UnknownStyle(id))
    }

    pub fn default_entry(&self) -> Result<&CatalogEntry> {
        self.get(self.default_style)
    }

    pub fn image_path(&self, entry: &CatalogEntry) -> PathBuf {
        if entry.image.is_absolute() {
            entry.image.clone()
        } else {
            self.asset_dir.join(&entry.image)
        }
    }
}

/// A decoded eyewear image.
#[derive(Debug, Clone)]
pub struct Sprite {
    image: RgbaImage,
}

impl Sprite {
    pub fn new(image: RgbaImage) -> Self {
        Self { image }
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let image = image::open(path).map_err(|e| TryOnError::Sprite {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(Self::new(image.to_rgba8()))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }
}

/// Result of a background sprite decode, tagged with the request it answers.
pub struct SpriteLoad {
    pub generation: u64,
    pub style: u32,
    pub result: Result<Arc<Sprite>>,
}

/// Decodes sprites off the frame loop. Only the most recent request is
/// reported; completions of superseded requests are dropped.
pub struct SpriteLoader {
    generation: u64,
    pending: Option<Receiver<SpriteLoad>>,
}

impl SpriteLoader {
    pub fn new() -> Self {
        Self {
            generation: 0,
            pending: None,
        }
    }

    pub fn request(&mut self, style: u32, path: PathBuf) {
        self.generation += 1;
        let generation = self.generation;
        let (tx, rx) = mpsc::channel();

        tracing::debug!("loading sprite for style {} from {}", style, path.display());
        std::thread::spawn(move || {
            let result = Sprite::open(&path).map(Arc::new);
            // receiver is gone when a newer request replaced this one
            let _ = tx.send(SpriteLoad {
                generation,
                style,
                result,
            });
        });

        self.pending = Some(rx);
    }

    /// Hand over a request that was resolved without a thread, e.g. a sprite
    /// already in memory.
    pub fn resolve_now(&mut self, style: u32, result: Result<Arc<Sprite>>) {
        self.generation += 1;
        let (tx, rx) = mpsc::channel();
        let _ = tx.send(SpriteLoad {
            generation: self.generation,
            style,
            result,
        });
        self.pending = Some(rx);
    }

    // register a request whose completion is sent by the caller
    #[cfg(test)]
    pub(crate) fn request_deferred(&mut self, style: u32) -> (u64, mpsc::Sender<SpriteLoad>) {
        self.generation += 1;
        let (tx, rx) = mpsc::channel();
        tracing::debug!("deferred sprite request for style {}", style);
        self.pending = Some(rx);
        (self.generation, tx)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Non-blocking check for the current request.
    pub fn poll(&mut self) -> Option<SpriteLoad> {
        let rx = self.pending.as_ref()?;
        match rx.try_recv() {
            Ok(load) if load.generation == self.generation => {
                self.pending = None;
                Some(load)
            }
            Ok(_) => None,
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.pending = None;
                Some(SpriteLoad {
                    generation: self.generation,
                    style: 0,
                    result: Err(TryOnError::Sprite {
                        path: String::new(),
                        message: "loader thread exited".to_string(),
                    }),
                })
            }
        }
    }

    /// Block until the current request completes. Used by headless runs.
    pub fn wait(&mut self) -> Option<SpriteLoad> {
        let rx = self.pending.take()?;
        match rx.recv() {
            Ok(load) => Some(load),
            Err(_) => None,
        }
    }
}

impl Default for SpriteLoader {
    fn default() -> Self {
        Self::new()
    }
}

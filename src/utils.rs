use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use image::RgbaImage;

use crate::catalog::CatalogEntry;
use crate::session::{Notice, SessionState};

// make SharedState an alias for a Mutex protected struct State
pub type SharedState = Arc<Mutex<State>>;

// what the pipeline worker publishes for the viewer
pub struct State {
    pub session: SessionState,
    pub notices: Vec<Notice>,
    pub styles: Vec<CatalogEntry>,
    pub selected_style: u32,

    pub image: Option<RgbaImage>,
    pub frame_id: u64,
    pub fps: Option<f32>,
    pub resolution: Option<(u32, u32)>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            session: SessionState::Initializing,
            notices: vec![Notice::Loading],
            styles: Vec::new(),
            selected_style: 0,

            image: None,
            frame_id: 0,
            fps: None,
            resolution: None,
        }
    }
}

/// Locks the shared state, recovering the data if a thread panicked while
/// holding the lock.
pub fn lock_state(state: &SharedState) -> MutexGuard<'_, State> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Frame rate over the last few frames.
#[derive(Debug, Clone)]
pub struct FpsCounter {
    intervals: VecDeque<f32>,
    last_frame: Option<Instant>,
    max_length: usize,
}

impl FpsCounter {
    pub fn new(max_length: usize) -> Self {
        Self {
            intervals: VecDeque::with_capacity(max_length),
            last_frame: None,
            max_length: max_length.max(1),
        }
    }

    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    pub fn tick_at(&mut self, now: Instant) {
        if let Some(last) = self.last_frame {
            self.intervals.push_back(now.duration_since(last).as_secs_f32());
            if self.intervals.len() > self.max_length {
                self.intervals.pop_front();
            }
        }
        self.last_frame = Some(now);
    }

    pub fn fps(&self) -> Option<f32> {
        if self.intervals.is_empty() {
            return None;
        }
        let mean = self.intervals.iter().sum::<f32>() / self.intervals.len() as f32;
        (mean > 0.0).then(|| 1.0 / mean)
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new(10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::time::Duration;

    #[test]
    fn fps_needs_two_frames() {
        let mut fps = FpsCounter::default();
        assert_eq!(fps.fps(), None);
        fps.tick_at(Instant::now());
        assert_eq!(fps.fps(), None);
    }

    #[test]
    fn fps_averages_recent_intervals() {
        let mut fps = FpsCounter::new(3);
        let start = Instant::now();
        // one slow frame that falls out of the window
        fps.tick_at(start);
        fps.tick_at(start + Duration::from_millis(500));
        for i in 1..=3 {
            fps.tick_at(start + Duration::from_millis(500 + 40 * i));
        }
        assert_relative_eq!(fps.fps().unwrap(), 25.0, epsilon = 1e-2);
    }
}

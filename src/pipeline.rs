//! Wires a frame source and a landmark source to a try-on session, and runs
//! that loop on a worker thread for the viewer.

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::JoinHandle;

use crate::compositor::{FrameOutcome, RasterSurface};
use crate::config::Config;
use crate::error::Result;
use crate::face_landmarks::{LandmarkSource, RecordedLandmarks};
use crate::frame_source::{FrameSource, ImageSequenceSource};
use crate::session::TryOnSession;
use crate::utils::{lock_state, FpsCounter, SharedState};

/// Where camera frames come from. Resolved into a [`FrameSource`] on the
/// thread that will read it.
#[derive(Debug, Clone)]
pub enum FrameInput {
    Stills { dir: PathBuf, fps: Option<u32> },
    #[cfg(feature = "camera")]
    Webcam(crate::config::CameraConfig),
}

impl FrameInput {
    pub fn open(self) -> Box<dyn FrameSource> {
        match self {
            FrameInput::Stills { dir, fps } => {
                let source = ImageSequenceSource::new(dir);
                Box::new(match fps {
                    Some(fps) => source.with_frame_rate(fps),
                    None => source,
                })
            }
            #[cfg(feature = "camera")]
            FrameInput::Webcam(config) => Box::new(crate::webcam::WebcamSource::new(config)),
        }
    }
}

/// Where face landmarks come from.
#[derive(Debug, Clone)]
pub enum LandmarkInput {
    Recorded(PathBuf),
    #[cfg(feature = "onnx")]
    FaceMesh(crate::config::TrackerConfig),
}

impl LandmarkInput {
    pub fn open(self) -> Box<dyn LandmarkSource> {
        match self {
            LandmarkInput::Recorded(path) => Box::new(RecordedLandmarks::open(path)),
            #[cfg(feature = "onnx")]
            LandmarkInput::FaceMesh(config) => {
                Box::new(crate::face_landmarks::OnnxFaceTracker::new(config))
            }
        }
    }
}

pub struct Pipeline {
    source: Box<dyn FrameSource>,
    tracker: Box<dyn LandmarkSource>,
    session: TryOnSession,
    surface: RasterSurface,
    fps: FpsCounter,
}

impl Pipeline {
    pub fn new(
        source: Box<dyn FrameSource>,
        tracker: Box<dyn LandmarkSource>,
        session: TryOnSession,
        surface: RasterSurface,
    ) -> Self {
        Self {
            source,
            tracker,
            session,
            surface,
            fps: FpsCounter::default(),
        }
    }

    pub fn from_config(config: &Config, frames: FrameInput, landmarks: LandmarkInput) -> Result<Self> {
        Ok(Self::new(
            frames.open(),
            landmarks.open(),
            TryOnSession::new(config)?,
            RasterSurface::new(config.surface.width, config.surface.height),
        ))
    }

    /// Bring up the frame source and the tracker. On failure the session
    /// moves to `Failed` and the startup error is returned.
    pub fn start(&mut self) -> Result<()> {
        let started = self.source.start().and_then(|()| self.tracker.start());
        match started {
            Ok(()) => {
                self.session.mark_ready();
                Ok(())
            }
            Err(e) => {
                self.source.stop();
                self.session.fail(&e);
                Err(e)
            }
        }
    }

    /// Process the next camera frame. `Ok(None)` once the source is done.
    pub fn step(&mut self) -> Result<Option<FrameOutcome>> {
        if !self.session.is_ready() {
            return Ok(None);
        }
        let Some(frame) = self.source.next_frame()? else {
            return Ok(None);
        };

        // a tracker error on one frame is treated as no face on that frame
        let landmarks = match self.tracker.process(&frame) {
            Ok(landmarks) => landmarks,
            Err(e) => {
                tracing::warn!("face tracking failed: {}", e);
                None
            }
        };

        let outcome = self
            .session
            .on_frame(&mut self.surface, &frame, landmarks.as_ref());
        self.fps.tick();
        Ok(Some(outcome))
    }

    pub fn select_style(&mut self, id: u32) -> Result<()> {
        self.session.select_style(id)
    }

    pub fn stop(&mut self) {
        self.source.stop();
        self.session.stop();
    }

    pub fn session(&self) -> &TryOnSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut TryOnSession {
        &mut self.session
    }

    pub fn surface(&self) -> &RasterSurface {
        &self.surface
    }

    pub fn fps(&self) -> Option<f32> {
        self.fps.fps()
    }

    /// Copy session status, and the surface if it was redrawn, into `state`.
    fn publish(&self, state: &SharedState, redrawn: bool) {
        let mut state = lock_state(state);
        state.session = self.session.state().clone();
        state.notices = self.session.notices();
        state.styles = self.session.catalog().entries().to_vec();
        state.selected_style = self.session.selected_style();
        state.fps = self.fps();
        if redrawn {
            let image = self.surface.image();
            state.resolution = Some(image.dimensions());
            state.image = Some(image.clone());
            state.frame_id += 1;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SelectStyle(u32),
    Stop,
}

/// Handle to the pipeline thread. Dropping it stops the thread.
pub struct WorkerHandle {
    commands: Sender<Command>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::debug!("worker already exited, dropping {:?}", command);
        }
    }

    pub fn stop(&mut self) {
        self.send(Command::Stop);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("pipeline worker panicked");
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Build the pipeline with `build` on a new thread and run it until stopped.
/// Camera handles are not `Send`, so the pipeline never leaves that thread.
pub fn spawn_worker<F>(build: F, state: SharedState) -> Result<WorkerHandle>
where
    F: FnOnce() -> Result<Pipeline> + Send + 'static,
{
    let (commands, inbox) = mpsc::channel();
    let thread = std::thread::Builder::new()
        .name("tryon-pipeline".to_string())
        .spawn(move || worker_thread(build, inbox, state))?;

    Ok(WorkerHandle {
        commands,
        thread: Some(thread),
    })
}

fn worker_thread<F>(build: F, inbox: Receiver<Command>, state: SharedState)
where
    F: FnOnce() -> Result<Pipeline>,
{
    let mut pipeline = match build() {
        Ok(pipeline) => pipeline,
        Err(e) => {
            tracing::error!("failed to set up the try-on pipeline: {}", e);
            let mut state = lock_state(&state);
            state.session = crate::session::SessionState::Failed(e.to_string());
            state.notices = vec![crate::session::Notice::InitFailed(e.to_string())];
            return;
        }
    };
    pipeline.publish(&state, false);

    if pipeline.start().is_err() {
        pipeline.publish(&state, false);
        // keep the failure on screen until the viewer closes
        while let Ok(command) = inbox.recv() {
            if command == Command::Stop {
                break;
            }
        }
        pipeline.stop();
        return;
    }

    loop {
        match inbox.try_recv() {
            Ok(Command::SelectStyle(id)) => {
                if let Err(e) = pipeline.select_style(id) {
                    tracing::warn!("{}", e);
                }
            }
            Ok(Command::Stop) | Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {}
        }

        match pipeline.step() {
            Ok(Some(outcome)) => pipeline.publish(&state, outcome != FrameOutcome::Skipped),
            Ok(None) => {
                tracing::info!("frame source exhausted");
                pipeline.publish(&state, false);
                // idle until the viewer closes, keeping the last frame visible
                while let Ok(command) = inbox.recv() {
                    if command == Command::Stop {
                        break;
                    }
                }
                break;
            }
            Err(e) => {
                tracing::warn!("failed to read frame: {}", e);
                std::thread::sleep(std::time::Duration::from_millis(10));
            }
        }
    }

    pipeline.stop();
    pipeline.publish(&state, false);
}

/// Run without a viewer, writing each drawn surface to
/// `out_dir/frame_NNNNNN.png`. Returns the number of images written.
pub fn run_headless(pipeline: &mut Pipeline, out_dir: &std::path::Path) -> Result<usize> {
    std::fs::create_dir_all(out_dir)?;
    pipeline.session_mut().wait_for_sprite();

    pipeline.start()?;
    if let Some(error) = pipeline.session().sprite_error() {
        tracing::warn!("continuing without eyewear: {}", error);
    }

    let mut frame_index = 0usize;
    let mut written = 0usize;
    while let Some(outcome) = pipeline.step()? {
        if outcome != FrameOutcome::Skipped {
            let path = out_dir.join(format!("frame_{:06}.png", frame_index));
            pipeline.surface().image().save(&path)?;
            written += 1;
        }
        frame_index += 1;
    }
    pipeline.stop();

    tracing::info!(
        "wrote {} of {} frames to {}",
        written,
        frame_index,
        out_dir.display()
    );
    Ok(written)
}

use crate::cancel::CancellationSignal;
use crate::capture::CaptureHandle;
use crate::connector::SourceConnector;
use crate::error::SessionError;
use crate::output::{frame_filename, FrameSink};
use crate::preview::{window_position, Preview, WINDOWS_PER_ROW};
use crate::reporter::FailureNotifier;
use crate::source::SourceConfig;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const STATS_EVERY: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Streaming,
    Failed,
    Stopped,
}

impl SessionState {
    pub fn is_live(self) -> bool {
        matches!(self, SessionState::Connecting | SessionState::Streaming)
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Connecting,
            1 => SessionState::Streaming,
            2 => SessionState::Failed,
            _ => SessionState::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            SessionState::Connecting => 0,
            SessionState::Streaming => 1,
            SessionState::Failed => 2,
            SessionState::Stopped => 3,
        }
    }
}

/// Live view of a running session, readable from any thread.
#[derive(Debug)]
pub struct SessionStatus {
    state: AtomicU8,
    frames_emitted: AtomicU64,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            state: AtomicU8::new(SessionState::Connecting.as_u8()),
            frames_emitted: AtomicU64::new(0),
        }
    }
}

impl SessionStatus {
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted.load(Ordering::Relaxed)
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub source_id: usize,
    pub state: SessionState,
    pub frames_emitted: u64,
    pub achieved_fps: f64,
}

/// Sleeps needed to hold a target frame rate without drifting.
///
/// The pause after the n-th frame is whatever is left until `n / fps` seconds
/// after the start of streaming, so time lost to slow reads or oversleeping is
/// made up on later frames instead of accumulating.
#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    target_fps: u32,
}

impl Pacer {
    pub fn new(target_fps: u32) -> Self {
        Self { target_fps }
    }

    pub fn interval(&self) -> Option<Duration> {
        (self.target_fps > 0).then(|| Duration::from_secs_f64(1.0 / self.target_fps as f64))
    }

    pub fn pause(&self, frames_emitted: u64, elapsed: Duration) -> Duration {
        if self.target_fps == 0 {
            return Duration::ZERO;
        }
        let due = Duration::from_secs_f64(frames_emitted as f64 / self.target_fps as f64);
        due.saturating_sub(elapsed)
    }
}

/// Frames per second actually achieved; 0 before any time has passed.
pub fn achieved_fps(frames_emitted: u64, elapsed: Duration) -> f64 {
    let seconds = elapsed.as_secs_f64();
    if seconds > 0.0 {
        frames_emitted as f64 / seconds
    } else {
        0.0
    }
}

/// One camera's connect-then-stream worker.
pub struct CaptureSession {
    config: SourceConfig,
    connector: SourceConnector,
    connect_timeout: Duration,
    sink: Arc<dyn FrameSink>,
    preview: Arc<dyn Preview>,
    failures: FailureNotifier,
    cancel: CancellationSignal,
    status: Arc<SessionStatus>,
}

impl CaptureSession {
    pub fn new(
        config: SourceConfig,
        connector: SourceConnector,
        connect_timeout: Duration,
        sink: Arc<dyn FrameSink>,
        preview: Arc<dyn Preview>,
        failures: FailureNotifier,
        cancel: CancellationSignal,
    ) -> Self {
        Self {
            config,
            connector,
            connect_timeout,
            sink,
            preview,
            failures,
            cancel,
            status: Arc::new(SessionStatus::default()),
        }
    }

    pub fn status(&self) -> Arc<SessionStatus> {
        self.status.clone()
    }

    /// Connect, then stream until cancelled or the source stops delivering.
    pub fn run(self) -> SessionReport {
        let camera = self.config.id + 1;
        self.status.set_state(SessionState::Connecting);
        tracing::info!(camera, "Connecting to {}", self.config.address);

        let mut handle = match self.connector.connect(&self.config, self.connect_timeout) {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(camera, "{}", e);
                self.status.set_state(SessionState::Failed);
                self.failures.push(self.config.id);
                return self.report(0.0);
            }
        };

        tracing::info!(camera, "Connected to camera {}", camera);
        self.status.set_state(SessionState::Streaming);

        let achieved = match self.stream(handle.as_mut()) {
            Ok(achieved) => achieved,
            Err((achieved, e)) => {
                tracing::warn!(camera, "{:#}", anyhow::Error::new(e));
                achieved
            }
        };

        handle.release();
        self.preview.close(&self.config.label());
        self.status.set_state(SessionState::Stopped);
        tracing::info!(
            camera,
            frames = self.status.frames_emitted(),
            "Camera {} stopped at {:.1} fps",
            camera,
            achieved
        );
        self.report(achieved)
    }

    fn report(&self, achieved_fps: f64) -> SessionReport {
        SessionReport {
            source_id: self.config.id,
            state: self.status.state(),
            frames_emitted: self.status.frames_emitted(),
            achieved_fps,
        }
    }

    /// Streaming loop. Returns the achieved frame rate, together with the
    /// error when the source stopped delivering.
    fn stream(&self, handle: &mut dyn CaptureHandle) -> Result<f64, (f64, SessionError)> {
        let camera = self.config.id + 1;
        let label = self.config.label();
        let position = window_position(self.config.id, WINDOWS_PER_ROW);
        let folder = self.config.output_folder.as_path();
        let pacer = Pacer::new(self.config.target_fps);

        if let Err(cause) = self.sink.prepare(folder) {
            return Err((
                0.0,
                SessionError::OutputUnavailable {
                    source_id: self.config.id,
                    cause,
                },
            ));
        }

        let mut frames_emitted = 0u64;
        let start = Instant::now();

        while !self.cancel.is_cancelled() {
            let frame = match handle.read() {
                Ok(frame) => frame,
                Err(cause) => {
                    let achieved = achieved_fps(frames_emitted, start.elapsed());
                    return Err((
                        achieved,
                        SessionError::StreamEnded {
                            source_id: self.config.id,
                            cause,
                        },
                    ));
                }
            };

            let filename = frame_filename(self.config.run_iteration, frames_emitted);
            if let Err(e) = self.sink.save(folder, &filename, &frame) {
                tracing::warn!(camera, "{:#}", e);
            }
            frames_emitted += 1;
            self.status.frames_emitted.store(frames_emitted, Ordering::Relaxed);

            let fps = achieved_fps(frames_emitted, start.elapsed());
            self.preview.show(&label, position, &frame, Some(fps));

            if frames_emitted % STATS_EVERY == 0 {
                tracing::debug!(camera, frames = frames_emitted, "fps={:.1}", fps);
            }

            let pause = pacer.pause(frames_emitted, start.elapsed());
            if !pause.is_zero() {
                thread::sleep(pause);
            }
        }

        Ok(achieved_fps(frames_emitted, start.elapsed()))
    }
}

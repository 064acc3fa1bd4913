use crate::cancel::{CancellationSignal, ShutdownTrigger};
use crate::capture::CaptureBackend;
use crate::connector::{SourceConnector, DEFAULT_CONNECT_TIMEOUT};
use crate::decision::{Decision, FailureDecider};
use crate::error::{Result, SupervisorError};
use crate::output::FrameSink;
use crate::preview::{placeholder_frame, window_position, Preview, WINDOWS_PER_ROW};
use crate::reporter::FailureReporter;
use crate::session::{CaptureSession, SessionReport, SessionStatus};
use crate::source::{window_label, SourceConfig};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_USB_STAGGER: Duration = Duration::from_secs(10);
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(15);

const JOIN_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Time each source gets to deliver its first frame
    pub connect_timeout: Duration,
    /// How often the monitor loop looks at the failure queue
    pub poll_interval: Duration,
    /// Delay between launching network cameras and local (USB) ones
    pub usb_stagger: Duration,
    /// Upper bound on waiting for workers at shutdown. `None` waits forever.
    pub join_timeout: Option<Duration>,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            usb_stagger: DEFAULT_USB_STAGGER,
            join_timeout: Some(DEFAULT_JOIN_TIMEOUT),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Someone asked for a clean shutdown
    ShutdownRequested,
    /// The operator chose to abort after this camera failed to connect
    SourceFailure { source_id: usize },
    /// Orchestration itself went wrong
    InternalError,
}

#[derive(Debug)]
pub struct RunSummary {
    pub exit_reason: ExitReason,
    /// One report per session that was launched, ordered by camera id
    pub sessions: Vec<SessionReport>,
    /// Camera ids taken from the failure queue, in the order they were handled
    pub failures: Vec<usize>,
}

struct SessionWorker {
    source_id: usize,
    status: Arc<SessionStatus>,
    handle: JoinHandle<SessionReport>,
}

struct PresenterWorker {
    source_id: usize,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct RunState {
    sessions: Vec<SessionWorker>,
    presenters: Vec<PresenterWorker>,
    failures: Vec<usize>,
}

/// Runs one capture session per camera and decides what happens when one of
/// them cannot connect.
pub struct Supervisor {
    options: SupervisorOptions,
    connector: SourceConnector,
    sink: Arc<dyn FrameSink>,
    preview: Arc<dyn Preview>,
    decider: Box<dyn FailureDecider>,
    cancel: CancellationSignal,
    reporter: FailureReporter,
}

impl Supervisor {
    pub fn new(
        options: SupervisorOptions,
        backend: Arc<dyn CaptureBackend>,
        sink: Arc<dyn FrameSink>,
        preview: Arc<dyn Preview>,
        decider: Box<dyn FailureDecider>,
    ) -> Self {
        Self {
            options,
            connector: SourceConnector::new(backend),
            sink,
            preview,
            decider,
            cancel: CancellationSignal::new(),
            reporter: FailureReporter::new(),
        }
    }

    /// Replace the connector, e.g. to change the probe interval.
    pub fn with_connector(mut self, connector: SourceConnector) -> Self {
        self.connector = connector;
        self
    }

    /// Handle for outside shutdown sources. Triggering it is the same as the
    /// monitor deciding to stop, minus the failure attribution.
    pub fn shutdown_trigger(&self) -> ShutdownTrigger {
        ShutdownTrigger::new(self.cancel.clone())
    }

    /// Launch every camera, supervise until shutdown, then wait for all workers.
    pub fn run(&mut self, configs: Vec<SourceConfig>) -> RunSummary {
        let mut state = RunState::default();

        let outcome =
            panic::catch_unwind(AssertUnwindSafe(|| self.orchestrate(configs, &mut state)));
        let exit_reason = match outcome {
            Ok(Ok(reason)) => reason,
            Ok(Err(e)) => {
                error!("{:#}", anyhow::Error::new(e));
                ExitReason::InternalError
            }
            Err(payload) => {
                error!("Supervisor panicked: {}", panic_message(payload.as_ref()));
                ExitReason::InternalError
            }
        };

        self.cancel.cancel();
        info!(
            "Waiting for {} camera workers to stop",
            state.sessions.len() + state.presenters.len()
        );
        let sessions = self.join(state.sessions, state.presenters);

        RunSummary {
            exit_reason,
            sessions,
            failures: state.failures,
        }
    }

    fn orchestrate(
        &mut self,
        configs: Vec<SourceConfig>,
        state: &mut RunState,
    ) -> Result<ExitReason> {
        if configs.is_empty() {
            return Err(SupervisorError::Internal("no cameras configured".to_string()));
        }
        info!(
            run = configs[0].run_iteration,
            "Starting {} camera sessions",
            configs.len()
        );

        let (network, mut delayed): (Vec<_>, Vec<_>) =
            configs.into_iter().partition(|config| !config.address.is_local());

        let launch_local_at = if network.is_empty() {
            Instant::now()
        } else {
            Instant::now() + self.options.usb_stagger
        };
        for config in network {
            self.launch(config, state);
        }

        loop {
            if self.cancel.is_cancelled() {
                for config in delayed.drain(..) {
                    info!(
                        camera = config.id + 1,
                        "Shutdown before launch, skipping {}",
                        config.label()
                    );
                }
                return Ok(ExitReason::ShutdownRequested);
            }

            if !delayed.is_empty() && Instant::now() >= launch_local_at {
                for config in delayed.drain(..) {
                    self.launch(config, state);
                }
            }

            for source_id in self.reporter.drain() {
                state.failures.push(source_id);
                let camera = source_id + 1;
                let decision = self
                    .decider
                    .decide(source_id)
                    .map_err(|cause| SupervisorError::Decision { source_id, cause })?;

                // Shutdown requested while the decider was blocked takes precedence.
                if self.cancel.is_cancelled() {
                    info!(camera, "Shutdown requested during the decision, ignoring it");
                    return Ok(ExitReason::ShutdownRequested);
                }

                match decision {
                    Decision::Abort => {
                        info!(camera, "Stopping the run because camera {} failed", camera);
                        self.cancel.cancel();
                        return Ok(ExitReason::SourceFailure { source_id });
                    }
                    Decision::Continue => {
                        info!(camera, "Continuing without camera {}", camera);
                        self.spawn_presenter(source_id, state);
                    }
                }
            }

            thread::sleep(self.options.poll_interval);
        }
    }

    /// Start a session thread. A failure here is logged and only costs this camera.
    fn launch(&self, config: SourceConfig, state: &mut RunState) {
        let source_id = config.id;
        let label = config.label();
        let session = CaptureSession::new(
            config,
            self.connector.clone(),
            self.options.connect_timeout,
            self.sink.clone(),
            self.preview.clone(),
            self.reporter.notifier(),
            self.cancel.clone(),
        );
        let status = session.status();

        match thread::Builder::new()
            .name(format!("camera-{}", source_id + 1))
            .spawn(move || session.run())
        {
            Ok(handle) => {
                debug!(camera = source_id + 1, "Launched session");
                state.sessions.push(SessionWorker {
                    source_id,
                    status,
                    handle,
                });
            }
            Err(cause) => {
                let err = SupervisorError::LaunchFailed { label, cause };
                error!(camera = source_id + 1, "{:#}", anyhow::Error::new(err));
            }
        }
    }

    fn spawn_presenter(&self, source_id: usize, state: &mut RunState) {
        let preview = self.preview.clone();
        let cancel = self.cancel.clone();
        let refresh = self.options.poll_interval;
        let label = window_label(source_id);

        match thread::Builder::new()
            .name(format!("placeholder-{}", source_id + 1))
            .spawn(move || present_placeholder(source_id, preview, cancel, refresh))
        {
            Ok(handle) => state.presenters.push(PresenterWorker { source_id, handle }),
            Err(cause) => {
                let err = SupervisorError::LaunchFailed { label, cause };
                error!(camera = source_id + 1, "{:#}", anyhow::Error::new(err));
            }
        }
    }

    fn join(
        &self,
        sessions: Vec<SessionWorker>,
        presenters: Vec<PresenterWorker>,
    ) -> Vec<SessionReport> {
        let deadline = self.options.join_timeout.map(|timeout| Instant::now() + timeout);
        let mut reports = Vec::with_capacity(sessions.len());

        for worker in sessions {
            let camera = worker.source_id + 1;
            match wait_for(worker.handle, deadline) {
                Some(Ok(report)) => reports.push(report),
                Some(Err(payload)) => {
                    error!(camera, "Session panicked: {}", panic_message(payload.as_ref()));
                    reports.push(abandoned_report(worker.source_id, &worker.status));
                }
                None => {
                    warn!(camera, "Session did not stop in time, abandoning it");
                    reports.push(abandoned_report(worker.source_id, &worker.status));
                }
            }
        }

        for worker in presenters {
            let camera = worker.source_id + 1;
            match wait_for(worker.handle, deadline) {
                Some(Ok(())) => {}
                Some(Err(payload)) => {
                    error!(camera, "Placeholder panicked: {}", panic_message(payload.as_ref()))
                }
                None => warn!(camera, "Placeholder did not stop in time, abandoning it"),
            }
        }

        reports.sort_by_key(|report| report.source_id);
        reports
    }
}

/// Shows the "ERROR" frame in a failed camera's window until the run is cancelled.
fn present_placeholder(
    source_id: usize,
    preview: Arc<dyn Preview>,
    cancel: CancellationSignal,
    refresh: Duration,
) {
    let frame = placeholder_frame();
    let label = window_label(source_id);
    let position = window_position(source_id, WINDOWS_PER_ROW);

    while !cancel.is_cancelled() {
        preview.show(&label, position, &frame, None);
        thread::sleep(refresh);
    }
    preview.close(&label);
}

/// Join `handle`, giving up at `deadline`. Returns `None` when it gave up.
fn wait_for<T>(handle: JoinHandle<T>, deadline: Option<Instant>) -> Option<thread::Result<T>> {
    if let Some(deadline) = deadline {
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                return None;
            }
            thread::sleep(JOIN_POLL);
        }
    }
    Some(handle.join())
}

fn abandoned_report(source_id: usize, status: &SessionStatus) -> SessionReport {
    SessionReport {
        source_id,
        state: status.state(),
        frames_emitted: status.frames_emitted(),
        achieved_fps: 0.0,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

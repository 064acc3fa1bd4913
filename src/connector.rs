use crate::capture::{CaptureBackend, CaptureError, CaptureHandle};
use crate::error::ConnectError;
use crate::source::SourceConfig;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_millis(10);

/// Opens a source and proves it is alive before handing it to a session.
///
/// Many network camera drivers report a successful open even when the remote
/// end is unreachable, so a source only counts as connected once a frame has
/// actually been grabbed from it.
#[derive(Clone)]
pub struct SourceConnector {
    backend: Arc<dyn CaptureBackend>,
    probe_interval: Duration,
}

impl SourceConnector {
    pub fn new(backend: Arc<dyn CaptureBackend>) -> Self {
        Self {
            backend,
            probe_interval: DEFAULT_PROBE_INTERVAL,
        }
    }

    pub fn with_probe_interval(mut self, probe_interval: Duration) -> Self {
        self.probe_interval = probe_interval;
        self
    }

    /// Open `config.address`, apply capture settings and wait up to `timeout`
    /// for the first frame.
    ///
    /// On every error path the handle, if one was opened, has been released
    /// before this returns.
    pub fn connect(
        &self,
        config: &SourceConfig,
        timeout: Duration,
    ) -> Result<Box<dyn CaptureHandle>, ConnectError> {
        let source_id = config.id;
        let mut handle = self.backend.open(&config.address).map_err(|e| match e {
            CaptureError::Unavailable(reason) => ConnectError::OpenFailed { source_id, reason },
            CaptureError::Unsupported(what) => ConnectError::OpenFailed {
                source_id,
                reason: format!("no capture backend for {}", what),
            },
            CaptureError::Backend(cause) => ConnectError::ConnectionSetup { source_id, cause },
        })?;

        if let Err(e) = handle.set_buffer_size(1) {
            tracing::debug!(camera = source_id + 1, "Could not set buffer size: {:#}", e);
        }
        if let Err(e) = handle.set_resolution(config.frame_width, config.frame_height) {
            tracing::debug!(
                camera = source_id + 1,
                "Could not set resolution {}x{}: {:#}",
                config.frame_width,
                config.frame_height,
                e
            );
        }

        match self.probe(handle.as_mut(), timeout) {
            Ok(true) => Ok(handle),
            Ok(false) => {
                handle.release();
                Err(ConnectError::NoFrames { source_id, timeout })
            }
            Err(cause) => {
                handle.release();
                Err(ConnectError::ConnectionSetup { source_id, cause })
            }
        }
    }

    /// Grab until a frame shows up or `timeout` has passed.
    fn probe(&self, handle: &mut dyn CaptureHandle, timeout: Duration) -> anyhow::Result<bool> {
        let started = Instant::now();
        loop {
            if handle.grab()? {
                tracing::debug!("First frame after {:?}", started.elapsed());
                return Ok(true);
            }
            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Ok(false);
            }
            thread::sleep(self.probe_interval.min(timeout - elapsed));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::Frame;
    use crate::source::SourceAddress;
    use anyhow::{anyhow, Result};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Clone, Copy)]
    enum Probe {
        SucceedOn(usize),
        Never,
        FailOn(usize),
    }

    #[derive(Default)]
    struct Counters {
        grabs: AtomicUsize,
        releases: AtomicUsize,
        resolution: Mutex<Option<(u32, u32)>>,
        buffer_size: Mutex<Option<u32>>,
    }

    struct ScriptedBackend {
        probe: Probe,
        open_fails: bool,
        counters: Arc<Counters>,
    }

    struct ScriptedHandle {
        probe: Probe,
        counters: Arc<Counters>,
    }

    impl CaptureBackend for ScriptedBackend {
        fn open(
            &self,
            _address: &SourceAddress,
        ) -> std::result::Result<Box<dyn CaptureHandle>, CaptureError> {
            if self.open_fails {
                return Err(CaptureError::Unavailable("no such device".to_string()));
            }
            Ok(Box::new(ScriptedHandle {
                probe: self.probe,
                counters: self.counters.clone(),
            }))
        }
    }

    impl CaptureHandle for ScriptedHandle {
        fn set_buffer_size(&mut self, frames: u32) -> Result<()> {
            *self.counters.buffer_size.lock().unwrap() = Some(frames);
            Ok(())
        }

        fn set_resolution(&mut self, width: u32, height: u32) -> Result<()> {
            *self.counters.resolution.lock().unwrap() = Some((width, height));
            Err(anyhow!("resolution is fixed"))
        }

        fn grab(&mut self) -> Result<bool> {
            let attempt = self.counters.grabs.fetch_add(1, Ordering::SeqCst) + 1;
            match self.probe {
                Probe::SucceedOn(n) => Ok(attempt >= n),
                Probe::Never => Ok(false),
                Probe::FailOn(n) if attempt >= n => Err(anyhow!("driver crashed")),
                Probe::FailOn(_) => Ok(false),
            }
        }

        fn read(&mut self) -> Result<Frame> {
            Ok(Frame::new(4, 4))
        }

        fn release(self: Box<Self>) {
            self.counters.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn config() -> SourceConfig {
        SourceConfig {
            id: 1,
            address: SourceAddress::Uri("rtsp://camera.local/stream".to_string()),
            target_fps: 10,
            frame_width: 1280,
            frame_height: 720,
            output_folder: PathBuf::from("frames"),
            run_iteration: 1,
        }
    }

    fn connector(probe: Probe, open_fails: bool) -> (SourceConnector, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let backend = ScriptedBackend {
            probe,
            open_fails,
            counters: counters.clone(),
        };
        (SourceConnector::new(Arc::new(backend)), counters)
    }

    #[test]
    fn succeeds_on_third_probe() {
        let (connector, counters) = connector(Probe::SucceedOn(3), false);
        let started = Instant::now();
        let handle = connector
            .connect(&config(), Duration::from_secs(1))
            .expect("third probe should connect");
        let elapsed = started.elapsed();

        assert_eq!(counters.grabs.load(Ordering::SeqCst), 3);
        assert!(elapsed >= Duration::from_millis(20), "took {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(500), "took {:?}", elapsed);
        assert_eq!(counters.releases.load(Ordering::SeqCst), 0);
        assert_eq!(*counters.buffer_size.lock().unwrap(), Some(1));
        assert_eq!(*counters.resolution.lock().unwrap(), Some((1280, 720)));

        handle.release();
        assert_eq!(counters.releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn times_out_without_frames() {
        let (connector, counters) = connector(Probe::Never, false);
        let timeout = Duration::from_millis(50);
        let started = Instant::now();
        let err = connector.connect(&config(), timeout).err().unwrap();
        let elapsed = started.elapsed();

        assert!(matches!(err, ConnectError::NoFrames { source_id: 1, .. }));
        assert!(elapsed >= timeout, "returned early after {:?}", elapsed);
        assert!(elapsed < timeout + Duration::from_millis(200), "took {:?}", elapsed);
        assert_eq!(counters.releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn open_failure_is_reported_without_handle() {
        let (connector, counters) = connector(Probe::Never, true);
        let err = connector.connect(&config(), Duration::from_secs(1)).err().unwrap();

        assert!(matches!(err, ConnectError::OpenFailed { source_id: 1, .. }));
        assert_eq!(counters.grabs.load(Ordering::SeqCst), 0);
        assert_eq!(counters.releases.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn probe_error_becomes_setup_error() {
        let (connector, counters) = connector(Probe::FailOn(2), false);
        let err = connector.connect(&config(), Duration::from_secs(1)).err().unwrap();

        match err {
            ConnectError::ConnectionSetup { source_id, cause } => {
                assert_eq!(source_id, 1);
                assert_eq!(cause.to_string(), "driver crashed");
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(counters.releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsupported_address_counts_as_open_failure() {
        let connector = SourceConnector::new(Arc::new(crate::capture::SyntheticBackend));
        let mut config = config();
        config.address = SourceAddress::Device(0);
        let err = connector.connect(&config, Duration::from_millis(10)).err().unwrap();
        assert!(matches!(err, ConnectError::OpenFailed { .. }));
    }
}

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use multicam::{
    CaptureBackend, CaptureError, CaptureHandle, Frame, FrameSink, SourceAddress, SourceConfig,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// How a scripted camera behaves.
#[derive(Debug, Clone)]
pub struct Script {
    pub opens: bool,
    /// Probe that first returns a frame (1-based), `None` never
    pub live_on_probe: Option<usize>,
    /// Frames delivered before reads start failing, `None` unlimited
    pub frames: Option<u64>,
    pub read_delay: Duration,
}

impl Script {
    pub fn live() -> Self {
        Self {
            opens: true,
            live_on_probe: Some(1),
            frames: None,
            read_delay: Duration::ZERO,
        }
    }

    pub fn unreachable() -> Self {
        Self {
            live_on_probe: None,
            ..Self::live()
        }
    }

    pub fn closed() -> Self {
        Self {
            opens: false,
            ..Self::live()
        }
    }

    pub fn frames(mut self, frames: u64) -> Self {
        self.frames = Some(frames);
        self
    }

    pub fn read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }
}

#[derive(Debug, Default)]
pub struct Counters {
    pub opens: AtomicUsize,
    pub releases: AtomicUsize,
    pub reads: AtomicUsize,
    pub opened_at: Mutex<Option<Instant>>,
}

/// Backend answering from a table of scripts keyed by address.
#[derive(Default)]
pub struct ScriptedBackend {
    scripts: HashMap<SourceAddress, (Script, Arc<Counters>)>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, address: SourceAddress, script: Script) -> Self {
        self.scripts.insert(address, (script, Arc::new(Counters::default())));
        self
    }

    pub fn counters(&self, address: &SourceAddress) -> Arc<Counters> {
        self.scripts[address].1.clone()
    }
}

impl CaptureBackend for ScriptedBackend {
    fn open(&self, address: &SourceAddress) -> Result<Box<dyn CaptureHandle>, CaptureError> {
        let (script, counters) = self
            .scripts
            .get(address)
            .ok_or_else(|| CaptureError::Unsupported(address.to_string()))?;
        counters.opens.fetch_add(1, Ordering::SeqCst);
        *counters.opened_at.lock().unwrap() = Some(Instant::now());
        if !script.opens {
            return Err(CaptureError::Unavailable(format!("{} is closed", address)));
        }
        Ok(Box::new(ScriptedHandle {
            script: script.clone(),
            counters: counters.clone(),
            probes: 0,
            delivered: 0,
        }))
    }
}

struct ScriptedHandle {
    script: Script,
    counters: Arc<Counters>,
    probes: usize,
    delivered: u64,
}

impl CaptureHandle for ScriptedHandle {
    fn set_buffer_size(&mut self, _frames: u32) -> Result<()> {
        Ok(())
    }

    fn set_resolution(&mut self, _width: u32, _height: u32) -> Result<()> {
        Ok(())
    }

    fn grab(&mut self) -> Result<bool> {
        self.probes += 1;
        Ok(self.script.live_on_probe.is_some_and(|n| self.probes >= n))
    }

    fn read(&mut self) -> Result<Frame> {
        if !self.script.read_delay.is_zero() {
            thread::sleep(self.script.read_delay);
        }
        if self.script.frames.is_some_and(|limit| self.delivered >= limit) {
            return Err(anyhow!("camera unplugged"));
        }
        self.delivered += 1;
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        Ok(Frame::new(8, 6))
    }

    fn release(self: Box<Self>) {
        self.counters.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Sink that only remembers what it was asked to save.
#[derive(Default)]
pub struct RecordingSink {
    saved: Mutex<Vec<(PathBuf, String)>>,
    prepared: Mutex<Vec<PathBuf>>,
}

impl RecordingSink {
    pub fn filenames_in(&self, folder: &Path) -> Vec<String> {
        self.saved
            .lock()
            .unwrap()
            .iter()
            .filter(|(f, _)| f == folder)
            .map(|(_, name)| name.clone())
            .collect()
    }

    pub fn prepared(&self) -> Vec<PathBuf> {
        self.prepared.lock().unwrap().clone()
    }
}

impl FrameSink for RecordingSink {
    fn prepare(&self, folder: &Path) -> Result<()> {
        self.prepared.lock().unwrap().push(folder.to_path_buf());
        Ok(())
    }

    fn save(&self, folder: &Path, filename: &str, _frame: &Frame) -> Result<()> {
        self.saved
            .lock()
            .unwrap()
            .push((folder.to_path_buf(), filename.to_string()));
        Ok(())
    }
}

pub fn uri(name: &str) -> SourceAddress {
    SourceAddress::Uri(format!("mock://{}", name))
}

pub fn source(id: usize, address: SourceAddress, target_fps: u32) -> SourceConfig {
    SourceConfig {
        id,
        address,
        target_fps,
        frame_width: 640,
        frame_height: 480,
        output_folder: PathBuf::from(format!("out/cam{}", id + 1)),
        run_iteration: 7,
    }
}

/// Poll `condition` every few milliseconds until it holds or `limit` passes.
pub fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

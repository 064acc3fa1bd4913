mod jpeg;

pub use jpeg::{JpegFrameSink, DEFAULT_JPEG_QUALITY};

use crate::capture::Frame;
use anyhow::{Context, Result};
use std::path::Path;

/// Trait for frame destinations
pub trait FrameSink: Send + Sync {
    /// Make sure `folder` can receive frames. Called once before streaming.
    fn prepare(&self, folder: &Path) -> Result<()> {
        std::fs::create_dir_all(folder)
            .with_context(|| format!("Failed to create output folder {}", folder.display()))
    }

    /// Persist one frame as `folder/filename`
    fn save(&self, folder: &Path, filename: &str, frame: &Frame) -> Result<()>;
}

/// Name of the `index`-th (0-based) frame a session saves during run `run_iteration`.
pub fn frame_filename(run_iteration: u64, index: u64) -> String {
    format!("{} frame_{}.jpg", run_iteration, index)
}

//! Synthetic camera for `stub://` addresses.
//!
//! - `stub://pattern` streams a moving test pattern forever
//! - `stub://pattern?frames=N` ends the stream after N frames
//! - `stub://silent` opens but never delivers a frame
//! - `stub://offline` cannot be opened

use super::{CaptureBackend, CaptureError, CaptureHandle, Frame};
use crate::source::SourceAddress;
use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};

const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;

#[derive(Debug, Default, Clone, Copy)]
pub struct SyntheticBackend;

impl SyntheticBackend {
    pub fn handles(uri: &str) -> bool {
        uri.starts_with("stub://")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Behaviour {
    Pattern { frame_limit: Option<u64> },
    Silent,
}

impl CaptureBackend for SyntheticBackend {
    fn open(
        &self,
        address: &SourceAddress,
    ) -> std::result::Result<Box<dyn CaptureHandle>, CaptureError> {
        let SourceAddress::Uri(uri) = address else {
            return Err(CaptureError::Unsupported(address.to_string()));
        };
        let parsed =
            url::Url::parse(uri).map_err(|e| anyhow!("invalid stub address {}: {}", uri, e))?;
        if parsed.scheme() != "stub" {
            return Err(CaptureError::Unsupported(address.to_string()));
        }

        let behaviour = match parsed.host_str() {
            Some("pattern") => {
                let frame_limit = parsed
                    .query_pairs()
                    .find(|(key, _)| key == "frames")
                    .map(|(_, value)| {
                        value
                            .parse::<u64>()
                            .map_err(|_| anyhow!("frames must be a whole number, got {}", value))
                    })
                    .transpose()?;
                Behaviour::Pattern { frame_limit }
            }
            Some("silent") => Behaviour::Silent,
            Some("offline") => {
                return Err(CaptureError::Unavailable(format!("{} is offline", uri)));
            }
            other => {
                return Err(CaptureError::Unavailable(format!(
                    "unknown synthetic source {:?}",
                    other.unwrap_or_default()
                )))
            }
        };

        tracing::debug!("Opened synthetic source {}", uri);
        Ok(Box::new(SyntheticHandle {
            behaviour,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            frames_read: 0,
        }))
    }
}

struct SyntheticHandle {
    behaviour: Behaviour,
    width: u32,
    height: u32,
    frames_read: u64,
}

impl SyntheticHandle {
    fn render(&self) -> Frame {
        let shift = (self.frames_read * 4) as u32;
        RgbImage::from_fn(self.width, self.height, |x, y| {
            let r = ((x + shift) % 256) as u8;
            let g = ((y + shift / 2) % 256) as u8;
            let b = ((x ^ y) % 256) as u8;
            Rgb([r, g, b])
        })
    }
}

impl CaptureHandle for SyntheticHandle {
    fn set_buffer_size(&mut self, _frames: u32) -> Result<()> {
        Ok(())
    }

    fn set_resolution(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(anyhow!("resolution must be non-zero, got {}x{}", width, height));
        }
        self.width = width;
        self.height = height;
        Ok(())
    }

    fn grab(&mut self) -> Result<bool> {
        Ok(matches!(self.behaviour, Behaviour::Pattern { .. }))
    }

    fn read(&mut self) -> Result<Frame> {
        match self.behaviour {
            Behaviour::Silent => Err(anyhow!("synthetic source is silent")),
            Behaviour::Pattern { frame_limit: Some(limit) } if self.frames_read >= limit => {
                Err(anyhow!("synthetic stream finished after {} frames", limit))
            }
            Behaviour::Pattern { .. } => {
                let frame = self.render();
                self.frames_read += 1;
                Ok(frame)
            }
        }
    }

    fn release(self: Box<Self>) {
        tracing::debug!(frames = self.frames_read, "Released synthetic source");
    }
}

use super::FrameSink;
use crate::capture::Frame;
use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Writes every frame to its own JPEG file.
#[derive(Debug, Clone)]
pub struct JpegFrameSink {
    quality: u8,
}

impl JpegFrameSink {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }
}

impl Default for JpegFrameSink {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl FrameSink for JpegFrameSink {
    fn save(&self, folder: &Path, filename: &str, frame: &Frame) -> Result<()> {
        let path = folder.join(filename);
        let file = File::create(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;

        let mut writer = BufWriter::new(file);
        JpegEncoder::new_with_quality(&mut writer, self.quality)
            .encode_image(frame)
            .with_context(|| format!("Failed to encode {}", path.display()))?;
        writer
            .flush()
            .with_context(|| format!("Failed to write {}", path.display()))?;

        Ok(())
    }
}

//! Network cameras through a GStreamer `uridecodebin` pipeline.

use super::{CaptureBackend, CaptureError, CaptureHandle, Frame};
use crate::source::SourceAddress;
use anyhow::{anyhow, Context, Result};
use gstreamer::prelude::*;
use image::RgbImage;

const READ_TIMEOUT_MS: u64 = 2_000;

#[derive(Debug, Default, Clone, Copy)]
pub struct GstreamerBackend;

impl CaptureBackend for GstreamerBackend {
    fn open(
        &self,
        address: &SourceAddress,
    ) -> std::result::Result<Box<dyn CaptureHandle>, CaptureError> {
        let SourceAddress::Uri(uri) = address else {
            return Err(CaptureError::Unsupported(address.to_string()));
        };

        gstreamer::init().context("initialize gstreamer")?;

        let pipeline_description = format!(
            "uridecodebin uri={} ! videoconvert ! videoscale ! \
             capsfilter name=caps caps=video/x-raw,format=RGB ! \
             appsink name=appsink sync=false max-buffers=1 drop=true",
            uri
        );
        let pipeline = gstreamer::parse::launch(&pipeline_description)
            .map_err(|e| {
                CaptureError::Unavailable(format!("cannot build pipeline for {}: {}", address, e))
            })?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| anyhow!("pipeline for {} is not a Pipeline", address))?;

        let appsink = pipeline
            .by_name("appsink")
            .context("appsink element missing from pipeline")?
            .downcast::<gstreamer_app::AppSink>()
            .map_err(|_| anyhow!("appsink element has unexpected type"))?;
        let capsfilter = pipeline
            .by_name("caps")
            .context("capsfilter element missing from pipeline")?;

        if pipeline.set_state(gstreamer::State::Playing).is_err() {
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(CaptureError::Unavailable(format!("{} refused to start", address)));
        }

        tracing::debug!("Started pipeline for {}", address);
        Ok(Box::new(PipelineHandle {
            label: address.to_string(),
            pipeline,
            appsink,
            capsfilter,
            pending: None,
        }))
    }
}

struct PipelineHandle {
    label: String,
    pipeline: gstreamer::Pipeline,
    appsink: gstreamer_app::AppSink,
    capsfilter: gstreamer::Element,
    /// Sample pulled by `grab` and not read yet
    pending: Option<gstreamer::Sample>,
}

impl PipelineHandle {
    fn bus_error(&self) -> Option<String> {
        let bus = self.pipeline.bus()?;
        while let Some(message) = bus.pop() {
            use gstreamer::MessageView;
            match message.view() {
                MessageView::Error(err) => {
                    return Some(format!(
                        "gstreamer error from {:?}: {}",
                        err.src().map(|s| s.path_string()),
                        err.error()
                    ));
                }
                MessageView::Eos(..) => return Some("end of stream".to_string()),
                _ => {}
            }
        }
        None
    }
}

impl CaptureHandle for PipelineHandle {
    fn set_buffer_size(&mut self, frames: u32) -> Result<()> {
        self.appsink.set_max_buffers(frames);
        Ok(())
    }

    fn set_resolution(&mut self, width: u32, height: u32) -> Result<()> {
        let caps = gstreamer::Caps::builder("video/x-raw")
            .field("format", "RGB")
            .field("width", i32::try_from(width).context("width out of range")?)
            .field("height", i32::try_from(height).context("height out of range")?)
            .build();
        self.capsfilter.set_property("caps", &caps);
        Ok(())
    }

    fn grab(&mut self) -> Result<bool> {
        if self.pending.is_some() {
            return Ok(true);
        }
        self.pending = self.appsink.try_pull_sample(gstreamer::ClockTime::ZERO);
        Ok(self.pending.is_some())
    }

    fn read(&mut self) -> Result<Frame> {
        if let Some(reason) = self.bus_error() {
            return Err(anyhow!("{}: {}", self.label, reason));
        }
        let sample = match self.pending.take() {
            Some(sample) => sample,
            None => self
                .appsink
                .try_pull_sample(gstreamer::ClockTime::from_mseconds(READ_TIMEOUT_MS))
                .ok_or_else(|| anyhow!("{} stalled", self.label))?,
        };
        sample_to_image(&sample)
    }

    fn release(self: Box<Self>) {
        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            tracing::warn!("Failed to stop pipeline for {}: {}", self.label, e);
        }
    }
}

fn sample_to_image(sample: &gstreamer::Sample) -> Result<Frame> {
    let buffer = sample.buffer().context("sample missing buffer")?;
    let caps = sample.caps().context("sample missing caps")?;
    let info = gstreamer_video::VideoInfo::from_caps(caps).context("parse caps as video info")?;

    let width = info.width();
    let height = info.height();
    let row_bytes = (width as usize) * 3;
    let stride = info.stride()[0] as usize;

    let map = buffer.map_readable().context("map buffer")?;
    let data = map.as_slice();

    let pixels = if stride == row_bytes {
        data.get(..row_bytes * height as usize)
            .context("buffer is smaller than the frame")?
            .to_vec()
    } else {
        let mut pixels = Vec::with_capacity(row_bytes * height as usize);
        for row in 0..height as usize {
            let start = row * stride;
            pixels.extend_from_slice(
                data.get(start..start + row_bytes)
                    .context("buffer row is out of bounds")?,
            );
        }
        pixels
    };

    RgbImage::from_raw(width, height, pixels).context("frame buffer has the wrong size")
}

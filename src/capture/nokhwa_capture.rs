use super::{CaptureBackend, CaptureError, CaptureHandle, Frame};
use crate::source::SourceAddress;
use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::Camera;

/// USB cameras opened by device index.
#[derive(Debug, Default, Clone, Copy)]
pub struct NokhwaBackend;

impl CaptureBackend for NokhwaBackend {
    fn open(
        &self,
        address: &SourceAddress,
    ) -> std::result::Result<Box<dyn CaptureHandle>, CaptureError> {
        let SourceAddress::Device(device_index) = address else {
            return Err(CaptureError::Unsupported(address.to_string()));
        };

        tracing::info!("Opening webcam {}", device_index);

        let index = CameraIndex::Index(*device_index);
        let requested =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution);

        let mut camera = Camera::new(index, requested).map_err(|e| {
            CaptureError::Unavailable(format!("failed to open webcam {}: {}", device_index, e))
        })?;

        camera
            .open_stream()
            .map_err(|e| {
                CaptureError::Unavailable(format!(
                    "failed to open stream of webcam {}: {}",
                    device_index, e
                ))
            })?;

        Ok(Box::new(WebcamHandle {
            camera,
            device_index: *device_index,
        }))
    }
}

struct WebcamHandle {
    camera: Camera,
    device_index: u32,
}

impl CaptureHandle for WebcamHandle {
    fn set_buffer_size(&mut self, frames: u32) -> Result<()> {
        // nokhwa hands out the most recent buffer and has no queue depth knob
        tracing::debug!(
            frames,
            "Buffer size is fixed by the driver for webcam {}",
            self.device_index
        );
        Ok(())
    }

    fn set_resolution(&mut self, width: u32, height: u32) -> Result<()> {
        self.camera
            .set_resolution(Resolution::new(width, height))
            .with_context(|| {
                format!(
                    "failed to set webcam {} to {}x{}",
                    self.device_index, width, height
                )
            })
    }

    fn grab(&mut self) -> Result<bool> {
        match self.camera.frame() {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::trace!("Webcam {} not ready: {}", self.device_index, e);
                Ok(false)
            }
        }
    }

    fn read(&mut self) -> Result<Frame> {
        let frame = self
            .camera
            .frame()
            .context("Failed to capture frame")?;

        let decoded = frame
            .decode_image::<RgbFormat>()
            .context("Failed to decode frame")?;

        let (width, height) = (decoded.width(), decoded.height());
        RgbImage::from_raw(width, height, decoded.into_raw())
            .ok_or_else(|| anyhow!("decoded frame has the wrong size for {}x{}", width, height))
    }

    fn release(mut self: Box<Self>) {
        if let Err(e) = self.camera.stop_stream() {
            tracing::warn!("Failed to stop webcam {}: {}", self.device_index, e);
        }
    }
}

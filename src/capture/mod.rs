#[cfg(feature = "rtsp-gstreamer")]
mod gstreamer_capture;
#[cfg(feature = "usb-nokhwa")]
mod nokhwa_capture;
mod synthetic;

#[cfg(feature = "rtsp-gstreamer")]
pub use gstreamer_capture::GstreamerBackend;
#[cfg(feature = "usb-nokhwa")]
pub use nokhwa_capture::NokhwaBackend;
pub use synthetic::SyntheticBackend;

use crate::source::SourceAddress;
use anyhow::Result;
use image::RgbImage;
use thiserror::Error;

pub type Frame = RgbImage;

#[derive(Error, Debug)]
pub enum CaptureError {
    /// The backend could not open the source at all.
    #[error("{0}")]
    Unavailable(String),

    /// No compiled-in backend handles this kind of address.
    #[error("no capture backend for {0}")]
    Unsupported(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Opens capture handles. Shared by every session thread.
pub trait CaptureBackend: Send + Sync {
    fn open(
        &self,
        address: &SourceAddress,
    ) -> std::result::Result<Box<dyn CaptureHandle>, CaptureError>;
}

/// An open camera. Lives on the thread that opened it.
pub trait CaptureHandle {
    /// Number of frames the driver may queue before dropping.
    fn set_buffer_size(&mut self, frames: u32) -> Result<()>;

    /// Request a capture resolution. The device may pick something else.
    fn set_resolution(&mut self, width: u32, height: u32) -> Result<()>;

    /// Try to pull one frame without decoding it.
    ///
    /// Returns `Ok(false)` when no frame is available yet.
    fn grab(&mut self) -> Result<bool>;

    /// Read and decode the next frame.
    fn read(&mut self) -> Result<Frame>;

    /// Close the device. Consumes the handle so it can only happen once.
    fn release(self: Box<Self>);
}

/// Routes an address to whichever backend was compiled in for it.
///
/// `stub://` URIs always go to the synthetic backend; other URIs need the
/// `rtsp-gstreamer` feature and device indices need `usb-nokhwa`.
#[derive(Default)]
pub struct SystemBackend {
    synthetic: SyntheticBackend,
    #[cfg(feature = "rtsp-gstreamer")]
    network: GstreamerBackend,
    #[cfg(feature = "usb-nokhwa")]
    local: NokhwaBackend,
}

impl SystemBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CaptureBackend for SystemBackend {
    fn open(
        &self,
        address: &SourceAddress,
    ) -> std::result::Result<Box<dyn CaptureHandle>, CaptureError> {
        match address {
            SourceAddress::Uri(uri) if SyntheticBackend::handles(uri) => {
                self.synthetic.open(address)
            }
            #[cfg(feature = "rtsp-gstreamer")]
            SourceAddress::Uri(_) => self.network.open(address),
            #[cfg(feature = "usb-nokhwa")]
            SourceAddress::Device(_) => self.local.open(address),
            #[allow(unreachable_patterns)]
            other => Err(CaptureError::Unsupported(other.to_string())),
        }
    }
}

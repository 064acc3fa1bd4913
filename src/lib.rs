//! Record frames from several cameras at once.
//!
//! A [`Supervisor`] starts one [`CaptureSession`] per configured camera. Each
//! session proves its source is alive with [`SourceConnector`], then saves
//! paced frames through a [`FrameSink`] until the shared cancellation signal is
//! raised. Cameras that never connect are reported to the supervisor, which asks
//! a [`FailureDecider`] whether the run should go on without them.

pub mod cancel;
pub mod capture;
pub mod config;
pub mod connector;
pub mod counter;
pub mod decision;
pub mod error;
pub mod output;
pub mod preview;
pub mod reporter;
pub mod session;
pub mod source;
pub mod supervisor;

pub use cancel::{CancellationSignal, ShutdownTrigger};
pub use capture::{CaptureBackend, CaptureError, CaptureHandle, Frame, SystemBackend};
pub use config::{ConfigError, Settings};
pub use connector::SourceConnector;
pub use counter::RunCounter;
pub use decision::{Decision, FailureDecider, FixedDecision, PromptDecider};
pub use error::{ConnectError, SessionError, SupervisorError};
pub use output::{frame_filename, FrameSink, JpegFrameSink};
pub use preview::{LogPreview, NullPreview, Preview};
pub use reporter::{FailureNotifier, FailureReporter};
pub use session::{CaptureSession, SessionReport, SessionState};
pub use source::{SourceAddress, SourceConfig};
pub use supervisor::{ExitReason, RunSummary, Supervisor, SupervisorOptions};

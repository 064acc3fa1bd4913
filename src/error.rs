use std::time::Duration;
use thiserror::Error;

/// Why a source never reached the streaming state.
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("camera {} could not be opened: {reason}", .source_id + 1)]
    OpenFailed { source_id: usize, reason: String },

    #[error("camera {} opened but produced no frames within {timeout:?}", .source_id + 1)]
    NoFrames { source_id: usize, timeout: Duration },

    #[error("connection setup failed for camera {}", .source_id + 1)]
    ConnectionSetup {
        source_id: usize,
        #[source]
        cause: anyhow::Error,
    },
}

impl ConnectError {
    pub fn source_id(&self) -> usize {
        match self {
            ConnectError::OpenFailed { source_id, .. }
            | ConnectError::NoFrames { source_id, .. }
            | ConnectError::ConnectionSetup { source_id, .. } => *source_id,
        }
    }
}

/// Errors that end a session after it connected. Logged, never reported.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("stream from camera {} ended", .source_id + 1)]
    StreamEnded {
        source_id: usize,
        #[source]
        cause: anyhow::Error,
    },

    #[error("output folder for camera {} is unusable", .source_id + 1)]
    OutputUnavailable {
        source_id: usize,
        #[source]
        cause: anyhow::Error,
    },
}

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("failed to launch worker for {label}")]
    LaunchFailed {
        label: String,
        #[source]
        cause: std::io::Error,
    },

    #[error("internal error: {0}")]
    Internal(String),

    #[error("failure decision for camera {} could not be made", .source_id + 1)]
    Decision {
        source_id: usize,
        #[source]
        cause: anyhow::Error,
    },
}

pub type Result<T> = std::result::Result<T, SupervisorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_use_camera_numbers() {
        let err = ConnectError::NoFrames {
            source_id: 2,
            timeout: Duration::from_secs(10),
        };
        assert_eq!(err.to_string(), "camera 3 opened but produced no frames within 10s");
        assert_eq!(err.source_id(), 2);
    }

    #[test]
    fn setup_error_keeps_cause() {
        let err = ConnectError::ConnectionSetup {
            source_id: 0,
            cause: anyhow::anyhow!("pipeline refused to start"),
        };
        let cause = std::error::Error::source(&err).map(|e| e.to_string());
        assert_eq!(cause.as_deref(), Some("pipeline refused to start"));
    }
}

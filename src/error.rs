//! Error kinds of the test support library

use std::time::Duration;

use thiserror::Error;

use crate::remote::RemoteResult;

/// Result type alias for test support operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a single wait
///
/// Only these two kinds ever leave the poller. Errors which were
/// declared as tolerated never surface on their own.
#[derive(Debug, Error)]
pub enum WaitError {
    /// The condition did not become true within the timeout
    #[error(
        "Timed out waiting for {description} \
        (elapsed {elapsed:?}, timeout {timeout:?}, {attempts} attempts)"
    )]
    Timeout {
        description: String,
        elapsed: Duration,
        timeout: Duration,
        attempts: u32,
    },

    /// The probe raised an error which is not tolerated
    #[error("Probe failed while waiting for {description}: {error:#}")]
    Probe {
        description: String,
        error: anyhow::Error,
    },
}

impl WaitError {
    /// Checks if the condition never became true.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Checks if the wait was aborted by the probe.
    pub fn is_probe_error(&self) -> bool {
        matches!(self, Self::Probe { .. })
    }

    /// The description of the awaited condition
    pub fn description(&self) -> &str {
        match self {
            Self::Timeout { description, .. } | Self::Probe { description, .. } => description,
        }
    }

    /// Returns the error raised by the probe if the wait was aborted.
    pub fn probe_error(&self) -> Option<&anyhow::Error> {
        match self {
            Self::Probe { error, .. } => Some(error),
            Self::Timeout { .. } => None,
        }
    }

    /// Converts into the error raised by the probe.
    pub fn into_probe_error(self) -> Option<anyhow::Error> {
        match self {
            Self::Probe { error, .. } => Some(error),
            Self::Timeout { .. } => None,
        }
    }
}

/// Outcome kinds a test step can fail with
///
/// `Skip` is not a failure: the environment under test cannot run the
/// check, e.g. a live migration mode which the storage backend does not
/// support.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Skipped: {0}")]
    Skip(String),

    #[error(transparent)]
    Timeout(WaitError),

    #[error(transparent)]
    Fatal(anyhow::Error),

    /// A checked command terminated with a non-zero exit status
    #[error(
        "Command [{command}] failed with exit status {}: {}",
        .result.exit_status,
        .result.stderr_string()
    )]
    Command {
        command: String,
        result: RemoteResult,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Creates a skip with the given reason.
    pub fn skip(reason: impl Into<String>) -> Self {
        Self::Skip(reason.into())
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Skip(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<WaitError> for Error {
    fn from(error: WaitError) -> Self {
        match error {
            timeout @ WaitError::Timeout { .. } => Self::Timeout(timeout),
            probe @ WaitError::Probe { .. } => Self::Fatal(anyhow::Error::new(probe)),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(error: anyhow::Error) -> Self {
        Self::Fatal(error)
    }
}

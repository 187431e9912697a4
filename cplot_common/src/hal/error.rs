//! Device error taxonomy.
//!
//! Every failure of the device stack maps onto one [`ErrorKind`]:
//! configuration, connection, busy, protocol, timeout or validation.
//! Callers use the kind to decide whether to print "device busy", retry
//! later, or fix their input.

use thiserror::Error;

/// Result alias for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Coarse classification of a [`DeviceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid settings, limits or port; detected before any I/O.
    Configuration,
    /// Open or probe failure.
    Connection,
    /// Another process holds the device lock.
    Busy,
    /// Absent, malformed or negative controller response.
    Protocol,
    /// A bounded wait expired.
    Timeout,
    /// Command argument out of range; nothing was sent.
    Validation,
}

/// Errors raised by transports, the EBB codec and the device manager.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// Invalid settings or parameters.
    #[error("Configuration error: {0}")]
    Config(String),

    /// No port given and auto-detection found nothing.
    #[error("Port not specified and no device was detected")]
    PortNotSpecified,

    /// Serial port could not be opened or configured.
    #[error("Failed to open {path}: {source}")]
    Open {
        /// Port path.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Firmware did not answer the version probe.
    #[error("Device on {path} did not answer the version query")]
    ProbeFailed {
        /// Port path.
        path: String,
    },

    /// Operation requires a connected device.
    #[error("Device is not connected")]
    NotConnected,

    /// Advisory lock already held.
    #[error("Device busy ({holder})")]
    Busy {
        /// Content of the lock file, e.g. `pid=1234`.
        holder: String,
    },

    /// Lock file could not be created or locked.
    #[error("Device lock error on {path}: {source}")]
    Lock {
        /// Lock file path.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Argument rejected before touching the transport.
    #[error("Invalid command argument: {0}")]
    Validation(String),

    /// Controller answered with `ERR...` or `!...`.
    #[error("Controller rejected '{command}': {response}")]
    Rejected {
        /// Command line sent.
        command: String,
        /// Error line received.
        response: String,
    },

    /// No line arrived within the response timeout.
    #[error("No response to '{command}'")]
    NoResponse {
        /// Command line sent.
        command: String,
    },

    /// Read attempts exhausted without `OK`.
    #[error("No acknowledgment after '{command}'")]
    NoAck {
        /// Command line sent.
        command: String,
    },

    /// Query answered with `OK` only.
    #[error("Expected data from '{command}', got none")]
    MissingData {
        /// Command line sent.
        command: String,
    },

    /// Query payload failed strict parsing.
    #[error("Malformed response to '{command}': {response}")]
    Malformed {
        /// Command line sent.
        command: String,
        /// Payload received.
        response: String,
    },

    /// A bounded wait expired.
    #[error("Timed out after {waited_ms} ms waiting for {what}")]
    Timeout {
        /// What was awaited.
        what: &'static str,
        /// Elapsed time.
        waited_ms: u64,
    },

    /// Transport I/O failure.
    #[error("I/O error: {source}")]
    Io {
        /// Underlying error.
        #[from]
        source: std::io::Error,
    },
}

impl DeviceError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) | Self::PortNotSpecified => ErrorKind::Configuration,
            Self::Open { .. } | Self::ProbeFailed { .. } | Self::NotConnected | Self::Lock { .. } => {
                ErrorKind::Connection
            }
            Self::Busy { .. } => ErrorKind::Busy,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Rejected { .. }
            | Self::NoAck { .. }
            | Self::MissingData { .. }
            | Self::Malformed { .. }
            | Self::Io { .. } => ErrorKind::Protocol,
            Self::NoResponse { .. } | Self::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    /// True when another process holds the device.
    pub fn is_busy(&self) -> bool {
        self.kind() == ErrorKind::Busy
    }
}

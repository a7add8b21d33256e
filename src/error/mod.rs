use std::time::Duration;
use thiserror::Error;

use crate::session::{Phase, SessionState};
use crate::status::HardwareStatus;

/// Result type used across the driver
pub type Result<T> = std::result::Result<T, SniffError>;

/// Everything that can go wrong while driving a capture session
#[derive(Error, Debug)]
pub enum SniffError {
    /// The native library could not be loaded or the service refused to start
    #[error("capture service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Status stayed at SNIFFER_NOT_FOUND for every attempt
    #[error("sniffer hardware not found after {attempts} attempts")]
    HardwareNotFound { attempts: u32 },

    /// The hardware answered with a failure status
    #[error("sniffer hardware fault: {0}")]
    HardwareFault(HardwareStatus),

    /// Configuration was requested before the hardware reported INIT_OK
    #[error("hardware not ready (last status: {0})")]
    NotReady(HardwareStatus),

    #[error("invalid session state: expected {expected}, found {actual}")]
    InvalidState {
        expected: SessionState,
        actual: SessionState,
    },

    /// Writing decoded rows to the output failed
    #[error("failed to write decoded rows: {0}")]
    ExtractionIo(#[from] std::io::Error),

    #[error("{phase} did not complete within {waited:?}")]
    Timeout { phase: Phase, waited: Duration },

    #[error("{phase} cancelled")]
    Cancelled { phase: Phase },
}

impl SniffError {
    /// Whether the failure came from the hardware rather than the host
    pub fn is_hardware(&self) -> bool {
        matches!(
            self,
            SniffError::HardwareNotFound { .. } | SniffError::HardwareFault(_) | SniffError::NotReady(_)
        )
    }
}

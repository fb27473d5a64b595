use std::time::Duration;

use thiserror::Error;

/// Errors raised by the probe.
///
/// A collector that fails to reclaim anything is not an error: it shows up as
/// a `false` result.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("max_attempts must be at least 2, but was {0}")]
    InvalidMaxAttempts(i64),

    #[error("pressure_size is {0}, which is disallowed because it is negative")]
    NegativePressureSize(i64),

    /// Only reachable where `usize` is narrower than 64 bits
    #[error("pressure_size {0} does not fit in this platform's address space")]
    PressureSizeTooLarge(i64),

    #[error("triggering garbage collection is not supported on this platform")]
    Unsupported,

    #[error("a platform collector has already been installed")]
    AlreadyInstalled,

    #[error("gc probe cancelled after {after:?}")]
    Cancelled { after: Duration },
}

impl ProbeError {
    /// Whether this is a configuration error, raised before any work was done
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ProbeError::InvalidMaxAttempts(_)
                | ProbeError::NegativePressureSize(_)
                | ProbeError::PressureSizeTooLarge(_)
        )
    }
}

pub type ProbeResult<T> = Result<T, ProbeError>;

use std::time::Duration;

use crate::error::{ProbeError, ProbeResult};

/// Default evaluation budget on platforms without a direct trigger.
pub const DEFAULT_MAX_ATTEMPTS: i64 = 9;

/// Default number of elements allocated per memory pressure step.
pub const DEFAULT_PRESSURE_SIZE: i64 = 4 * 1024 * 1024;

/// Default suspension at the start of every fallback iteration.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(1);

/// Options for one probe.
///
/// Sizes are signed so that values coming from callers and the command line
/// are representable before validation. Every probe call validates them again
/// before doing any work.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeOptions {
    /// Total number of condition evaluations when collection cannot be
    /// triggered directly. Must be at least 2.
    pub max_attempts: i64,

    /// Number of elements allocated per memory pressure step. Must not be negative.
    pub pressure_size: i64,

    /// Suspension at the start of every fallback iteration
    pub delay: Duration,

    /// Deadline for the whole probe, after which it is cancelled
    pub timeout: Option<Duration>,
}

/// Validated attempt budget
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Budget {
    pub max_attempts: u64,
    pub pressure_size: usize,
}

impl ProbeOptions {
    pub(crate) fn budget(&self) -> ProbeResult<Budget> {
        if self.max_attempts < 2 {
            return Err(ProbeError::InvalidMaxAttempts(self.max_attempts));
        }
        if self.pressure_size < 0 {
            return Err(ProbeError::NegativePressureSize(self.pressure_size));
        }

        let pressure_size = usize::try_from(self.pressure_size)
            .map_err(|_| ProbeError::PressureSizeTooLarge(self.pressure_size))?;

        Ok(Budget {
            max_attempts: self.max_attempts as u64,
            pressure_size,
        })
    }

    /// Check the options without running a probe.
    pub fn validate(&self) -> ProbeResult<()> {
        self.budget().map(|_| ())
    }
}

impl Default for ProbeOptions {
    fn default() -> Self {
        ProbeOptionsBuilder::new().0
    }
}

pub struct ProbeOptionsBuilder(ProbeOptions);

impl ProbeOptionsBuilder {
    /// Create new options with default values.
    pub fn new() -> Self {
        Self(ProbeOptions {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            pressure_size: DEFAULT_PRESSURE_SIZE,
            delay: DEFAULT_DELAY,
            timeout: None,
        })
    }

    /// Return the options that have been built, consuming the builder.
    pub fn build(self) -> ProbeResult<ProbeOptions> {
        self.0.validate()?;
        Ok(self.0)
    }

    pub fn max_attempts(mut self, max_attempts: i64) -> Self {
        self.0.max_attempts = max_attempts;
        self
    }

    pub fn pressure_size(mut self, pressure_size: i64) -> Self {
        self.0.pressure_size = pressure_size;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.0.delay = delay;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.0.timeout = timeout;
        self
    }
}

impl Default for ProbeOptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

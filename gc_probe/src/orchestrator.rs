//! Adaptive retry orchestrator
//!
//! `GcProbe::try_to_achieve` evaluates a condition until it holds, trying to
//! get the collector to run in between:
//!
//! 1. Evaluate the condition. Done if it holds.
//! 2. Trigger a collection. If the trigger is supported, evaluate once more and
//!    return that result.
//! 3. Otherwise loop until `max_attempts` evaluations have been made: suspend
//!    for `delay`, apply one step of memory pressure, evaluate.
//!
//! The last loop iteration's evaluation is the final one, so the condition is
//! evaluated at most `max_attempts` times (2 times with a direct trigger), and
//! never again after it first returned true.
//!
//! The loop suspends with `tokio::time::sleep`, so the probe must be polled from
//! within a tokio runtime with the time driver enabled. Dropping the future at
//! a suspension point stops the probe before any further evaluation.

use std::time::Duration;

use tracing::{debug, debug_span, trace, Instrument};

use crate::{
    error::{ProbeError, ProbeResult},
    options::{Budget, ProbeOptions},
    pressure::{ChurnBuffer, MemoryPressure, ResetOnDrop},
    trigger::CollectorTrigger,
};

/// Observes collection-dependent outcomes with a bounded number of attempts.
pub struct GcProbe<T, P = ChurnBuffer> {
    trigger: T,
    options: ProbeOptions,
    pressure: P,
}

impl<T: CollectorTrigger> GcProbe<T> {
    pub fn new(trigger: T, options: ProbeOptions) -> Self {
        GcProbe::with_pressure(trigger, options, ChurnBuffer::new())
    }
}

impl<T: CollectorTrigger, P: MemoryPressure> GcProbe<T, P> {
    pub fn with_pressure(trigger: T, options: ProbeOptions, pressure: P) -> Self {
        GcProbe {
            trigger,
            options,
            pressure,
        }
    }

    pub fn options(&self) -> &ProbeOptions {
        &self.options
    }

    pub fn pressure(&self) -> &P {
        &self.pressure
    }

    /// Evaluate `condition` until it returns true or the attempt budget runs out.
    ///
    /// Returns `Ok(true)` as soon as the condition holds and `Ok(false)` if it
    /// never did. Invalid options fail before the condition is evaluated. With
    /// `ProbeOptions::timeout` set, running out of time fails with
    /// `ProbeError::Cancelled`.
    ///
    /// A supported trigger collects synchronously, which may pause this task
    /// and everything sharing its thread for the duration of the collection.
    pub async fn try_to_achieve<F>(&mut self, condition: F) -> ProbeResult<bool>
    where
        F: FnMut() -> bool,
    {
        let budget = self.options.budget()?;
        let span = debug_span!(
            "try_to_achieve",
            max_attempts = budget.max_attempts,
            pressure_size = budget.pressure_size,
        );

        let attempts = achieve(
            &self.trigger,
            &mut self.pressure,
            budget,
            self.options.delay,
            condition,
        )
        .instrument(span);

        match self.options.timeout {
            None => Ok(attempts.await),
            Some(limit) => tokio::time::timeout(limit, attempts)
                .await
                .map_err(|_| {
                    debug!(?limit, "probe timed out");
                    ProbeError::Cancelled { after: limit }
                }),
        }
    }
}

async fn achieve<T, P, F>(
    trigger: &T,
    pressure: &mut P,
    budget: Budget,
    delay: Duration,
    mut condition: F,
) -> bool
where
    T: CollectorTrigger,
    P: MemoryPressure,
    F: FnMut() -> bool,
{
    if condition() {
        debug!(evaluations = 1, "condition already holds");
        return true;
    }

    if trigger.trigger_collection() {
        let achieved = condition();
        debug!(evaluations = 2, achieved, "evaluated after direct collection");
        return achieved;
    }

    let mut pressure = ResetOnDrop(pressure);
    let mut evaluations: u64 = 1;
    while evaluations < budget.max_attempts {
        tokio::time::sleep(delay).await;
        pressure.0.apply(budget.pressure_size);

        evaluations += 1;
        if condition() {
            debug!(evaluations, "condition holds under memory pressure");
            return true;
        }
        trace!(evaluations, "condition does not hold yet");
    }

    debug!(evaluations, "attempt budget exhausted");
    false
}

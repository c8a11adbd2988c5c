/*!
State processors: consumers of the chain's state sequence.

The sampler hands the current state to every registered [`StateProcessor`]
after each iteration, including iterations whose candidate was rejected.
Each processor decides through its [`SamplingSchedule`] whether to
materialize output for that iteration.
*/

pub mod csv;

pub use self::csv::{
    LocationCountLogger, LocationCounts, LogColumns, SampleCollector, SizeDistribution,
    SizeDistributionLogger, TargetLogger, TargetSamples, ToFileLogger,
};

use crate::error::SamplerError;

pub trait StateProcessor<S>: Send {
    /// Called once before the first state is processed.
    fn start(&mut self) -> Result<(), SamplerError> {
        Ok(())
    }

    fn process_state(&mut self, iteration: u64, state: &S) -> Result<(), SamplerError>;

    /// Called once after the last state; flushes buffered output.
    fn end(&mut self) -> Result<(), SamplerError> {
        Ok(())
    }
}

impl<S, P: StateProcessor<S> + ?Sized> StateProcessor<S> for Box<P> {
    fn start(&mut self) -> Result<(), SamplerError> {
        (**self).start()
    }

    fn process_state(&mut self, iteration: u64, state: &S) -> Result<(), SamplerError> {
        (**self).process_state(iteration, state)
    }

    fn end(&mut self) -> Result<(), SamplerError> {
        (**self).end()
    }
}

/// Materialize iteration `k` iff `k >= burn_in` and `(k - burn_in) % interval == 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingSchedule {
    pub burn_in: u64,
    pub interval: u64,
}

impl SamplingSchedule {
    pub fn new(burn_in: u64, interval: u64) -> Self {
        assert!(interval > 0, "sampling interval must be positive");
        Self { burn_in, interval }
    }

    /// Every iteration, from the initial state on.
    pub fn every_iteration() -> Self {
        Self::new(0, 1)
    }

    pub fn should_sample(&self, iteration: u64) -> bool {
        iteration >= self.burn_in && (iteration - self.burn_in) % self.interval == 0
    }
}

impl Default for SamplingSchedule {
    fn default() -> Self {
        Self::every_iteration()
    }
}

//! Chain abstractions shared by the samplers, and parallel execution of independent chains.

use indicatif::ProgressBar;
use indicatif::{MultiProgress, ProgressStyle};
use rayon::prelude::*;
use std::time::{Duration, Instant};

use crate::error::SamplerError;

const UPDATE_INTERVAL: Duration = Duration::from_millis(500);

pub trait MarkovChain<S> {
    /// Does one iteration of the chain; returns whether the candidate was accepted.
    fn step(&mut self) -> Result<bool, SamplerError>;

    /// The current state without stepping.
    fn current_state(&self) -> &S;

    /// Called before the first step of a run.
    fn begin(&mut self) -> Result<(), SamplerError> {
        Ok(())
    }

    /// Called after the last step of a run.
    fn finish(&mut self) -> Result<(), SamplerError> {
        Ok(())
    }
}

/// Runs `n_steps` iterations and returns the number of accepted candidates.
pub fn run_chain<S, M>(chain: &mut M, n_steps: u64) -> Result<u64, SamplerError>
where
    M: MarkovChain<S> + ?Sized,
{
    chain.begin()?;
    let mut accept_cnt = 0;
    for _ in 0..n_steps {
        if chain.step()? {
            accept_cnt += 1;
        }
    }
    chain.finish()?;
    Ok(accept_cnt)
}

pub fn run_chain_with_progress<S, M>(
    chain: &mut M,
    n_steps: u64,
    pb: &ProgressBar,
) -> Result<u64, SamplerError>
where
    M: MarkovChain<S> + ?Sized,
{
    let mut accept_cnt = 0_u64;
    let mut last_update = Instant::now();
    pb.set_length(n_steps);

    chain.begin()?;
    for step_idx in 0..n_steps {
        if chain.step()? {
            accept_cnt += 1;
        }
        if last_update.elapsed() >= UPDATE_INTERVAL || step_idx + 1 == n_steps {
            let accept_rate = accept_cnt as f64 / (step_idx + 1) as f64;
            pb.set_position(step_idx + 1);
            pb.set_message(format!("AcceptRate={:.3}", accept_rate));
            last_update = Instant::now();
        }
    }
    chain.finish()?;
    Ok(accept_cnt)
}

/// A trait for "anything that owns multiple MarkovChains".
pub trait HasChains<S> {
    type Chain: MarkovChain<S> + Send;

    fn chains_mut(&mut self) -> &mut Vec<Self::Chain>;
}

/// Runs independent chains in parallel and returns their final states.
pub trait ChainRunner<S>: HasChains<S>
where
    S: Clone + Send,
{
    fn run(&mut self, n_steps: u64) -> Result<Vec<S>, SamplerError> {
        self.chains_mut()
            .par_iter_mut()
            .map(|chain| run_chain::<S, _>(chain, n_steps).map(|_| chain.current_state().clone()))
            .collect()
    }

    fn run_with_progress(&mut self, n_steps: u64) -> Result<Vec<S>, SamplerError> {
        let multi = MultiProgress::new();
        let pb_style = ProgressStyle::default_bar()
            .template("{prefix} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .map_err(|e| SamplerError::InvalidArgument(e.to_string()))?
            .progress_chars("##-");

        self.chains_mut()
            .par_iter_mut()
            .enumerate()
            .map(|(i, chain)| {
                let pb = multi.add(ProgressBar::new(n_steps));
                pb.set_prefix(format!("Chain {i}"));
                pb.set_style(pb_style.clone());

                let result = run_chain_with_progress::<S, _>(chain, n_steps, &pb);
                pb.finish_with_message("Done!");
                result.map(|_| chain.current_state().clone())
            })
            .collect()
    }
}

impl<S: Clone + Send, T: HasChains<S>> ChainRunner<S> for T {}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counts up, accepting every other step.
    struct Counter {
        state: u64,
        begun: bool,
        finished: bool,
    }

    impl MarkovChain<u64> for Counter {
        fn step(&mut self) -> Result<bool, SamplerError> {
            self.state += 1;
            Ok(self.state % 2 == 0)
        }

        fn current_state(&self) -> &u64 {
            &self.state
        }

        fn begin(&mut self) -> Result<(), SamplerError> {
            self.begun = true;
            Ok(())
        }

        fn finish(&mut self) -> Result<(), SamplerError> {
            self.finished = true;
            Ok(())
        }
    }

    struct Counters(Vec<Counter>);

    impl HasChains<u64> for Counters {
        type Chain = Counter;

        fn chains_mut(&mut self) -> &mut Vec<Counter> {
            &mut self.0
        }
    }

    fn counters(n: usize) -> Counters {
        Counters(
            (0..n)
                .map(|i| Counter {
                    state: i as u64 * 100,
                    begun: false,
                    finished: false,
                })
                .collect(),
        )
    }

    #[test]
    fn test_run_chain_calls_hooks() {
        let mut chain = counters(1).0.remove(0);
        assert_eq!(run_chain::<u64, _>(&mut chain, 10).unwrap(), 5);
        assert!(chain.begun && chain.finished);
    }

    #[test]
    fn test_parallel_run_keeps_chain_order() {
        let mut chains = counters(4);
        assert_eq!(chains.run(10).unwrap(), vec![10, 110, 210, 310]);
        assert_eq!(chains.run_with_progress(5).unwrap(), vec![15, 115, 215, 315]);
    }
}

/*!
# Metropolis–Hastings Sampler

This module implements a generic Metropolis–Hastings chain over any state type
`S`, driven by a proposal `P` (see [`MHProposal`]) and an unnormalized
log-density `W` (see [`SamplingWeight`]). [`MetropolisHastings`] bundles
several independent chains that run in parallel through
[`ChainRunner`](crate::core::ChainRunner); chain `i` is seeded with
`seed + i`.

## One iteration

1. The proposal draws a candidate `x'` with forward and backward log proposal
   probabilities `fwd` and `bwd`.
2. The candidate is rejected outright if the weight vetoes it
   ([`SamplingWeight::accept`]), if its log weight is `-inf`, or if `bwd` is
   `-inf`.
3. Otherwise `log α = (w(x') − w(x)) + (bwd − fwd)` and the candidate is
   accepted iff `ln u < log α` for one uniform `u` from the chain's generator.
4. Every registered [`StateProcessor`] sees the resulting state.

A log weight of `NaN` or `+inf` aborts the run with
[`SamplerError::NonFiniteLogWeight`].

## Example Usage

```rust
use std::sync::Arc;
use roundtrips::metropolis_hastings::MHAlgorithm;
use roundtrips::proposal::RoundTripProposal;
use roundtrips::scenario::{Location, ScenarioBuilder};
use roundtrips::simulator::{DefaultSimulator, Simulator};
use roundtrips::weights::{MaximumEntropyPriorFactory, SamplingWeights};

let mut builder = ScenarioBuilder::new(1.0, 24).unwrap();
let home = builder.add_location(Location::new("home")).unwrap();
let work = builder.add_location(Location::new("work")).unwrap();
builder.set_symmetric_time_h(home, work, 0.5).unwrap();
let scenario = Arc::new(builder.build().unwrap());
let simulator: Arc<dyn Simulator> = Arc::new(DefaultSimulator::new(scenario.clone()));

let mut weights = SamplingWeights::new();
weights.add(MaximumEntropyPriorFactory::from_scenario(&scenario).create_single(3.0).unwrap(), 1.0);

let initial = simulator.attach(scenario.create_initial_round_trip(home, 0).unwrap());
let proposal = RoundTripProposal::new(scenario.clone(), simulator);
let mut chain = MHAlgorithm::new(proposal, weights, initial).unwrap().set_seed(42);
chain.run(1_000).unwrap();
assert_eq!(chain.iteration(), 1_000);
```
*/

use ndarray::Array1;
use rand::prelude::*;

use crate::core::{HasChains, MarkovChain};
use crate::error::SamplerError;
use crate::io::StateProcessor;
use crate::proposal::MHProposal;
use crate::stats::{collect_rhat, ChainStats, ChainTracker};
use crate::weights::SamplingWeight;

/// Iterations between two progress log lines unless configured otherwise.
const DEFAULT_MSG_INTERVAL: u64 = 10_000;

/**
Probability of accepting a candidate.

Zero if the candidate or the way back is impossible; one if the current state
is impossible and the candidate is not.
*/
pub fn acceptance_probability(
    current_log_weight: f64,
    candidate_log_weight: f64,
    fwd_log_prob: f64,
    bwd_log_prob: f64,
) -> f64 {
    log_acceptance(current_log_weight, candidate_log_weight, fwd_log_prob, bwd_log_prob)
        .map_or(0.0, |log_alpha| log_alpha.exp().min(1.0))
}

/// `log α` of a candidate, or `None` if it is rejected without drawing a uniform.
fn log_acceptance(
    current_log_weight: f64,
    candidate_log_weight: f64,
    fwd_log_prob: f64,
    bwd_log_prob: f64,
) -> Option<f64> {
    if candidate_log_weight == f64::NEG_INFINITY || bwd_log_prob == f64::NEG_INFINITY {
        return None;
    }
    Some((candidate_log_weight - current_log_weight) + (bwd_log_prob - fwd_log_prob))
}

fn check_log_weight(value: f64) -> Result<f64, SamplerError> {
    if value.is_nan() || value == f64::INFINITY {
        Err(SamplerError::NonFiniteLogWeight { value })
    } else {
        Ok(value)
    }
}

type Features<S> = Box<dyn Fn(&S) -> Vec<f64> + Send>;

/// A single Metropolis–Hastings chain.
pub struct MHAlgorithm<S, P, W> {
    proposal: P,
    weight: W,
    current_state: S,
    current_log_weight: f64,
    /// The chain-specific random seed.
    seed: u64,
    rng: SmallRng,
    processors: Vec<Box<dyn StateProcessor<S>>>,
    msg_interval: u64,
    iteration: u64,
    accept_cnt: u64,
    tracker: ChainTracker,
    features: Option<Features<S>>,
}

impl<S, P, W> MHAlgorithm<S, P, W>
where
    S: Send + 'static,
    P: MHProposal<S>,
    W: SamplingWeight<S>,
{
    /**
    Creates a chain at `initial_state` with a random seed.

    An initial state with log weight `-inf` is allowed (the chain leaves it at
    the first feasible candidate) and only logged.

    # Errors

    Fails if the initial log weight is `NaN` or `+inf`.
    */
    pub fn new(proposal: P, mut weight: W, initial_state: S) -> Result<Self, SamplerError> {
        let current_log_weight = check_log_weight(weight.log_weight(&initial_state))?;
        if current_log_weight == f64::NEG_INFINITY || !weight.accept(&initial_state) {
            log::warn!("initial state is infeasible; the chain starts outside the support");
        }
        let seed = thread_rng().gen::<u64>();
        Ok(Self {
            proposal,
            weight,
            current_state: initial_state,
            current_log_weight,
            seed,
            rng: SmallRng::seed_from_u64(seed),
            processors: Vec::new(),
            msg_interval: DEFAULT_MSG_INTERVAL,
            iteration: 0,
            accept_cnt: 0,
            tracker: ChainTracker::new(0),
            features: None,
        })
    }

    pub fn set_seed(mut self, seed: u64) -> Self {
        self.reseed(seed);
        self
    }

    pub fn reseed(&mut self, seed: u64) {
        self.seed = seed;
        self.rng = SmallRng::seed_from_u64(seed);
    }

    pub fn with_msg_interval(mut self, msg_interval: u64) -> Self {
        assert!(msg_interval > 0, "message interval must be positive");
        self.msg_interval = msg_interval;
        self
    }

    /// Tracks running moments of `n_params` features of the visited states.
    pub fn with_features(
        mut self,
        n_params: usize,
        features: impl Fn(&S) -> Vec<f64> + Send + 'static,
    ) -> Self {
        self.tracker = ChainTracker::new(n_params);
        self.features = Some(Box::new(features));
        self
    }

    pub fn add_state_processor(
        &mut self,
        processor: impl StateProcessor<S> + 'static,
    ) -> &mut Self {
        self.processors.push(Box::new(processor));
        self
    }

    pub fn with_state_processor(mut self, processor: impl StateProcessor<S> + 'static) -> Self {
        self.add_state_processor(processor);
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn current_log_weight(&self) -> f64 {
        self.current_log_weight
    }

    /// Number of completed iterations.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Accepted candidates over all iterations.
    pub fn acceptance_rate(&self) -> f64 {
        if self.iteration == 0 {
            0.0
        } else {
            self.accept_cnt as f64 / self.iteration as f64
        }
    }

    pub fn weight(&self) -> &W {
        &self.weight
    }

    pub fn stats(&self) -> ChainStats {
        self.tracker.stats()
    }

    /// Runs `iterations` iterations; processors are started before and ended after.
    pub fn run(&mut self, iterations: u64) -> Result<(), SamplerError> {
        crate::core::run_chain::<S, _>(self, iterations).map(|_| ())
    }

    pub fn run_with_progress(
        &mut self,
        iterations: u64,
        pb: &indicatif::ProgressBar,
    ) -> Result<(), SamplerError> {
        crate::core::run_chain_with_progress::<S, _>(self, iterations, pb).map(|_| ())
    }

    fn try_accept(
        &mut self,
        candidate: &S,
        fwd_log_prob: f64,
        bwd_log_prob: f64,
    ) -> Result<Option<f64>, SamplerError> {
        if !self.weight.accept(candidate) {
            return Ok(None);
        }
        let candidate_log_weight = check_log_weight(self.weight.log_weight(candidate))?;
        let log_alpha = match log_acceptance(
            self.current_log_weight,
            candidate_log_weight,
            fwd_log_prob,
            bwd_log_prob,
        ) {
            Some(log_alpha) => log_alpha,
            None => return Ok(None),
        };
        let u: f64 = self.rng.gen();
        Ok((u.ln() < log_alpha).then_some(candidate_log_weight))
    }

    fn track(&mut self, accepted: bool) -> Result<(), SamplerError> {
        let x = match &self.features {
            Some(features) => features(&self.current_state),
            None => Vec::new(),
        };
        self.tracker.step(accepted, &x)
    }
}

impl<S, P, W> MarkovChain<S> for MHAlgorithm<S, P, W>
where
    S: Send + 'static,
    P: MHProposal<S>,
    W: SamplingWeight<S>,
{
    fn step(&mut self) -> Result<bool, SamplerError> {
        let transition = self.proposal.new_transition(&self.current_state, &mut self.rng)?;
        let accepted = match self.try_accept(
            &transition.new_state,
            transition.fwd_log_prob,
            transition.bwd_log_prob,
        )? {
            Some(log_weight) => {
                self.current_state = transition.new_state;
                self.current_log_weight = log_weight;
                true
            }
            None => false,
        };
        self.iteration += 1;
        if accepted {
            self.accept_cnt += 1;
        }
        self.track(accepted)?;

        for processor in self.processors.iter_mut() {
            processor.process_state(self.iteration, &self.current_state)?;
        }
        if self.iteration % self.msg_interval == 0 {
            log::info!(
                "iteration {}: log weight {:.4}, acceptance rate {:.3} (last 100: {:.3})",
                self.iteration,
                self.current_log_weight,
                self.acceptance_rate(),
                self.tracker.p_accept()
            );
        }
        Ok(accepted)
    }

    fn current_state(&self) -> &S {
        &self.current_state
    }

    /// Starts the processors; a fresh chain also hands them its initial state as iteration 0.
    fn begin(&mut self) -> Result<(), SamplerError> {
        log::debug!("chain with seed {} starts at iteration {}", self.seed, self.iteration);
        for processor in self.processors.iter_mut() {
            processor.start()?;
            if self.iteration == 0 {
                processor.process_state(0, &self.current_state)?;
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SamplerError> {
        for processor in self.processors.iter_mut() {
            processor.end()?;
        }
        log::info!(
            "chain with seed {} done after {} iterations, acceptance rate {:.3}",
            self.seed,
            self.iteration,
            self.acceptance_rate()
        );
        Ok(())
    }
}

/// Independent chains, run in parallel through [`ChainRunner`](crate::core::ChainRunner).
pub struct MetropolisHastings<S, P, W> {
    pub chains: Vec<MHAlgorithm<S, P, W>>,
    /// The global random seed.
    pub seed: u64,
}

impl<S, P, W> MetropolisHastings<S, P, W>
where
    S: Send + 'static,
    P: MHProposal<S>,
    W: SamplingWeight<S>,
{
    /// Builds `n_chains` chains with `make_chain(i)`.
    pub fn from_fn(
        n_chains: usize,
        make_chain: impl FnMut(usize) -> Result<MHAlgorithm<S, P, W>, SamplerError>,
    ) -> Result<Self, SamplerError> {
        let chains = (0..n_chains).map(make_chain).collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            chains,
            seed: thread_rng().gen::<u64>(),
        })
    }

    /// Seeds chain `i` with `seed + i`, wrapping at `u64::MAX`.
    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        for (i, chain) in self.chains.iter_mut().enumerate() {
            chain.reseed(seed.wrapping_add(i as u64));
        }
        self
    }

    pub fn stats(&self) -> Vec<ChainStats> {
        self.chains.iter().map(MHAlgorithm::stats).collect()
    }

    /// R-hat of the tracked features across chains.
    pub fn rhat(&self) -> Result<Array1<f64>, SamplerError> {
        let stats = self.stats();
        collect_rhat(&stats.iter().collect::<Vec<_>>())
    }
}

impl<S, P, W> HasChains<S> for MetropolisHastings<S, P, W>
where
    S: Send + 'static,
    P: MHProposal<S>,
    W: SamplingWeight<S>,
{
    type Chain = MHAlgorithm<S, P, W>;

    fn chains_mut(&mut self) -> &mut Vec<Self::Chain> {
        &mut self.chains
    }
}

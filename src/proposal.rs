/*!
Proposal mechanisms for the Metropolis–Hastings engine.

A proposal turns the current state into an [`MHTransition`]: a candidate
state together with the log probability of proposing it (forward) and the log
probability of proposing the way back (backward). A backward log probability
of `-inf` marks a candidate that cannot be undone; the engine never accepts it.

- [`RoundTripProposal`] applies one insert, remove or flip move drawn from
  [`PossibleTransitions`].
- [`DepartureProposal`] moves one departure to another unused time bin.
- [`MixtureProposal`] picks one of several proposals at random.

# Examples

```rust
use std::sync::Arc;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use roundtrips::proposal::{MHProposal, RoundTripProposal};
use roundtrips::scenario::{Location, ScenarioBuilder};
use roundtrips::simulator::DefaultSimulator;

let mut builder = ScenarioBuilder::new(1.0, 24).unwrap();
let a = builder.add_location(Location::new("A")).unwrap();
let b = builder.add_location(Location::new("B")).unwrap();
builder.set_symmetric_time_h(a, b, 0.5).unwrap();
let scenario = Arc::new(builder.build().unwrap());

let simulator = Arc::new(DefaultSimulator::new(scenario.clone()));
let proposal = RoundTripProposal::new(scenario.clone(), simulator);
let start = scenario.create_initial_round_trip(a, 0).unwrap();

let mut rng = SmallRng::seed_from_u64(42);
let transition = proposal.new_transition(&start, &mut rng).unwrap();
assert!(transition.fwd_log_prob.is_finite());
assert!(!transition.new_state.episodes().is_empty());
```
*/

use rand::rngs::SmallRng;
use rand::Rng;
use rand_distr::{Distribution, WeightedIndex};
use std::sync::Arc;

use crate::error::SamplerError;
use crate::round_trip::RoundTrip;
use crate::scenario::Scenario;
use crate::simulator::Simulator;
use crate::transitions::{nth_free_departure, PossibleTransitions};

/// A proposed candidate with its forward and backward log proposal probabilities.
#[derive(Debug, Clone, PartialEq)]
pub struct MHTransition<S> {
    pub new_state: S,
    pub fwd_log_prob: f64,
    pub bwd_log_prob: f64,
}

impl<S> MHTransition<S> {
    pub fn new(new_state: S, fwd_log_prob: f64, bwd_log_prob: f64) -> Self {
        Self {
            new_state,
            fwd_log_prob,
            bwd_log_prob,
        }
    }
}

/// A trait for generating candidate states in Metropolis–Hastings.
pub trait MHProposal<S>: Send {
    /// Draws a candidate from `from` using the chain's random number generator.
    fn new_transition(&self, from: &S, rng: &mut SmallRng) -> Result<MHTransition<S>, SamplerError>;
}

impl<S, P: MHProposal<S> + Sync + ?Sized> MHProposal<S> for Arc<P> {
    fn new_transition(
        &self,
        from: &S,
        rng: &mut SmallRng,
    ) -> Result<MHTransition<S>, SamplerError> {
        (**self).new_transition(from, rng)
    }
}

/// Insert, remove and flip moves on a single round trip.
#[derive(Clone)]
pub struct RoundTripProposal {
    scenario: Arc<Scenario>,
    simulator: Arc<dyn Simulator>,
}

impl RoundTripProposal {
    pub fn new(scenario: Arc<Scenario>, simulator: Arc<dyn Simulator>) -> Self {
        Self {
            scenario,
            simulator,
        }
    }
}

impl MHProposal<RoundTrip> for RoundTripProposal {
    fn new_transition(
        &self,
        from: &RoundTrip,
        rng: &mut SmallRng,
    ) -> Result<MHTransition<RoundTrip>, SamplerError> {
        let fwd_transitions = PossibleTransitions::new(from, &self.scenario);
        let mv = fwd_transitions.draw(from, rng)?;
        let fwd_proba = fwd_transitions.move_proba(from, &mv);
        debug_assert!(fwd_proba > 0.0, "drew illegal move {:?}", mv);

        let candidate = mv.apply(from);
        let reverse = mv.reverse(from);
        let bwd_proba =
            PossibleTransitions::new(&candidate, &self.scenario).move_proba(&candidate, &reverse);

        Ok(MHTransition::new(
            self.simulator.attach(candidate),
            fwd_proba.ln(),
            bwd_proba.ln(),
        ))
    }
}

/// Moves one uniformly chosen departure to a uniformly chosen unused bin.
///
/// The move is symmetric. A round trip that uses every bin is proposed unchanged.
#[derive(Clone)]
pub struct DepartureProposal {
    scenario: Arc<Scenario>,
    simulator: Arc<dyn Simulator>,
}

impl DepartureProposal {
    pub fn new(scenario: Arc<Scenario>, simulator: Arc<dyn Simulator>) -> Self {
        Self {
            scenario,
            simulator,
        }
    }
}

impl MHProposal<RoundTrip> for DepartureProposal {
    fn new_transition(
        &self,
        from: &RoundTrip,
        rng: &mut SmallRng,
    ) -> Result<MHTransition<RoundTrip>, SamplerError> {
        let n = from.size();
        let free = self.scenario.time_bin_cnt() - n;
        if free == 0 {
            return Ok(MHTransition::new(from.clone(), 0.0, 0.0));
        }
        let index = rng.gen_range(0..n);
        let bin = nth_free_departure(from, rng.gen_range(0..free));
        let mut candidate = from.clone();
        candidate.set_departure(index, bin);

        let log_proba = -(n as f64).ln() - (free as f64).ln();
        Ok(MHTransition::new(
            self.simulator.attach(candidate),
            log_proba,
            log_proba,
        ))
    }
}

/**
Random choice among several proposals.

Component `k` is used with probability `w_k / Σ w`; `ln(w_k / Σ w)` is added to
both the forward and the backward log probability. The components must propose
disjoint sets of candidates from any state.
*/
pub struct MixtureProposal<S> {
    components: Vec<Box<dyn MHProposal<S>>>,
    log_probas: Vec<f64>,
    index: WeightedIndex<f64>,
}

impl<S> MixtureProposal<S> {
    /// # Errors
    ///
    /// Fails if there are no components or a weight is negative, non-finite, or all are zero.
    pub fn new(components: Vec<(Box<dyn MHProposal<S>>, f64)>) -> Result<Self, SamplerError> {
        let weights: Vec<f64> = components.iter().map(|(_, w)| *w).collect();
        let index = WeightedIndex::new(&weights)
            .map_err(|e| SamplerError::InvalidArgument(format!("mixture weights: {e}")))?;
        let total: f64 = weights.iter().sum();
        Ok(Self {
            components: components.into_iter().map(|(c, _)| c).collect(),
            log_probas: weights.iter().map(|w| (w / total).ln()).collect(),
            index,
        })
    }
}

impl<S> MHProposal<S> for MixtureProposal<S> {
    fn new_transition(
        &self,
        from: &S,
        rng: &mut SmallRng,
    ) -> Result<MHTransition<S>, SamplerError> {
        let k = self.index.sample(rng);
        let mut transition = self.components[k].new_transition(from, rng)?;
        transition.fwd_log_prob += self.log_probas[k];
        transition.bwd_log_prob += self.log_probas[k];
        Ok(transition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{Location, LocationId, ScenarioBuilder};
    use crate::simulator::DefaultSimulator;
    use crate::transitions::PossibleTransitions;
    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;

    const SEED: u64 = 42;

    fn setup(time_bin_cnt: usize) -> (Arc<Scenario>, Arc<dyn Simulator>) {
        let mut builder = ScenarioBuilder::new(24.0 / time_bin_cnt as f64, time_bin_cnt).unwrap();
        let ids: Vec<LocationId> = ["A", "B", "C"]
            .iter()
            .map(|name| builder.add_location(Location::new(*name)).unwrap())
            .collect();
        for &a in &ids {
            for &b in &ids {
                if a != b {
                    builder.set_time_h(a, b, 0.5).unwrap();
                }
            }
        }
        let scenario = Arc::new(builder.build().unwrap());
        let simulator: Arc<dyn Simulator> = Arc::new(DefaultSimulator::new(scenario.clone()));
        (scenario, simulator)
    }

    #[test]
    fn test_round_trip_proposal_probabilities_are_exact() {
        let (scenario, simulator) = setup(24);
        let proposal = RoundTripProposal::new(scenario.clone(), simulator.clone());
        let mut rng = SmallRng::seed_from_u64(SEED);
        let mut state =
            simulator.attach(scenario.create_initial_round_trip(LocationId(0), 3).unwrap());

        for _ in 0..500 {
            let transition = proposal.new_transition(&state, &mut rng).unwrap();
            let candidate = &transition.new_state;
            let expected_episodes = if candidate.size() == 1 { 1 } else { 2 * candidate.size() };
            assert_eq!(candidate.episodes().len(), expected_episodes);

            assert!(transition.fwd_log_prob.is_finite());
            if transition.bwd_log_prob == f64::NEG_INFINITY {
                continue;
            }

            // A reversible candidate is reached by exactly one move.
            let pt = PossibleTransitions::new(&state, &scenario);
            let fwd: f64 = pt
                .enumerate_moves(&state)
                .iter()
                .filter(|mv| mv.apply(&state) == *candidate)
                .map(|mv| pt.move_proba(&state, mv))
                .sum();
            assert_abs_diff_eq!(transition.fwd_log_prob, fwd.ln(), epsilon = 1e-9);

            let back = PossibleTransitions::new(candidate, &scenario);
            let bwd: f64 = back
                .enumerate_moves(candidate)
                .iter()
                .filter(|mv| mv.apply(candidate) == state)
                .map(|mv| back.move_proba(candidate, mv))
                .sum();
            assert_abs_diff_eq!(transition.bwd_log_prob, bwd.ln(), epsilon = 1e-9);
            state = transition.new_state;
        }
    }

    #[test]
    fn test_departure_proposal_is_symmetric() {
        let (scenario, simulator) = setup(12);
        let proposal = DepartureProposal::new(scenario, simulator.clone());
        let start = RoundTrip::new(vec![LocationId(0), LocationId(1)], vec![2, 7]).unwrap();
        let start = simulator.attach(start);
        let mut rng = SmallRng::seed_from_u64(SEED);
        for _ in 0..50 {
            let t = proposal.new_transition(&start, &mut rng).unwrap();
            assert_abs_diff_eq!(t.fwd_log_prob, -(2.0f64.ln() + 10.0f64.ln()));
            assert_eq!(t.fwd_log_prob, t.bwd_log_prob);
            assert_eq!(t.new_state.locations(), start.locations());
            assert_ne!(t.new_state.departures(), start.departures());
        }
    }

    #[test]
    fn test_departure_proposal_full_round_trip() {
        let (scenario, simulator) = setup(2);
        let proposal = DepartureProposal::new(scenario, simulator);
        let start = RoundTrip::new(vec![LocationId(0), LocationId(1)], vec![0, 1]).unwrap();
        let mut rng = SmallRng::seed_from_u64(SEED);
        let t = proposal.new_transition(&start, &mut rng).unwrap();
        assert_eq!(t.new_state, start);
        assert_eq!(t.fwd_log_prob, 0.0);
    }

    #[test]
    fn test_mixture_adds_selection_probability() {
        let (scenario, simulator) = setup(12);
        let start = RoundTrip::new(vec![LocationId(0), LocationId(1)], vec![2, 7]).unwrap();
        let start = simulator.attach(start);
        let departure: Box<dyn MHProposal<RoundTrip>> =
            Box::new(DepartureProposal::new(scenario.clone(), simulator.clone()));
        let structure: Box<dyn MHProposal<RoundTrip>> =
            Box::new(RoundTripProposal::new(scenario, simulator));
        let mixture = MixtureProposal::new(vec![(departure, 3.0), (structure, 1.0)]).unwrap();
        let mut rng = SmallRng::seed_from_u64(SEED);
        let departure_log = -(2.0f64.ln() + 10.0f64.ln()) + 0.75f64.ln();
        let mut departure_moves = 0;
        for _ in 0..2_000 {
            let t = mixture.new_transition(&start, &mut rng).unwrap();
            if t.new_state.locations() == start.locations() {
                departure_moves += 1;
                assert_abs_diff_eq!(t.fwd_log_prob, departure_log, epsilon = 1e-12);
            }
        }
        assert!(
            (departure_moves as f64 / 2_000.0 - 0.75).abs() < 0.05,
            "Departure share {departure_moves}"
        );
    }

    #[test]
    fn test_mixture_rejects_bad_weights() {
        let result: Result<MixtureProposal<RoundTrip>, _> = MixtureProposal::new(Vec::new());
        assert!(result.is_err());
    }
}

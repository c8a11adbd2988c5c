//! Tests verifying that the round-trip sampler targets the right distribution.
//!
//! The state space of a scenario with three locations, four time bins and at
//! most three stays is small enough to enumerate, so the empirical state and
//! size frequencies of a chain can be compared with the exact normalized weights.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use roundtrips::io::{SampleCollector, SamplingSchedule};
use roundtrips::metropolis_hastings::MHAlgorithm;
use roundtrips::proposal::{DepartureProposal, MHProposal, MixtureProposal, RoundTripProposal};
use roundtrips::round_trip::RoundTrip;
use roundtrips::scenario::{Location, LocationId, Scenario, ScenarioBuilder};
use roundtrips::simulator::{DefaultSimulator, Simulator};
use roundtrips::transitions::PossibleTransitions;
use roundtrips::weights::{MaximumEntropyPriorFactory, SamplingWeight, SamplingWeights};

type Key = (Vec<LocationId>, Vec<usize>);

/// Prefers stays at location `C`.
struct PreferC;

impl SamplingWeight<RoundTrip> for PreferC {
    fn log_weight(&mut self, state: &RoundTrip) -> f64 {
        0.7 * state.locations().iter().filter(|&&l| l == LocationId(2)).count() as f64
    }
}

/// Forbids stays at location `C`.
struct NoC;

impl SamplingWeight<RoundTrip> for NoC {
    fn log_weight(&mut self, _state: &RoundTrip) -> f64 {
        0.0
    }

    fn accept(&mut self, state: &RoundTrip) -> bool {
        !state.locations().contains(&LocationId(2))
    }
}

fn scenario() -> Arc<Scenario> {
    let mut builder = ScenarioBuilder::new(1.0, 4).unwrap();
    let a = builder.add_location(Location::new("A")).unwrap();
    let b = builder.add_location(Location::new("B")).unwrap();
    let c = builder.add_location(Location::new("C")).unwrap();
    builder
        .set_symmetric_time_h(a, b, 0.25)
        .unwrap()
        .set_symmetric_time_h(a, c, 0.5)
        .unwrap()
        .set_symmetric_time_h(b, c, 0.25)
        .unwrap();
    builder.max_stay_episodes(3).unwrap();
    Arc::new(builder.build().unwrap())
}

fn key(rt: &RoundTrip) -> Key {
    (rt.locations().to_vec(), rt.departures().to_vec())
}

/// Every round trip reachable from `initial` through legal structural moves.
fn reachable(scenario: &Scenario, initial: &RoundTrip) -> Vec<RoundTrip> {
    let mut seen = HashSet::from([initial.clone()]);
    let mut queue = VecDeque::from([initial.clone()]);
    while let Some(state) = queue.pop_front() {
        for mv in PossibleTransitions::new(&state, scenario).enumerate_moves(&state) {
            let next = mv.apply(&state);
            if seen.insert(next.clone()) {
                queue.push_back(next);
            }
        }
    }
    seen.into_iter().collect()
}

/// Normalized `exp(log_weight)` over `states`.
fn exact_distribution(
    states: &[RoundTrip],
    weight: &mut impl SamplingWeight<RoundTrip>,
) -> HashMap<Key, f64> {
    let log_weights: Vec<f64> = states.iter().map(|rt| weight.log_weight(rt)).collect();
    let max = log_weights.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let total: f64 = log_weights.iter().map(|lw| (lw - max).exp()).sum();
    states
        .iter()
        .zip(&log_weights)
        .map(|(rt, lw)| (key(rt), (lw - max).exp() / total))
        .collect()
}

fn empirical_distribution(samples: &[Key]) -> HashMap<Key, f64> {
    let mut freqs = HashMap::new();
    for k in samples {
        *freqs.entry(k.clone()).or_insert(0.0) += 1.0 / samples.len() as f64;
    }
    freqs
}

fn size_marginal(dist: &HashMap<Key, f64>, max_size: usize) -> Vec<f64> {
    let mut marginal = vec![0.0; max_size + 1];
    for ((locations, _), p) in dist {
        marginal[locations.len()] += p;
    }
    marginal
}

fn total_variation(p: &HashMap<Key, f64>, q: &HashMap<Key, f64>) -> f64 {
    let keys: HashSet<&Key> = p.keys().chain(q.keys()).collect();
    0.5 * keys
        .into_iter()
        .map(|k| (p.get(k).unwrap_or(&0.0) - q.get(k).unwrap_or(&0.0)).abs())
        .sum::<f64>()
}

fn weights(scenario: &Scenario) -> SamplingWeights<RoundTrip> {
    let prior = MaximumEntropyPriorFactory::from_scenario(scenario)
        .create_single(1.5)
        .unwrap();
    SamplingWeights::new().with(prior, 1.0).with(PreferC, 1.0)
}

/// Runs a chain and returns the sampled states after burn-in.
fn sample<P: MHProposal<RoundTrip>>(
    proposal: P,
    weight: impl SamplingWeight<RoundTrip> + 'static,
    initial: RoundTrip,
    iterations: u64,
    burn_in: u64,
    seed: u64,
) -> Vec<Key> {
    let collector =
        SampleCollector::new(SamplingSchedule::new(burn_in, 1), |rt: &RoundTrip| key(rt));
    let samples = collector.handle();
    let mut mh = MHAlgorithm::new(proposal, weight, initial)
        .unwrap()
        .set_seed(seed)
        .with_state_processor(collector);
    mh.run(iterations).unwrap();
    let samples = samples.lock().unwrap().clone();
    samples
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_SIZE: u64 = 200_000;
    const BURNIN: u64 = 2_000;
    const SEED: u64 = 42;

    #[test]
    fn test_state_space_is_fully_reachable() {
        let scenario = scenario();
        let initial = scenario.create_initial_round_trip(LocationId(0), 0).unwrap();
        let states = reachable(&scenario, &initial);

        // 3 · 4 of size one, 6 · C(4, 2) of size two, 6 · C(4, 3) of size three.
        assert_eq!(states.len(), 12 + 36 + 24);
        for rt in &states {
            rt.validate(&scenario).unwrap();
            let transitions = PossibleTransitions::new(rt, &scenario);
            let total: f64 = transitions
                .enumerate_moves(rt)
                .iter()
                .map(|mv| transitions.move_proba(rt, mv))
                .sum();
            assert!((total - 1.0).abs() < 1e-12, "move probabilities from {rt} sum to {total}");
        }
    }

    #[test]
    fn test_structural_moves_reach_stationarity() {
        let scenario = scenario();
        let simulator: Arc<dyn Simulator> = Arc::new(DefaultSimulator::new(scenario.clone()));
        let initial =
            simulator.attach(scenario.create_initial_round_trip(LocationId(0), 0).unwrap());

        let exact = exact_distribution(&reachable(&scenario, &initial), &mut weights(&scenario));
        let samples = sample(
            RoundTripProposal::new(scenario.clone(), simulator),
            weights(&scenario),
            initial,
            SAMPLE_SIZE + BURNIN,
            BURNIN,
            SEED,
        );
        let empirical = empirical_distribution(&samples);

        let tv = total_variation(&exact, &empirical);
        assert!(tv < 0.05, "Total variation distance too large: {tv}");

        let exact_sizes = size_marginal(&exact, 3);
        let empirical_sizes = size_marginal(&empirical, 3);
        for size in 1..=3 {
            assert!(
                (exact_sizes[size] - empirical_sizes[size]).abs() < 0.02,
                "Size {} frequency {} deviates from {}",
                size,
                empirical_sizes[size],
                exact_sizes[size]
            );
        }
    }

    #[test]
    fn test_mixed_proposal_reaches_stationarity() {
        let scenario = scenario();
        let simulator: Arc<dyn Simulator> = Arc::new(DefaultSimulator::new(scenario.clone()));
        let initial =
            simulator.attach(scenario.create_initial_round_trip(LocationId(1), 2).unwrap());

        let exact = exact_distribution(&reachable(&scenario, &initial), &mut weights(&scenario));
        let structure: Box<dyn MHProposal<RoundTrip>> =
            Box::new(RoundTripProposal::new(scenario.clone(), simulator.clone()));
        let timing: Box<dyn MHProposal<RoundTrip>> =
            Box::new(DepartureProposal::new(scenario.clone(), simulator));
        let proposal = MixtureProposal::new(vec![(structure, 0.7), (timing, 0.3)]).unwrap();

        let samples = sample(
            proposal,
            weights(&scenario),
            initial,
            SAMPLE_SIZE + BURNIN,
            BURNIN,
            SEED + 1,
        );
        let tv = total_variation(&exact, &empirical_distribution(&samples));
        assert!(tv < 0.05, "Total variation distance too large: {tv}");
    }

    #[test]
    fn test_hard_rejection_is_never_accepted() {
        let scenario = scenario();
        let simulator: Arc<dyn Simulator> = Arc::new(DefaultSimulator::new(scenario.clone()));
        let initial =
            simulator.attach(scenario.create_initial_round_trip(LocationId(0), 0).unwrap());

        let weight = weights(&scenario).with(NoC, 1.0);
        let samples = sample(
            RoundTripProposal::new(scenario.clone(), simulator),
            weight,
            initial,
            20_000,
            0,
            SEED,
        );
        assert_eq!(samples.len(), 20_001);
        assert!(
            samples.iter().all(|(locations, _)| !locations.contains(&LocationId(2))),
            "A round trip visiting the forbidden location was accepted"
        );
        assert!(
            samples.iter().any(|(locations, _)| locations.len() == 2),
            "The chain never left its initial size"
        );
    }
}

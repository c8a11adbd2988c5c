/*!
Proposals on a population, built from a single-round-trip proposal.

With [`SlotSelection::Single`] one uniformly chosen slot is changed and
`ln(1/N)` enters both proposal probabilities. With
[`SlotSelection::Bernoulli`] every slot is changed independently with
probability `p ≥ 1/N`, redrawing until at least one slot changes; the
probabilities then carry `ln p` per changed slot, `ln(1 − p)` per unchanged
slot, and the normalization `−ln(1 − (1 − p)^N)`.
*/

use rand::rngs::SmallRng;
use rand::Rng;
use rand_distr::{Bernoulli, Distribution};

use crate::error::SamplerError;
use crate::multiple::MultiRoundTrip;
use crate::proposal::{MHProposal, MHTransition};
use crate::round_trip::RoundTrip;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SlotSelection {
    /// Change exactly one uniformly chosen slot.
    Single,
    /// Change each slot with probability `max(p, 1/N)`.
    Bernoulli(f64),
}

#[derive(Debug, Clone)]
pub struct MultiRoundTripProposal<P> {
    single: P,
    selection: SlotSelection,
}

impl<P: MHProposal<RoundTrip>> MultiRoundTripProposal<P> {
    pub fn new(single: P, selection: SlotSelection) -> Self {
        Self { single, selection }
    }

    fn single_slot(
        &self,
        from: &MultiRoundTrip,
        rng: &mut SmallRng,
    ) -> Result<MHTransition<MultiRoundTrip>, SamplerError> {
        let n = from.size();
        let i = rng.gen_range(0..n);
        let transition = self.single.new_transition(from.round_trip(i), rng)?;
        let mut to = from.clone();
        to.set_round_trip(i, transition.new_state);
        let log_select = -(n as f64).ln();
        Ok(MHTransition::new(
            to,
            log_select + transition.fwd_log_prob,
            log_select + transition.bwd_log_prob,
        ))
    }

    fn bernoulli_slots(
        &self,
        from: &MultiRoundTrip,
        rng: &mut SmallRng,
        flip_proba: f64,
    ) -> Result<MHTransition<MultiRoundTrip>, SamplerError> {
        let n = from.size();
        let p = flip_proba.max(1.0 / n as f64).min(1.0);
        let flip = Bernoulli::new(p)
            .map_err(|e| SamplerError::InvalidArgument(format!("flip probability {p}: {e}")))?;

        let selected: Vec<usize> = loop {
            let selected: Vec<usize> = (0..n).filter(|_| flip.sample(rng)).collect();
            if !selected.is_empty() {
                break selected;
            }
        };

        let mut to = from.clone();
        let mut fwd_log_prob = 0.0;
        let mut bwd_log_prob = 0.0;
        for &i in &selected {
            let transition = self.single.new_transition(from.round_trip(i), rng)?;
            to.set_round_trip(i, transition.new_state);
            fwd_log_prob += p.ln() + transition.fwd_log_prob;
            bwd_log_prob += p.ln() + transition.bwd_log_prob;
        }
        let unchanged = (n - selected.len()) as f64;
        if unchanged > 0.0 {
            fwd_log_prob += unchanged * (1.0 - p).ln();
            bwd_log_prob += unchanged * (1.0 - p).ln();
        }
        let at_least_one = (1.0 - (1.0 - p).powi(n as i32)).ln();
        Ok(MHTransition::new(
            to,
            fwd_log_prob - at_least_one,
            bwd_log_prob - at_least_one,
        ))
    }
}

impl<P: MHProposal<RoundTrip>> MHProposal<MultiRoundTrip> for MultiRoundTripProposal<P> {
    fn new_transition(
        &self,
        from: &MultiRoundTrip,
        rng: &mut SmallRng,
    ) -> Result<MHTransition<MultiRoundTrip>, SamplerError> {
        match self.selection {
            SlotSelection::Single => self.single_slot(from, rng),
            SlotSelection::Bernoulli(p) => self.bernoulli_slots(from, rng, p),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multiple::OdFlows;
    use crate::proposal::RoundTripProposal;
    use crate::scenario::{Location, LocationId, Scenario, ScenarioBuilder};
    use crate::simulator::{DefaultSimulator, Simulator};
    use crate::transitions::PossibleTransitions;
    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;
    use std::sync::Arc;

    const SEED: u64 = 42;

    fn setup() -> (Arc<Scenario>, Arc<dyn Simulator>, MultiRoundTrip) {
        let mut builder = ScenarioBuilder::new(1.0, 24).unwrap();
        let a = builder.add_location(Location::new("A")).unwrap();
        let b = builder.add_location(Location::new("B")).unwrap();
        builder.set_symmetric_time_h(a, b, 0.5).unwrap();
        let scenario = Arc::new(builder.build().unwrap());
        let simulator: Arc<dyn Simulator> = Arc::new(DefaultSimulator::new(scenario.clone()));
        let mut rng = SmallRng::seed_from_u64(SEED);
        let population = MultiRoundTrip::create_initial(
            &scenario,
            simulator.as_ref(),
            &[a, b],
            &[0, 8],
            5,
            &mut rng,
        )
        .unwrap()
        .with_summary(OdFlows::new(2));
        (scenario, simulator, population)
    }

    #[test]
    fn test_single_slot_changes_one_round_trip() {
        let (scenario, simulator, population) = setup();
        let proposal = MultiRoundTripProposal::new(
            RoundTripProposal::new(scenario, simulator),
            SlotSelection::Single,
        );
        let mut rng = SmallRng::seed_from_u64(SEED);
        for _ in 0..100 {
            let t = proposal.new_transition(&population, &mut rng).unwrap();
            let changed = population
                .iter()
                .zip(t.new_state.iter())
                .filter(|(a, b)| a != b)
                .count();
            assert_eq!(changed, 1);
            assert!(t.fwd_log_prob < -(5.0f64).ln() + 1e-12);
        }
    }

    #[test]
    fn test_bernoulli_changes_at_least_one_and_keeps_summaries() {
        let (scenario, simulator, population) = setup();
        let proposal = MultiRoundTripProposal::new(
            RoundTripProposal::new(scenario, simulator),
            SlotSelection::Bernoulli(0.0),
        );
        let mut rng = SmallRng::seed_from_u64(SEED);
        let mut state = population;
        for _ in 0..200 {
            let t = proposal.new_transition(&state, &mut rng).unwrap();
            assert!(state.iter().zip(t.new_state.iter()).any(|(a, b)| a != b));
            let expected = OdFlows::from_round_trips(2, t.new_state.round_trips());
            assert_eq!(t.new_state.summary::<OdFlows>(), Some(&expected));
            if t.bwd_log_prob.is_finite() {
                state = t.new_state;
            }
        }
    }

    #[test]
    fn test_bernoulli_probability_with_single_slot() {
        let (scenario, simulator, _) = setup();
        let proposal = MultiRoundTripProposal::new(
            RoundTripProposal::new(scenario.clone(), simulator.clone()),
            SlotSelection::Bernoulli(0.3),
        );
        let population = MultiRoundTrip::new(vec![simulator.attach(
            scenario.create_initial_round_trip(LocationId(0), 0).unwrap(),
        )])
        .unwrap();

        // With one slot p = 1, so the probabilities equal the single proposal's.
        let mut rng = SmallRng::seed_from_u64(SEED);
        let from = population.round_trip(0);
        let pt = PossibleTransitions::new(from, &scenario);
        for _ in 0..20 {
            let t = proposal.new_transition(&population, &mut rng).unwrap();
            let to = t.new_state.round_trip(0);
            let expected: f64 = pt
                .enumerate_moves(from)
                .iter()
                .filter(|mv| mv.apply(from) == *to)
                .map(|mv| pt.move_proba(from, mv))
                .sum();
            assert_abs_diff_eq!(t.fwd_log_prob, expected.ln(), epsilon = 1e-12);
        }
    }
}

/*!
Populations of round trips.

A [`MultiRoundTrip`] is a fixed number of round-trip slots, one per synthetic
traveler, plus any number of [`MultiRoundTripSummary`] aggregates. Replacing a
slot through [`MultiRoundTrip::set_round_trip`] subtracts the old round trip
from every summary and adds the new one, so aggregates never need a full
recomputation during sampling.

Cloning a population clones its summaries, which makes snapshot-and-restore a
plain value copy.
*/

pub mod grouping;
pub mod proposal;
pub mod summary;

use rand::Rng;
use std::fmt;

use crate::error::ScenarioError;
use crate::round_trip::RoundTrip;
use crate::scenario::{LocationId, Scenario};
use crate::simulator::Simulator;
pub use grouping::{PopulationGroupFilter, PopulationGrouping};
pub use proposal::{MultiRoundTripProposal, SlotSelection};
pub use summary::{ByPopulationGroupSummary, MultiRoundTripSummary, OdFlows};

pub struct MultiRoundTrip {
    round_trips: Vec<RoundTrip>,
    summaries: Vec<Box<dyn MultiRoundTripSummary>>,
}

impl MultiRoundTrip {
    /// # Errors
    ///
    /// Fails if `round_trips` is empty.
    pub fn new(round_trips: Vec<RoundTrip>) -> Result<Self, ScenarioError> {
        if round_trips.is_empty() {
            return Err(ScenarioError::InvalidRoundTrip(
                "a population needs at least one round trip".to_string(),
            ));
        }
        Ok(Self {
            round_trips,
            summaries: Vec::new(),
        })
    }

    /**
    Creates `size` single-stay round trips, each at a location drawn uniformly
    from `locations` and departing in a bin drawn uniformly from `departures`.

    # Errors

    Fails if `size` is zero, if either candidate list is empty, or if a
    candidate is not valid in `scenario`.
    */
    pub fn create_initial<R: Rng + ?Sized>(
        scenario: &Scenario,
        simulator: &dyn Simulator,
        locations: &[LocationId],
        departures: &[usize],
        size: usize,
        rng: &mut R,
    ) -> Result<Self, ScenarioError> {
        if locations.is_empty() || departures.is_empty() {
            return Err(ScenarioError::InvalidRoundTrip(
                "initial locations and departures must not be empty".to_string(),
            ));
        }
        let round_trips = (0..size)
            .map(|_| {
                let location = locations[rng.gen_range(0..locations.len())];
                let departure = departures[rng.gen_range(0..departures.len())];
                scenario
                    .create_initial_round_trip(location, departure)
                    .map(|rt| simulator.attach(rt))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(round_trips)
    }

    /// Registers `summary` and fills it from the current round trips.
    pub fn add_summary(&mut self, mut summary: Box<dyn MultiRoundTripSummary>) {
        summary.clear();
        for (i, rt) in self.round_trips.iter().enumerate() {
            summary.add(i, rt);
        }
        self.summaries.push(summary);
    }

    pub fn with_summary<T: MultiRoundTripSummary + 'static>(mut self, summary: T) -> Self {
        self.add_summary(Box::new(summary));
        self
    }

    /// The first registered summary of type `T`.
    pub fn summary<T: MultiRoundTripSummary + 'static>(&self) -> Option<&T> {
        self.summaries
            .iter()
            .find_map(|s| s.as_any().downcast_ref::<T>())
    }

    pub fn size(&self) -> usize {
        self.round_trips.len()
    }

    pub fn round_trip(&self, i: usize) -> &RoundTrip {
        &self.round_trips[i]
    }

    pub fn round_trips(&self) -> &[RoundTrip] {
        &self.round_trips
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RoundTrip> {
        self.round_trips.iter()
    }

    /// Total number of stays over all round trips.
    pub fn stay_cnt(&self) -> usize {
        self.round_trips.iter().map(RoundTrip::size).sum()
    }

    /// Replaces slot `i`, updating every summary, and returns the old round trip.
    pub fn set_round_trip(&mut self, i: usize, round_trip: RoundTrip) -> RoundTrip {
        for summary in self.summaries.iter_mut() {
            summary.remove(i, &self.round_trips[i]);
            summary.add(i, &round_trip);
        }
        std::mem::replace(&mut self.round_trips[i], round_trip)
    }

    /// Rebuilds every summary from scratch.
    pub fn recompute_summaries(&mut self) {
        for summary in self.summaries.iter_mut() {
            summary.clear();
            for (i, rt) in self.round_trips.iter().enumerate() {
                summary.add(i, rt);
            }
        }
    }
}

impl Clone for MultiRoundTrip {
    fn clone(&self) -> Self {
        Self {
            round_trips: self.round_trips.clone(),
            summaries: self.summaries.iter().map(|s| s.box_clone()).collect(),
        }
    }
}

impl PartialEq for MultiRoundTrip {
    fn eq(&self, other: &Self) -> bool {
        self.round_trips == other.round_trips
    }
}

impl fmt::Debug for MultiRoundTrip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiRoundTrip")
            .field("round_trips", &self.round_trips)
            .field("summaries", &self.summaries)
            .finish()
    }
}

impl fmt::Display for MultiRoundTrip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, rt) in self.round_trips.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "({rt})")?;
        }
        f.write_str("}")
    }
}

impl<'a> IntoIterator for &'a MultiRoundTrip {
    type Item = &'a RoundTrip;
    type IntoIter = std::slice::Iter<'a, RoundTrip>;

    fn into_iter(self) -> Self::IntoIter {
        self.round_trips.iter()
    }
}

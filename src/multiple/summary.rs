//! Incrementally maintained aggregates over a population of round trips.

use ndarray::Array2;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use crate::multiple::grouping::PopulationGrouping;
use crate::round_trip::RoundTrip;
use crate::scenario::LocationId;

/// An aggregate that a [`MultiRoundTrip`](super::MultiRoundTrip) keeps in sync
/// with its slots. `add` and `remove` must be exact inverses.
pub trait MultiRoundTripSummary: Send + Sync + fmt::Debug {
    fn clear(&mut self);

    fn add(&mut self, index: usize, round_trip: &RoundTrip);

    fn remove(&mut self, index: usize, round_trip: &RoundTrip);

    fn box_clone(&self) -> Box<dyn MultiRoundTripSummary>;

    fn as_any(&self) -> &dyn Any;
}

/**
Origin–destination move counts.

Every move between consecutive stays of a round trip with at least two stays
contributes one count to its (origin, destination) cell. Round trips with a
single stay make no moves and are counted separately.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OdFlows {
    counts: Array2<usize>,
    single_stay_cnt: usize,
}

impl OdFlows {
    pub fn new(location_cnt: usize) -> Self {
        Self {
            counts: Array2::zeros((location_cnt, location_cnt)),
            single_stay_cnt: 0,
        }
    }

    /// Builds the summary from scratch.
    pub fn from_round_trips<'a>(
        location_cnt: usize,
        round_trips: impl IntoIterator<Item = &'a RoundTrip>,
    ) -> Self {
        let mut flows = Self::new(location_cnt);
        for (i, rt) in round_trips.into_iter().enumerate() {
            flows.add(i, rt);
        }
        flows
    }

    pub fn count(&self, from: LocationId, to: LocationId) -> usize {
        self.counts[[from.index(), to.index()]]
    }

    pub fn counts(&self) -> &Array2<usize> {
        &self.counts
    }

    pub fn single_stay_cnt(&self) -> usize {
        self.single_stay_cnt
    }

    pub fn move_cnt(&self) -> usize {
        self.counts.sum()
    }

    fn moves(round_trip: &RoundTrip) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..round_trip.size()).map(move |i| {
            (
                round_trip.location(i).index(),
                round_trip.successor_location(i).index(),
            )
        })
    }
}

impl MultiRoundTripSummary for OdFlows {
    fn clear(&mut self) {
        self.counts.fill(0);
        self.single_stay_cnt = 0;
    }

    fn add(&mut self, _index: usize, round_trip: &RoundTrip) {
        if round_trip.size() == 1 {
            self.single_stay_cnt += 1;
            return;
        }
        for (from, to) in Self::moves(round_trip) {
            self.counts[[from, to]] += 1;
        }
    }

    fn remove(&mut self, _index: usize, round_trip: &RoundTrip) {
        if round_trip.size() == 1 {
            self.single_stay_cnt -= 1;
            return;
        }
        for (from, to) in Self::moves(round_trip) {
            self.counts[[from, to]] -= 1;
        }
    }

    fn box_clone(&self) -> Box<dyn MultiRoundTripSummary> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// One summary per population group; slots outside the considered groups are ignored.
#[derive(Debug, Clone)]
pub struct ByPopulationGroupSummary<T> {
    groups: Vec<(String, T)>,
    index_to_group: HashMap<usize, usize>,
}

impl<T: MultiRoundTripSummary + Clone + 'static> ByPopulationGroupSummary<T> {
    pub fn new(
        grouping: &PopulationGrouping,
        considered_groups: &[&str],
        factory: impl Fn() -> T,
    ) -> Self {
        let mut groups = Vec::with_capacity(considered_groups.len());
        let mut index_to_group = HashMap::new();
        for &name in considered_groups {
            let position = groups.len();
            for &index in grouping.indices(name) {
                let previous = index_to_group.insert(index, position);
                debug_assert!(previous.is_none(), "index {index} is in two groups");
            }
            groups.push((name.to_string(), factory()));
        }
        Self {
            groups,
            index_to_group,
        }
    }

    pub fn summary(&self, group: &str) -> Option<&T> {
        self.groups
            .iter()
            .find(|(name, _)| name == group)
            .map(|(_, summary)| summary)
    }

    pub fn summaries(&self) -> impl Iterator<Item = (&str, &T)> {
        self.groups.iter().map(|(name, s)| (name.as_str(), s))
    }
}

impl<T> MultiRoundTripSummary for ByPopulationGroupSummary<T>
where
    T: MultiRoundTripSummary + Clone + 'static,
{
    fn clear(&mut self) {
        for (_, summary) in self.groups.iter_mut() {
            summary.clear();
        }
    }

    fn add(&mut self, index: usize, round_trip: &RoundTrip) {
        if let Some(&g) = self.index_to_group.get(&index) {
            self.groups[g].1.add(index, round_trip);
        }
    }

    fn remove(&mut self, index: usize, round_trip: &RoundTrip) {
        if let Some(&g) = self.index_to_group.get(&index) {
            self.groups[g].1.remove(index, round_trip);
        }
    }

    fn box_clone(&self) -> Box<dyn MultiRoundTripSummary> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multiple::MultiRoundTrip;

    const A: LocationId = LocationId(0);
    const B: LocationId = LocationId(1);
    const C: LocationId = LocationId(2);

    fn rt(locations: &[LocationId], departures: &[usize]) -> RoundTrip {
        RoundTrip::new(locations.to_vec(), departures.to_vec()).unwrap()
    }

    #[test]
    fn test_od_flows_counts_moves() {
        let flows = OdFlows::from_round_trips(
            3,
            &[rt(&[A, B], &[1, 5]), rt(&[A, B, C], &[1, 5, 9]), rt(&[C], &[0])],
        );
        assert_eq!(flows.count(A, B), 2);
        assert_eq!(flows.count(B, A), 1);
        assert_eq!(flows.count(B, C), 1);
        assert_eq!(flows.count(C, A), 1);
        assert_eq!(flows.move_cnt(), 5);
        assert_eq!(flows.single_stay_cnt(), 1);
    }

    #[test]
    fn test_incremental_update_matches_recompute() {
        let mut population = MultiRoundTrip::new(vec![rt(&[A], &[0]), rt(&[B], &[3])])
            .unwrap()
            .with_summary(OdFlows::new(3));
        population.set_round_trip(0, rt(&[A, C, B], &[0, 4, 7]));
        population.set_round_trip(1, rt(&[B, A], &[3, 12]));
        population.set_round_trip(0, rt(&[C], &[2]));

        let expected = OdFlows::from_round_trips(3, population.round_trips());
        assert_eq!(population.summary::<OdFlows>(), Some(&expected));
    }

    #[test]
    fn test_by_group_routes_updates() {
        let mut grouping = PopulationGrouping::new(4);
        grouping.add_group("x", 1.0);
        grouping.add_group("y", 1.0);
        let summary = ByPopulationGroupSummary::new(&grouping, &["x"], || OdFlows::new(3));

        let mut population = MultiRoundTrip::new(vec![rt(&[A], &[0]); 4])
            .unwrap()
            .with_summary(summary);
        for i in 0..4 {
            population.set_round_trip(i, rt(&[A, B], &[0, 6]));
        }
        let by_group = population
            .summary::<ByPopulationGroupSummary<OdFlows>>()
            .unwrap();
        let x = by_group.summary("x").unwrap();
        assert_eq!(x.count(A, B), grouping.indices("x").len());
        assert!(by_group.summary("y").is_none());
    }
}

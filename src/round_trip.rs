/*!
The single round trip: a cyclic sequence of stays, each identified by a
location and the time bin in which the traveler departs from it.

Location `i` is left in the `i`-th smallest departure bin, so departures are
kept sorted and pairwise distinct while locations keep their cyclic order.
Stay `0` is the home stay; the trip wraps from the last stay back to it.

The derived [`Episode`] sequence is produced by a
[`Simulator`](crate::simulator::Simulator) and cleared by every mutation.
*/

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::ScenarioError;
use crate::scenario::{LocationId, Scenario};
use crate::simulator::Episode;

#[derive(Debug, Clone)]
pub struct RoundTrip {
    locations: Vec<LocationId>,
    departures: Vec<usize>,
    episodes: Vec<Episode>,
}

impl RoundTrip {
    /**
    Builds a round trip from parallel location and departure lists.

    # Errors

    Fails if the lists are empty, differ in length, or if the departures are
    not strictly increasing.
    */
    pub fn new(locations: Vec<LocationId>, departures: Vec<usize>) -> Result<Self, ScenarioError> {
        if locations.is_empty() {
            return Err(ScenarioError::InvalidRoundTrip(
                "a round trip needs at least one stay".to_string(),
            ));
        }
        if locations.len() != departures.len() {
            return Err(ScenarioError::InvalidRoundTrip(format!(
                "{} locations but {} departures",
                locations.len(),
                departures.len()
            )));
        }
        if departures.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ScenarioError::InvalidRoundTrip(format!(
                "departures must be strictly increasing, got {:?}",
                departures
            )));
        }
        Ok(Self {
            locations,
            departures,
            episodes: Vec::new(),
        })
    }

    /// Checks the round trip against the bounds of `scenario`.
    pub fn validate(&self, scenario: &Scenario) -> Result<(), ScenarioError> {
        if self.size() > scenario.max_stay_episodes() {
            return Err(ScenarioError::InvalidRoundTrip(format!(
                "{} stays exceed the maximum of {}",
                self.size(),
                scenario.max_stay_episodes()
            )));
        }
        if let Some(&bin) = self.departures.last() {
            if bin >= scenario.time_bin_cnt() {
                return Err(ScenarioError::InvalidRoundTrip(format!(
                    "departure bin {} is outside 0..{}",
                    bin,
                    scenario.time_bin_cnt()
                )));
            }
        }
        if let Some(loc) = self
            .locations
            .iter()
            .find(|loc| loc.index() >= scenario.location_cnt())
        {
            return Err(ScenarioError::UnknownLocation(loc.to_string()));
        }
        Ok(())
    }

    pub fn size(&self) -> usize {
        self.locations.len()
    }

    pub fn location(&self, i: usize) -> LocationId {
        self.locations[i]
    }

    pub fn departure(&self, i: usize) -> usize {
        self.departures[i]
    }

    pub fn locations(&self) -> &[LocationId] {
        &self.locations
    }

    pub fn departures(&self) -> &[usize] {
        &self.departures
    }

    pub fn home(&self) -> LocationId {
        self.locations[0]
    }

    pub fn predecessor_index(&self, i: usize) -> usize {
        (i + self.size() - 1) % self.size()
    }

    pub fn successor_index(&self, i: usize) -> usize {
        (i + 1) % self.size()
    }

    pub fn predecessor_location(&self, i: usize) -> LocationId {
        self.locations[self.predecessor_index(i)]
    }

    pub fn successor_location(&self, i: usize) -> LocationId {
        self.locations[self.successor_index(i)]
    }

    pub fn contains_departure(&self, bin: usize) -> bool {
        self.departures.binary_search(&bin).is_ok()
    }

    /// Position of `bin` among the sorted departures.
    pub fn departure_position(&self, bin: usize) -> Option<usize> {
        self.departures.binary_search(&bin).ok()
    }

    /// Simulated episodes; empty until a simulator has run on this round trip.
    pub fn episodes(&self) -> &[Episode] {
        &self.episodes
    }

    pub fn set_episodes(&mut self, episodes: Vec<Episode>) {
        self.episodes = episodes;
    }

    pub fn with_episodes(mut self, episodes: Vec<Episode>) -> Self {
        self.episodes = episodes;
        self
    }

    /// Inserts a stay at `location` before index `index` (or appends if
    /// `index == size()`) and adds `departure` to the sorted departures.
    pub fn insert(&mut self, index: usize, location: LocationId, departure: usize) {
        assert!(
            index <= self.size(),
            "insert index {index} out of range for round trip of size {}",
            self.size()
        );
        let pos = match self.departures.binary_search(&departure) {
            Ok(_) => panic!("departure bin {departure} is already used"),
            Err(pos) => pos,
        };
        self.locations.insert(index, location);
        self.departures.insert(pos, departure);
        self.episodes.clear();
    }

    /// Removes the stay at `location_index` and the departure at `departure_index`.
    pub fn remove(&mut self, location_index: usize, departure_index: usize) {
        assert!(self.size() > 1, "cannot remove the only stay of a round trip");
        assert!(
            location_index < self.size() && departure_index < self.size(),
            "remove indices ({location_index}, {departure_index}) out of range for size {}",
            self.size()
        );
        self.locations.remove(location_index);
        self.departures.remove(departure_index);
        self.episodes.clear();
    }

    pub fn set_location(&mut self, i: usize, location: LocationId) {
        self.locations[i] = location;
        self.episodes.clear();
    }

    /// Replaces departure `i` by the unused bin `bin`, keeping departures sorted.
    pub fn set_departure(&mut self, i: usize, bin: usize) {
        self.departures.remove(i);
        let pos = match self.departures.binary_search(&bin) {
            Ok(_) => panic!("departure bin {bin} is already used"),
            Err(pos) => pos,
        };
        self.departures.insert(pos, bin);
        self.episodes.clear();
    }
}

impl PartialEq for RoundTrip {
    fn eq(&self, other: &Self) -> bool {
        self.locations == other.locations && self.departures == other.departures
    }
}

impl Eq for RoundTrip {}

impl Hash for RoundTrip {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.locations.hash(state);
        self.departures.hash(state);
    }
}

impl fmt::Display for RoundTrip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (loc, dep)) in self.locations.iter().zip(&self.departures).enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}({})", loc.index(), dep)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: LocationId = LocationId(0);
    const B: LocationId = LocationId(1);
    const C: LocationId = LocationId(2);

    #[test]
    fn test_new_rejects_unsorted_departures() {
        assert!(RoundTrip::new(vec![A, B], vec![3, 3]).is_err());
        assert!(RoundTrip::new(vec![A, B], vec![5, 3]).is_err());
        assert!(RoundTrip::new(vec![A], vec![1, 2]).is_err());
        assert!(RoundTrip::new(vec![], vec![]).is_err());
    }

    #[test]
    fn test_neighbors_wrap_around() {
        let rt = RoundTrip::new(vec![A, B, C], vec![1, 5, 9]).unwrap();
        assert_eq!(rt.predecessor_location(0), C);
        assert_eq!(rt.successor_location(2), A);
        assert_eq!(rt.predecessor_index(1), 0);
    }

    #[test]
    fn test_insert_keeps_departures_sorted() {
        let mut rt = RoundTrip::new(vec![A, B], vec![2, 10]).unwrap();
        rt.insert(1, C, 20);
        assert_eq!(rt.locations(), &[A, C, B]);
        assert_eq!(rt.departures(), &[2, 10, 20]);
        rt.insert(3, B, 0);
        assert_eq!(rt.locations(), &[A, C, B, B]);
        assert_eq!(rt.departures(), &[0, 2, 10, 20]);
    }

    #[test]
    #[should_panic(expected = "already used")]
    fn test_insert_used_bin_panics() {
        let mut rt = RoundTrip::new(vec![A, B], vec![2, 10]).unwrap();
        rt.insert(0, C, 10);
    }

    #[test]
    #[should_panic(expected = "only stay")]
    fn test_remove_last_stay_panics() {
        let mut rt = RoundTrip::new(vec![A], vec![2]).unwrap();
        rt.remove(0, 0);
    }

    #[test]
    fn test_set_departure_resorts() {
        let mut rt = RoundTrip::new(vec![A, B, C], vec![1, 5, 9]).unwrap();
        rt.set_departure(0, 7);
        assert_eq!(rt.departures(), &[5, 7, 9]);
        assert_eq!(rt.locations(), &[A, B, C]);
    }

    #[test]
    fn test_equality_ignores_episodes() {
        let rt = RoundTrip::new(vec![A, B], vec![1, 5]).unwrap();
        let other = rt.clone().with_episodes(Vec::new());
        assert_eq!(rt, other);
        assert_eq!(rt.to_string(), "0(1) 1(5)");
    }
}

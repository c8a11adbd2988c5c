/*!
The scenario: a registry of locations, pairwise travel distances and times,
and the discretization of the period into departure time bins.

A scenario is assembled with a [`ScenarioBuilder`] and frozen by
[`ScenarioBuilder::build`]. The resulting [`Scenario`] is read-only and is
typically shared between proposals, simulators and weights through an
[`Arc`](std::sync::Arc).

# Examples

```rust
use roundtrips::scenario::{Location, ScenarioBuilder};

let mut builder = ScenarioBuilder::new(1.0, 24).unwrap();
let home = builder.add_location(Location::new("home")).unwrap();
let work = builder.add_location(Location::new("work").with_charging(true)).unwrap();
builder.set_symmetric_distance_km(home, work, 12.5).unwrap();
builder.set_symmetric_time_h(home, work, 0.25).unwrap();
let scenario = builder.build().unwrap();

assert_eq!(scenario.period_length_h(), 24.0);
assert_eq!(scenario.max_stay_episodes(), 24);
assert_eq!(scenario.time_h(work, home), 0.25);
```
*/

use ndarray::Array2;
use std::collections::HashMap;
use std::fmt;

use crate::error::ScenarioError;
use crate::round_trip::RoundTrip;

/// Index of a registered location, in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocationId(pub usize);

impl LocationId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A place where a round trip can stay.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    name: String,
    allows_charging: bool,
}

impl Location {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            allows_charging: false,
        }
    }

    pub fn with_charging(mut self, allows_charging: bool) -> Self {
        self.allows_charging = allows_charging;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn allows_charging(&self) -> bool {
        self.allows_charging
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Mutable setup stage of a [`Scenario`].
#[derive(Debug, Clone)]
pub struct ScenarioBuilder {
    bin_size_h: f64,
    time_bin_cnt: usize,
    max_stay_episodes: Option<usize>,
    locations: Vec<Location>,
    index: HashMap<String, LocationId>,
    distances_km: HashMap<(LocationId, LocationId), f64>,
    times_h: HashMap<(LocationId, LocationId), f64>,
}

impl ScenarioBuilder {
    /**
    Starts a scenario whose period consists of `time_bin_cnt` bins of
    `bin_size_h` hours each.

    # Errors

    Fails if the bin size is not a positive finite number or if there are no bins.
    */
    pub fn new(bin_size_h: f64, time_bin_cnt: usize) -> Result<Self, ScenarioError> {
        if !(bin_size_h.is_finite() && bin_size_h > 0.0) {
            return Err(ScenarioError::InvalidBinSize(bin_size_h));
        }
        if time_bin_cnt == 0 {
            return Err(ScenarioError::InvalidTimeBinCount);
        }
        Ok(Self {
            bin_size_h,
            time_bin_cnt,
            max_stay_episodes: None,
            locations: Vec::new(),
            index: HashMap::new(),
            distances_km: HashMap::new(),
            times_h: HashMap::new(),
        })
    }

    /// Caps the number of stays per round trip. Defaults to the number of time bins.
    pub fn max_stay_episodes(&mut self, max: usize) -> Result<&mut Self, ScenarioError> {
        if max == 0 || max > self.time_bin_cnt {
            return Err(ScenarioError::InvalidMaxStayEpisodes {
                max,
                time_bin_cnt: self.time_bin_cnt,
            });
        }
        self.max_stay_episodes = Some(max);
        Ok(self)
    }

    pub fn add_location(&mut self, location: Location) -> Result<LocationId, ScenarioError> {
        if self.index.contains_key(location.name()) {
            return Err(ScenarioError::DuplicateLocation(location.name.clone()));
        }
        let id = LocationId(self.locations.len());
        self.index.insert(location.name.clone(), id);
        self.locations.push(location);
        Ok(id)
    }

    pub fn location_id(&self, name: &str) -> Option<LocationId> {
        self.index.get(name).copied()
    }

    pub fn set_distance_km(
        &mut self,
        from: LocationId,
        to: LocationId,
        km: f64,
    ) -> Result<&mut Self, ScenarioError> {
        self.check(from)?;
        self.check(to)?;
        self.distances_km.insert((from, to), km);
        Ok(self)
    }

    pub fn set_symmetric_distance_km(
        &mut self,
        a: LocationId,
        b: LocationId,
        km: f64,
    ) -> Result<&mut Self, ScenarioError> {
        self.set_distance_km(a, b, km)?;
        self.set_distance_km(b, a, km)
    }

    pub fn set_time_h(
        &mut self,
        from: LocationId,
        to: LocationId,
        hours: f64,
    ) -> Result<&mut Self, ScenarioError> {
        self.check(from)?;
        self.check(to)?;
        self.times_h.insert((from, to), hours);
        Ok(self)
    }

    pub fn set_symmetric_time_h(
        &mut self,
        a: LocationId,
        b: LocationId,
        hours: f64,
    ) -> Result<&mut Self, ScenarioError> {
        self.set_time_h(a, b, hours)?;
        self.set_time_h(b, a, hours)
    }

    fn check(&self, id: LocationId) -> Result<(), ScenarioError> {
        if id.0 < self.locations.len() {
            Ok(())
        } else {
            Err(ScenarioError::UnknownLocation(id.to_string()))
        }
    }

    /**
    Freezes the scenario.

    Travel times must be known between every ordered pair of distinct
    locations; a location's time to itself defaults to zero. Distances are
    optional.
    */
    pub fn build(self) -> Result<Scenario, ScenarioError> {
        let n = self.locations.len();
        if n == 0 {
            return Err(ScenarioError::NoLocations);
        }
        let mut times_h = Array2::<f64>::zeros((n, n));
        let mut distances_km = Array2::<f64>::from_elem((n, n), f64::NAN);
        for from in 0..n {
            distances_km[[from, from]] = 0.0;
            for to in 0..n {
                let key = (LocationId(from), LocationId(to));
                if let Some(&km) = self.distances_km.get(&key) {
                    distances_km[[from, to]] = km;
                }
                match self.times_h.get(&key) {
                    Some(&hours) => times_h[[from, to]] = hours,
                    None if from == to => {}
                    None => {
                        return Err(ScenarioError::MissingTravelTime {
                            from: self.locations[from].name.clone(),
                            to: self.locations[to].name.clone(),
                        })
                    }
                }
            }
        }
        Ok(Scenario {
            max_stay_episodes: self.max_stay_episodes.unwrap_or(self.time_bin_cnt),
            bin_size_h: self.bin_size_h,
            time_bin_cnt: self.time_bin_cnt,
            locations: self.locations,
            index: self.index,
            distances_km,
            times_h,
        })
    }
}

/// Read-only registry of locations, travel times and time discretization.
#[derive(Debug, Clone)]
pub struct Scenario {
    locations: Vec<Location>,
    index: HashMap<String, LocationId>,
    distances_km: Array2<f64>,
    times_h: Array2<f64>,
    bin_size_h: f64,
    time_bin_cnt: usize,
    max_stay_episodes: usize,
}

impl Scenario {
    pub fn location_cnt(&self) -> usize {
        self.locations.len()
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    pub fn location_ids(&self) -> impl Iterator<Item = LocationId> {
        (0..self.locations.len()).map(LocationId)
    }

    pub fn location(&self, id: LocationId) -> &Location {
        &self.locations[id.0]
    }

    pub fn location_id(&self, name: &str) -> Option<LocationId> {
        self.index.get(name).copied()
    }

    pub fn bin_size_h(&self) -> f64 {
        self.bin_size_h
    }

    pub fn time_bin_cnt(&self) -> usize {
        self.time_bin_cnt
    }

    pub fn period_length_h(&self) -> f64 {
        self.bin_size_h * self.time_bin_cnt as f64
    }

    pub fn max_stay_episodes(&self) -> usize {
        self.max_stay_episodes
    }

    /// Distance between two locations, `None` if it was never set.
    pub fn distance_km(&self, from: LocationId, to: LocationId) -> Option<f64> {
        let km = self.distances_km[[from.0, to.0]];
        (!km.is_nan()).then_some(km)
    }

    pub fn time_h(&self, from: LocationId, to: LocationId) -> f64 {
        self.times_h[[from.0, to.0]]
    }

    /// Start time of departure bin `bin`, in hours.
    pub fn bin_start_h(&self, bin: usize) -> f64 {
        self.bin_size_h * bin as f64
    }

    /// A round trip that stays at `location` and departs in bin `departure`.
    /// Episodes are not simulated yet.
    pub fn create_initial_round_trip(
        &self,
        location: LocationId,
        departure: usize,
    ) -> Result<RoundTrip, ScenarioError> {
        let round_trip = RoundTrip::new(vec![location], vec![departure])?;
        round_trip.validate(self)?;
        Ok(round_trip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_locations() -> (ScenarioBuilder, LocationId, LocationId) {
        let mut builder = ScenarioBuilder::new(1.0, 24).unwrap();
        let a = builder.add_location(Location::new("A")).unwrap();
        let b = builder.add_location(Location::new("B")).unwrap();
        (builder, a, b)
    }

    #[test]
    fn test_invalid_discretization() {
        assert_eq!(
            ScenarioBuilder::new(0.0, 24).unwrap_err(),
            ScenarioError::InvalidBinSize(0.0)
        );
        assert_eq!(
            ScenarioBuilder::new(1.0, 0).unwrap_err(),
            ScenarioError::InvalidTimeBinCount
        );
    }

    #[test]
    fn test_max_stay_episodes_bounds() {
        let mut builder = ScenarioBuilder::new(0.5, 48).unwrap();
        assert!(builder.max_stay_episodes(0).is_err());
        assert!(builder.max_stay_episodes(49).is_err());
        assert!(builder.max_stay_episodes(48).is_ok());
    }

    #[test]
    fn test_duplicate_location() {
        let (mut builder, _, _) = two_locations();
        assert_eq!(
            builder.add_location(Location::new("A")).unwrap_err(),
            ScenarioError::DuplicateLocation("A".to_string())
        );
    }

    #[test]
    fn test_unknown_location() {
        let (mut builder, a, _) = two_locations();
        assert!(builder.set_time_h(a, LocationId(7), 1.0).is_err());
    }

    #[test]
    fn test_missing_travel_time() {
        let (mut builder, a, b) = two_locations();
        builder.set_time_h(a, b, 0.5).unwrap();
        let err = builder.build().unwrap_err();
        assert_eq!(
            err,
            ScenarioError::MissingTravelTime {
                from: "B".to_string(),
                to: "A".to_string()
            }
        );
    }

    #[test]
    fn test_asymmetric_matrices() {
        let (mut builder, a, b) = two_locations();
        builder.set_time_h(a, b, 0.5).unwrap();
        builder.set_time_h(b, a, 0.75).unwrap();
        builder.set_distance_km(a, b, 10.0).unwrap();
        let scenario = builder.build().unwrap();

        assert_eq!(scenario.time_h(a, b), 0.5);
        assert_eq!(scenario.time_h(b, a), 0.75);
        assert_eq!(scenario.time_h(a, a), 0.0);
        assert_eq!(scenario.distance_km(a, b), Some(10.0));
        assert_eq!(scenario.distance_km(b, a), None);
        assert_eq!(scenario.distance_km(b, b), Some(0.0));
        assert_eq!(scenario.location_id("B"), Some(b));
    }

    #[test]
    fn test_initial_round_trip_checks_bin() {
        let (mut builder, a, b) = two_locations();
        builder.set_symmetric_time_h(a, b, 0.5).unwrap();
        let scenario = builder.build().unwrap();
        assert!(scenario.create_initial_round_trip(a, 23).is_ok());
        assert!(scenario.create_initial_round_trip(a, 24).is_err());
    }
}

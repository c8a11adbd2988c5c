/*!
Population-level targets and the weight that pulls a population towards them.

A [`PopulationTarget`] turns a population (or one group of it) into a sample
vector that is compared entry by entry with a fixed target vector. The
comparison is done on shares, so the sample and target totals may differ.
*/

use ndarray::Array1;

use crate::error::{ConfigError, ScenarioError};
use crate::multiple::{ByPopulationGroupSummary, MultiRoundTrip, OdFlows, PopulationGroupFilter};
use crate::round_trip::RoundTrip;
use crate::scenario::{LocationId, Scenario};
use crate::simulator::{effective_intervals, overlap_h, Episode};
use crate::weights::SamplingWeight;

pub trait PopulationTarget: Send {
    fn labels(&self) -> Vec<String>;

    fn target(&self) -> Array1<f64>;

    /// Sample vector of the whole population, or of the group selected by `filter`.
    fn sample(
        &self,
        population: &MultiRoundTrip,
        filter: Option<&PopulationGroupFilter>,
    ) -> Array1<f64>;
}

fn members<'a>(
    population: &'a MultiRoundTrip,
    filter: Option<&'a PopulationGroupFilter>,
) -> Box<dyn Iterator<Item = &'a RoundTrip> + 'a> {
    match filter {
        Some(filter) => Box::new(filter.iter(population)),
        None => Box::new(population.iter()),
    }
}

fn location_name(location_names: &[String], location: LocationId) -> Result<String, ScenarioError> {
    location_names
        .get(location.index())
        .cloned()
        .ok_or_else(|| ScenarioError::UnknownLocation(location.to_string()))
}

/// Location-keyed target values in insertion order.
#[derive(Debug, Clone, Default)]
struct LocationTargets {
    entries: Vec<(LocationId, String, f64)>,
}

impl LocationTargets {
    fn set(&mut self, location: LocationId, label: String, target: f64) {
        match self.entries.iter_mut().find(|(l, _, _)| *l == location) {
            Some(entry) => entry.2 = target,
            None => self.entries.push((location, label, target)),
        }
    }

    fn position(&self, location: LocationId) -> Option<usize> {
        self.entries.iter().position(|(l, _, _)| *l == location)
    }

    fn labels(&self) -> Vec<String> {
        self.entries.iter().map(|(_, label, _)| label.clone()).collect()
    }

    fn target(&self) -> Array1<f64> {
        self.entries.iter().map(|(_, _, t)| *t).collect()
    }
}

/// Number of round trips by home location.
#[derive(Debug, Clone)]
pub struct HomeLocationTarget {
    location_names: Vec<String>,
    targets: LocationTargets,
}

impl HomeLocationTarget {
    pub fn new(scenario: &Scenario) -> Self {
        Self {
            location_names: scenario.locations().iter().map(|l| l.name().to_string()).collect(),
            targets: LocationTargets::default(),
        }
    }

    /// # Errors
    ///
    /// Fails if `home` is not a location of the scenario.
    pub fn set_target(
        &mut self,
        home: LocationId,
        target: f64,
    ) -> Result<&mut Self, ScenarioError> {
        let label = location_name(&self.location_names, home)?;
        self.targets.set(home, label, target);
        Ok(self)
    }
}

impl PopulationTarget for HomeLocationTarget {
    fn labels(&self) -> Vec<String> {
        self.targets.labels()
    }

    fn target(&self) -> Array1<f64> {
        self.targets.target()
    }

    fn sample(
        &self,
        population: &MultiRoundTrip,
        filter: Option<&PopulationGroupFilter>,
    ) -> Array1<f64> {
        let mut sample = Array1::zeros(self.targets.entries.len());
        for rt in members(population, filter) {
            if let Some(i) = self.targets.position(rt.home()) {
                sample[i] += 1.0;
            }
        }
        sample
    }
}

/**
Origin-destination move counts.

Diagonal entries are ignored. The sample is read from an [`OdFlows`]
summary when the population maintains one (per group, through a
[`ByPopulationGroupSummary`], when filtering) and recomputed otherwise.
*/
#[derive(Debug, Clone)]
pub struct OdTarget {
    location_names: Vec<String>,
    entries: Vec<(LocationId, LocationId, f64)>,
}

impl OdTarget {
    pub fn new(scenario: &Scenario) -> Self {
        Self {
            location_names: scenario.locations().iter().map(|l| l.name().to_string()).collect(),
            entries: Vec::new(),
        }
    }

    /// Sets the target of the `origin -> destination` entry. Diagonal entries are dropped.
    ///
    /// # Errors
    ///
    /// Fails if either location is not part of the scenario.
    pub fn set_od_entry(
        &mut self,
        origin: LocationId,
        destination: LocationId,
        target: f64,
    ) -> Result<&mut Self, ScenarioError> {
        location_name(&self.location_names, origin)?;
        location_name(&self.location_names, destination)?;
        if origin == destination {
            return Ok(self);
        }
        match self
            .entries
            .iter_mut()
            .find(|(o, d, _)| (*o, *d) == (origin, destination))
        {
            Some(entry) => entry.2 = target,
            None => self.entries.push((origin, destination, target)),
        }
        Ok(self)
    }

    fn od_array(&self, flows: &OdFlows) -> Array1<f64> {
        self.entries
            .iter()
            .map(|&(o, d, _)| flows.count(o, d) as f64)
            .collect()
    }
}

impl PopulationTarget for OdTarget {
    fn labels(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|(o, d, _)| {
                format!("{}->{}", self.location_names[o.index()], self.location_names[d.index()])
            })
            .collect()
    }

    fn target(&self) -> Array1<f64> {
        self.entries.iter().map(|(_, _, t)| *t).collect()
    }

    fn sample(
        &self,
        population: &MultiRoundTrip,
        filter: Option<&PopulationGroupFilter>,
    ) -> Array1<f64> {
        let maintained = match filter {
            None => population.summary::<OdFlows>(),
            Some(filter) => population
                .summary::<ByPopulationGroupSummary<OdFlows>>()
                .and_then(|by_group| by_group.summary(filter.group_name())),
        };
        match maintained {
            Some(flows) => self.od_array(flows),
            None => self.od_array(&OdFlows::from_round_trips(
                self.location_names.len(),
                members(population, filter),
            )),
        }
    }
}

/// Round trips whose home stay overlaps a night window by at least `target_duration_h`.
#[derive(Debug, Clone)]
pub struct AtHomeOverNightTarget {
    target_duration_h: f64,
    period_h: f64,
    intervals_h: Vec<(f64, f64)>,
    target: f64,
}

impl AtHomeOverNightTarget {
    pub fn new(
        target_duration_h: f64,
        interval_duration_h: f64,
        end_time_h: f64,
        period_h: f64,
        target: f64,
    ) -> Self {
        Self {
            target_duration_h,
            period_h,
            intervals_h: effective_intervals(interval_duration_h, end_time_h, period_h),
            target,
        }
    }
}

impl PopulationTarget for AtHomeOverNightTarget {
    fn labels(&self) -> Vec<String> {
        vec!["at home overnight".to_string(), "not at home overnight".to_string()]
    }

    fn target(&self) -> Array1<f64> {
        Array1::from(vec![self.target, 0.0])
    }

    fn sample(
        &self,
        population: &MultiRoundTrip,
        filter: Option<&PopulationGroupFilter>,
    ) -> Array1<f64> {
        let mut total = 0.0;
        let mut at_home = 0.0;
        for rt in members(population, filter) {
            total += 1.0;
            let overlap_h = rt
                .episodes()
                .first()
                .map_or(0.0, |home| home.overlap_h(&self.intervals_h, self.period_h));
            if overlap_h >= self.target_duration_h {
                at_home += 1.0;
            }
        }
        Array1::from(vec![at_home, total - at_home])
    }
}

/**
Round trips by main activity location.

The main activity of a round trip is its non-home stay with the largest
overlap with the activity window. Round trips whose main activity overlaps
the window by less than `target_duration_h`, or takes place at a location
without target, are not counted.
*/
#[derive(Debug, Clone)]
pub struct AtMainActivityTarget {
    location_names: Vec<String>,
    target_duration_h: f64,
    period_h: f64,
    intervals_h: Vec<(f64, f64)>,
    targets: LocationTargets,
}

impl AtMainActivityTarget {
    pub fn new(
        scenario: &Scenario,
        target_duration_h: f64,
        interval_duration_h: f64,
        end_time_h: f64,
    ) -> Self {
        let period_h = scenario.period_length_h();
        Self {
            location_names: scenario.locations().iter().map(|l| l.name().to_string()).collect(),
            target_duration_h,
            period_h,
            intervals_h: effective_intervals(interval_duration_h, end_time_h, period_h),
            targets: LocationTargets::default(),
        }
    }

    /// # Errors
    ///
    /// Fails if `location` is not part of the scenario.
    pub fn set_target(
        &mut self,
        location: LocationId,
        target: f64,
    ) -> Result<&mut Self, ScenarioError> {
        let label = location_name(&self.location_names, location)?;
        self.targets.set(location, label, target);
        Ok(self)
    }

    fn main_activity(&self, round_trip: &RoundTrip) -> Option<(LocationId, f64)> {
        round_trip
            .episodes()
            .iter()
            .skip(1)
            .filter_map(Episode::as_stay)
            .map(|stay| {
                let overlap_h =
                    overlap_h(stay.duration_h, stay.end_time_h, &self.intervals_h, self.period_h);
                (stay.location, overlap_h)
            })
            .fold(None, |best: Option<(LocationId, f64)>, (location, overlap_h)| match best {
                Some((_, best_h)) if best_h >= overlap_h => best,
                _ => Some((location, overlap_h)),
            })
    }
}

impl PopulationTarget for AtMainActivityTarget {
    fn labels(&self) -> Vec<String> {
        self.targets.labels()
    }

    fn target(&self) -> Array1<f64> {
        self.targets.target()
    }

    fn sample(
        &self,
        population: &MultiRoundTrip,
        filter: Option<&PopulationGroupFilter>,
    ) -> Array1<f64> {
        let mut sample = Array1::zeros(self.targets.entries.len());
        for rt in members(population, filter) {
            if let Some((location, overlap_h)) = self.main_activity(rt) {
                if overlap_h >= self.target_duration_h {
                    if let Some(i) = self.targets.position(location) {
                        sample[i] += 1.0;
                    }
                }
            }
        }
        sample
    }
}

/**
Penalizes the L1 distance between the sample and target shares of a
[`PopulationTarget`].

With `S` the sample total, each entry is allowed a slack of `0.5 / S`, the
largest deviation integer counts cannot avoid. The remaining deviation plus
the expected discretization error `0.5 · slack · len` is scaled by the group
size:

```text
log w = −N · (Σ max(0, |s_i/S − t_i/T| − 0.5/S) + 0.25 · len / S)
```
*/
#[derive(Debug, Clone)]
pub struct TargetDeviationWeight<T> {
    target: T,
    filter: Option<PopulationGroupFilter>,
    target_values: Array1<f64>,
    target_size: f64,
    last_deviation_error: f64,
    last_discretization_error: f64,
}

impl<T: PopulationTarget> TargetDeviationWeight<T> {
    /// # Errors
    ///
    /// Fails if a target value is negative or not finite, or if a non-empty
    /// target does not have a positive total.
    pub fn new(target: T) -> Result<Self, ConfigError> {
        let target_values = target.target();
        if let Some(t) = target_values.iter().find(|t| !(t.is_finite() && **t >= 0.0)) {
            return Err(ConfigError::Invalid(format!(
                "target values must be finite and non-negative, got {t}"
            )));
        }
        let target_size = target_values.sum();
        if !target_values.is_empty() && !(target_size.is_finite() && target_size > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "target {:?} has no positive total",
                target.labels()
            )));
        }
        Ok(Self {
            target,
            filter: None,
            target_values,
            target_size,
            last_deviation_error: 0.0,
            last_discretization_error: 0.0,
        })
    }

    /// Restricts the comparison to one population group.
    pub fn with_filter(mut self, filter: PopulationGroupFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn filter(&self) -> Option<&PopulationGroupFilter> {
        self.filter.as_ref()
    }

    pub fn last_deviation_error(&self) -> f64 {
        self.last_deviation_error
    }

    pub fn last_discretization_error(&self) -> f64 {
        self.last_discretization_error
    }
}

impl<T: PopulationTarget> SamplingWeight<MultiRoundTrip> for TargetDeviationWeight<T> {
    fn log_weight(&mut self, state: &MultiRoundTrip) -> f64 {
        let sample = self.target.sample(state, self.filter.as_ref());
        let sample_size = sample.sum().max(1e-8);
        let slack = 0.5 / sample_size;

        self.last_deviation_error = sample
            .iter()
            .zip(self.target_values.iter())
            .map(|(s, t)| ((s / sample_size - t / self.target_size).abs() - slack).max(0.0))
            .sum();
        self.last_discretization_error = 0.5 * slack * self.target_values.len() as f64;

        let group_size = self
            .filter
            .as_ref()
            .map_or(state.size(), PopulationGroupFilter::group_size);
        -(group_size as f64) * (self.last_deviation_error + self.last_discretization_error)
    }

    fn name(&self) -> String {
        let full = std::any::type_name::<T>();
        format!("TargetDeviation({})", full.rsplit("::").next().unwrap_or(full))
    }
}

/*!
Tab-separated loggers and an in-memory sample collector.

A [`ToFileLogger`] writes one header line on start and one line per sampled
iteration: the iteration number followed by the values of its
[`LogColumns`]. Missing parent directories are created; an existing file is
overwritten.

```rust
use roundtrips::io::{SamplingSchedule, SizeDistributionLogger, StateProcessor};
use roundtrips::multiple::MultiRoundTrip;
use roundtrips::round_trip::RoundTrip;
use roundtrips::scenario::LocationId;

let dir = tempfile::tempdir().unwrap();
let path = dir.path().join("sizes.tsv");
let mut logger = SizeDistributionLogger::new(&path, SamplingSchedule::every_iteration(), 2, true);

let population = MultiRoundTrip::new(vec![
    RoundTrip::new(vec![LocationId(0)], vec![0]).unwrap(),
    RoundTrip::new(vec![LocationId(0), LocationId(1)], vec![0, 5]).unwrap(),
])
.unwrap();
logger.start().unwrap();
logger.process_state(0, &population).unwrap();
logger.end().unwrap();

let contents = std::fs::read_to_string(&path).unwrap();
assert_eq!(contents, "iteration\tsize=0\tsize=1\tsize=2\n0\t0\t1\t1\n");
```
*/

use csv::{Writer, WriterBuilder};
use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::SamplerError;
use crate::io::{SamplingSchedule, StateProcessor};
use crate::multiple::{MultiRoundTrip, PopulationGroupFilter};
use crate::round_trip::RoundTrip;
use crate::scenario::Scenario;
use crate::weights::PopulationTarget;

/// The columns a [`ToFileLogger`] writes after the iteration number.
pub trait LogColumns<S>: Send {
    fn header(&self) -> Vec<String>;

    fn values(&mut self, state: &S) -> Vec<String>;
}

pub struct ToFileLogger<C> {
    path: PathBuf,
    schedule: SamplingSchedule,
    columns: C,
    writer: Option<Writer<File>>,
}

impl<C> ToFileLogger<C> {
    pub fn with_columns(path: impl Into<PathBuf>, schedule: SamplingSchedule, columns: C) -> Self {
        Self {
            path: path.into(),
            schedule,
            columns,
            writer: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn columns(&self) -> &C {
        &self.columns
    }
}

impl<C> fmt::Debug for ToFileLogger<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToFileLogger")
            .field("path", &self.path)
            .field("schedule", &self.schedule)
            .field("started", &self.writer.is_some())
            .finish()
    }
}

impl<S, C: LogColumns<S>> StateProcessor<S> for ToFileLogger<C> {
    fn start(&mut self) -> Result<(), SamplerError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let mut writer = WriterBuilder::new()
            .delimiter(b'\t')
            .flexible(false)
            .from_path(&self.path)?;
        let mut header = vec!["iteration".to_string()];
        header.extend(self.columns.header());
        writer.write_record(&header)?;
        writer.flush()?;
        log::debug!("logging {} columns to {}", header.len(), self.path.display());
        self.writer = Some(writer);
        Ok(())
    }

    fn process_state(&mut self, iteration: u64, state: &S) -> Result<(), SamplerError> {
        if !self.schedule.should_sample(iteration) {
            return Ok(());
        }
        let writer = self.writer.as_mut().ok_or_else(|| {
            SamplerError::InvalidArgument(format!("logger {} was not started", self.path.display()))
        })?;
        let mut record = vec![iteration.to_string()];
        record.extend(self.columns.values(state));
        writer.write_record(&record)?;
        Ok(())
    }

    fn end(&mut self) -> Result<(), SamplerError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            log::debug!("closed {}", self.path.display());
        }
        Ok(())
    }
}

/**
Histogram of round-trip sizes over a population.

With `include_intra_zonal == false` the size of a round trip is its number of
moves between distinct locations. Sizes above `max_size` are not counted.
*/
#[derive(Debug, Clone)]
pub struct SizeDistribution {
    max_size: usize,
    include_intra_zonal: bool,
    last_size_cnts: Vec<usize>,
}

impl SizeDistribution {
    pub fn new(max_size: usize, include_intra_zonal: bool) -> Self {
        Self {
            max_size,
            include_intra_zonal,
            last_size_cnts: Vec::new(),
        }
    }

    pub fn size(&self, round_trip: &RoundTrip) -> usize {
        if self.include_intra_zonal {
            round_trip.size()
        } else {
            (0..round_trip.size())
                .filter(|&i| round_trip.location(i) != round_trip.successor_location(i))
                .count()
        }
    }

    pub fn last_size_counts(&self) -> &[usize] {
        &self.last_size_cnts
    }
}

impl LogColumns<MultiRoundTrip> for SizeDistribution {
    fn header(&self) -> Vec<String> {
        (0..=self.max_size).map(|s| format!("size={s}")).collect()
    }

    fn values(&mut self, state: &MultiRoundTrip) -> Vec<String> {
        let mut cnts = vec![0usize; self.max_size + 1];
        for rt in state {
            if let Some(c) = cnts.get_mut(self.size(rt)) {
                *c += 1;
            }
        }
        self.last_size_cnts = cnts;
        self.last_size_cnts.iter().map(usize::to_string).collect()
    }
}

/**
Number of stays per location.

# Panics

Logging a round trip that visits a location outside the scenario passed to
[`LocationCounts::new`] panics.
*/
#[derive(Debug, Clone)]
pub struct LocationCounts {
    location_names: Vec<String>,
}

impl LocationCounts {
    pub fn new(scenario: &Scenario) -> Self {
        Self {
            location_names: scenario.locations().iter().map(|l| l.name().to_string()).collect(),
        }
    }

    fn counts<'a>(&self, round_trips: impl IntoIterator<Item = &'a RoundTrip>) -> Vec<String> {
        let mut cnts = vec![0usize; self.location_names.len()];
        for rt in round_trips {
            for location in rt.locations() {
                match cnts.get_mut(location.index()) {
                    Some(cnt) => *cnt += 1,
                    None => panic!("location {location} is not part of the logged scenario"),
                }
            }
        }
        cnts.iter().map(usize::to_string).collect()
    }
}

impl LogColumns<RoundTrip> for LocationCounts {
    fn header(&self) -> Vec<String> {
        self.location_names.clone()
    }

    fn values(&mut self, state: &RoundTrip) -> Vec<String> {
        self.counts(std::iter::once(state))
    }
}

impl LogColumns<MultiRoundTrip> for LocationCounts {
    fn header(&self) -> Vec<String> {
        self.location_names.clone()
    }

    fn values(&mut self, state: &MultiRoundTrip) -> Vec<String> {
        self.counts(state)
    }
}

/// Sample vector of a [`PopulationTarget`], optionally for one population group.
pub struct TargetSamples<T> {
    target: T,
    filter: Option<PopulationGroupFilter>,
}

impl<T: PopulationTarget> TargetSamples<T> {
    pub fn new(target: T, filter: Option<PopulationGroupFilter>) -> Self {
        Self { target, filter }
    }
}

impl<T: PopulationTarget> LogColumns<MultiRoundTrip> for TargetSamples<T> {
    fn header(&self) -> Vec<String> {
        self.target.labels()
    }

    fn values(&mut self, state: &MultiRoundTrip) -> Vec<String> {
        self.target
            .sample(state, self.filter.as_ref())
            .iter()
            .map(f64::to_string)
            .collect()
    }
}

pub type SizeDistributionLogger = ToFileLogger<SizeDistribution>;
pub type LocationCountLogger = ToFileLogger<LocationCounts>;
pub type TargetLogger<T> = ToFileLogger<TargetSamples<T>>;

impl ToFileLogger<SizeDistribution> {
    pub fn new(
        path: impl Into<PathBuf>,
        schedule: SamplingSchedule,
        max_size: usize,
        include_intra_zonal: bool,
    ) -> Self {
        Self::with_columns(path, schedule, SizeDistribution::new(max_size, include_intra_zonal))
    }
}

impl ToFileLogger<LocationCounts> {
    pub fn new(path: impl Into<PathBuf>, schedule: SamplingSchedule, scenario: &Scenario) -> Self {
        Self::with_columns(path, schedule, LocationCounts::new(scenario))
    }
}

impl<T: PopulationTarget> ToFileLogger<TargetSamples<T>> {
    pub fn new(
        path: impl Into<PathBuf>,
        schedule: SamplingSchedule,
        target: T,
        filter: Option<PopulationGroupFilter>,
    ) -> Self {
        Self::with_columns(path, schedule, TargetSamples::new(target, filter))
    }
}

/**
Collects a statistic of every sampled state in memory.

The samples live behind a shared handle, so they stay readable after the
collector has been moved into a sampler.
*/
pub struct SampleCollector<S, T> {
    schedule: SamplingSchedule,
    statistic: Box<dyn FnMut(&S) -> T + Send>,
    samples: Arc<Mutex<Vec<T>>>,
}

impl<S, T> SampleCollector<S, T> {
    pub fn new(
        schedule: SamplingSchedule,
        statistic: impl FnMut(&S) -> T + Send + 'static,
    ) -> Self {
        Self {
            schedule,
            statistic: Box::new(statistic),
            samples: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn handle(&self) -> Arc<Mutex<Vec<T>>> {
        Arc::clone(&self.samples)
    }
}

impl<S, T: Send> StateProcessor<S> for SampleCollector<S, T> {
    fn process_state(&mut self, iteration: u64, state: &S) -> Result<(), SamplerError> {
        if self.schedule.should_sample(iteration) {
            let value = (self.statistic)(state);
            self.samples
                .lock()
                .map_err(|_| SamplerError::InvalidArgument("sample store is poisoned".to_string()))?
                .push(value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{Location, LocationId, ScenarioBuilder};
    use crate::weights::HomeLocationTarget;
    use tempfile::{tempdir, NamedTempFile};

    const A: LocationId = LocationId(0);
    const B: LocationId = LocationId(1);

    fn scenario() -> Scenario {
        let mut builder = ScenarioBuilder::new(1.0, 24).unwrap();
        builder.add_location(Location::new("A")).unwrap();
        builder.add_location(Location::new("B")).unwrap();
        builder.set_symmetric_time_h(A, B, 1.0).unwrap();
        builder.build().unwrap()
    }

    fn population() -> MultiRoundTrip {
        MultiRoundTrip::new(vec![
            RoundTrip::new(vec![A, B], vec![2, 9]).unwrap(),
            RoundTrip::new(vec![A, A, B], vec![2, 5, 9]).unwrap(),
            RoundTrip::new(vec![B], vec![0]).unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn test_size_distribution_respects_schedule() {
        let file = NamedTempFile::new().expect("Could not create temp file");
        let mut logger =
            SizeDistributionLogger::new(file.path(), SamplingSchedule::new(1, 2), 3, true);
        logger.start().unwrap();
        for k in 0..5 {
            logger.process_state(k, &population()).unwrap();
        }
        logger.end().unwrap();

        let contents = fs::read_to_string(file.path()).unwrap();
        let expected = "iteration\tsize=0\tsize=1\tsize=2\tsize=3\n1\t0\t1\t1\t1\n3\t0\t1\t1\t1\n";
        assert_eq!(contents, expected);
        assert_eq!(logger.columns().last_size_counts(), &[0, 1, 1, 1]);
    }

    #[test]
    fn test_inter_zonal_sizes() {
        let mut columns = SizeDistribution::new(3, false);
        assert_eq!(columns.values(&population()), vec!["1", "0", "2", "0"]);
    }

    #[test]
    fn test_location_counts_creates_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("locations.tsv");
        let mut logger =
            LocationCountLogger::new(&path, SamplingSchedule::every_iteration(), &scenario());
        StateProcessor::<MultiRoundTrip>::start(&mut logger).unwrap();
        logger.process_state(0, &population()).unwrap();
        StateProcessor::<MultiRoundTrip>::end(&mut logger).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "iteration\tA\tB\n0\t3\t3\n");
    }

    #[test]
    #[should_panic(expected = "location #2 is not part of the logged scenario")]
    fn test_location_counts_panic_on_foreign_location() {
        let mut columns = LocationCounts::new(&scenario());
        let foreign = RoundTrip::new(vec![A, LocationId(2)], vec![2, 9]).unwrap();
        LogColumns::<RoundTrip>::values(&mut columns, &foreign);
    }

    #[test]
    fn test_target_logger() {
        let file = NamedTempFile::new().expect("Could not create temp file");
        let scenario = scenario();
        let mut target = HomeLocationTarget::new(&scenario);
        target.set_target(A, 1.0).unwrap().set_target(B, 1.0).unwrap();
        let mut logger =
            TargetLogger::new(file.path(), SamplingSchedule::every_iteration(), target, None);
        logger.start().unwrap();
        logger.process_state(7, &population()).unwrap();
        logger.end().unwrap();
        let contents = fs::read_to_string(file.path()).unwrap();
        assert_eq!(contents, "iteration\tA\tB\n7\t2\t1\n");
    }

    #[test]
    fn test_unstarted_logger_fails() {
        let file = NamedTempFile::new().expect("Could not create temp file");
        let schedule = SamplingSchedule::every_iteration();
        let mut logger = SizeDistributionLogger::new(file.path(), schedule, 3, true);
        assert!(logger.process_state(0, &population()).is_err());
    }

    #[test]
    fn test_start_fails_on_unwritable_path() {
        let file = NamedTempFile::new().expect("Could not create temp file");
        // A regular file cannot act as a directory.
        let mut logger = SizeDistributionLogger::new(
            file.path().join("sizes.tsv"),
            SamplingSchedule::every_iteration(),
            3,
            true,
        );
        assert!(StateProcessor::<MultiRoundTrip>::start(&mut logger).is_err());
    }

    #[test]
    fn test_sample_collector() {
        let mut collector =
            SampleCollector::new(SamplingSchedule::new(2, 1), |rt: &RoundTrip| rt.size());
        let handle = collector.handle();
        let rt = RoundTrip::new(vec![A, B], vec![2, 9]).unwrap();
        for k in 0..4 {
            collector.process_state(k, &rt).unwrap();
        }
        assert_eq!(*handle.lock().unwrap(), vec![2, 2]);
    }
}

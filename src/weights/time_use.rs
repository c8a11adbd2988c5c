/*!
Time-of-day weights built on stay overlaps with (possibly wrapping) windows.

[`LogarithmicTimeUse`] rewards time spent at activity locations with a
logarithmic utility per activity. [`AtHomeOverNight`] asks the home stay to
overlap a night window.
*/

use std::collections::HashMap;

use crate::multiple::MultiRoundTrip;
use crate::round_trip::RoundTrip;
use crate::scenario::LocationId;
use crate::simulator::{effective_intervals, overlap_h, Episode, StayEpisode};
use crate::weights::SamplingWeight;

/// Floor on effective durations before taking logarithms.
const MIN_DURATION_H: f64 = 0.001;

/**
Accumulated time at one activity.

Only the parts of a stay that fall into the opening times count. A stay
shorter than `min_en_block_each_time_h` (after clipping) does not count at
all, and the activity is worth nothing unless at least one counted stay lasts
`min_en_block_at_least_once_h`.
*/
#[derive(Debug, Clone, PartialEq)]
pub struct TimeUseComponent {
    target_duration_h: f64,
    period_h: f64,
    open_intervals_h: Vec<(f64, f64)>,
    min_en_block_at_least_once_h: f64,
    min_en_block_each_time_h: f64,
    valid: bool,
    effective_duration_sum_h: f64,
}

impl TimeUseComponent {
    pub fn new(target_duration_h: f64, period_h: f64) -> Self {
        Self {
            target_duration_h,
            period_h,
            open_intervals_h: vec![(0.0, period_h)],
            min_en_block_at_least_once_h: 0.0,
            min_en_block_each_time_h: 0.0,
            valid: false,
            effective_duration_sum_h: 0.0,
        }
    }

    /// Opening times; `start_h > end_h` wraps around midnight.
    pub fn with_opening_times_h(mut self, start_h: f64, end_h: f64) -> Self {
        self.open_intervals_h = if start_h < end_h {
            vec![(start_h, end_h)]
        } else {
            vec![(0.0, end_h), (start_h, self.period_h)]
        };
        self
    }

    pub fn with_min_en_block_at_least_once_h(mut self, duration_h: f64) -> Self {
        self.min_en_block_at_least_once_h = duration_h;
        self
    }

    pub fn with_min_en_block_each_time_h(mut self, duration_h: f64) -> Self {
        self.min_en_block_each_time_h = duration_h;
        self
    }

    pub fn target_duration_h(&self) -> f64 {
        self.target_duration_h
    }

    pub fn open_intervals_h(&self) -> &[(f64, f64)] {
        &self.open_intervals_h
    }

    pub fn reset(&mut self) {
        self.valid = false;
        self.effective_duration_sum_h = 0.0;
    }

    pub fn update(&mut self, stay: &StayEpisode) {
        let effective_h = overlap_h(
            stay.duration_h,
            stay.end_time_h,
            &self.open_intervals_h,
            self.period_h,
        );
        if effective_h >= self.min_en_block_each_time_h {
            self.effective_duration_sum_h += effective_h;
            self.valid |= effective_h >= self.min_en_block_at_least_once_h;
        }
    }

    pub fn effective_duration_h(&self) -> f64 {
        if self.valid {
            self.effective_duration_sum_h
        } else {
            0.0
        }
    }
}

/**
`Σ target_h · ln(max(0.001, effective_h))` over all activities.

Each activity is a [`TimeUseComponent`] assigned to one or more
(location, slot) pairs; a stay at an assigned location of that population
slot accumulates into the component. Single round trips use slot `0`.
Round trips must carry simulated episodes.
*/
#[derive(Debug, Clone, Default)]
pub struct LogarithmicTimeUse {
    components: Vec<TimeUseComponent>,
    assignment: HashMap<(LocationId, usize), usize>,
}

impl LogarithmicTimeUse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an activity and returns its index.
    pub fn add_component(&mut self, component: TimeUseComponent) -> usize {
        self.components.push(component);
        self.components.len() - 1
    }

    /// Routes stays at `location` in population slot `slot` to activity `component`.
    pub fn assign(&mut self, component: usize, location: LocationId, slot: usize) -> &mut Self {
        assert!(component < self.components.len(), "unknown component {component}");
        self.assignment.insert((location, slot), component);
        self
    }

    /// Adds `component` and assigns it to a single (location, slot) pair.
    pub fn assign_component(
        &mut self,
        component: TimeUseComponent,
        location: LocationId,
        slot: usize,
    ) -> usize {
        let index = self.add_component(component);
        self.assign(index, location, slot);
        index
    }

    pub fn components(&self) -> &[TimeUseComponent] {
        &self.components
    }

    /// Resets every activity, then folds all stays of the given slots into them.
    pub fn update<'a>(&mut self, round_trips: impl IntoIterator<Item = (usize, &'a RoundTrip)>) {
        for component in self.components.iter_mut() {
            component.reset();
        }
        for (slot, round_trip) in round_trips {
            let stays = round_trip.episodes().iter().filter_map(Episode::as_stay);
            for stay in stays {
                if let Some(&c) = self.assignment.get(&(stay.location, slot)) {
                    self.components[c].update(stay);
                }
            }
        }
    }

    fn compute_log_weight<'a>(
        &mut self,
        round_trips: impl IntoIterator<Item = (usize, &'a RoundTrip)>,
    ) -> f64 {
        self.update(round_trips);
        self.components
            .iter()
            .map(|c| c.target_duration_h * c.effective_duration_h().max(MIN_DURATION_H).ln())
            .sum()
    }
}

impl SamplingWeight<RoundTrip> for LogarithmicTimeUse {
    fn log_weight(&mut self, state: &RoundTrip) -> f64 {
        self.compute_log_weight(std::iter::once((0, state)))
    }
}

impl SamplingWeight<MultiRoundTrip> for LogarithmicTimeUse {
    fn log_weight(&mut self, state: &MultiRoundTrip) -> f64 {
        self.compute_log_weight(state.iter().enumerate())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Soft { strictness: f64 },
    Hard,
}

/**
Asks the home stay to overlap the window of `interval_duration_h` hours
ending at `end_time_h` by at least `target_duration_h`.

The soft variant scores `strictness · ln(overlap / target)` with the overlap
clipped to `[0.001 · target, target]`. The hard variant rejects every round
trip that falls short.
*/
#[derive(Debug, Clone, PartialEq)]
pub struct AtHomeOverNight {
    target_duration_h: f64,
    period_h: f64,
    intervals_h: Vec<(f64, f64)>,
    mode: Mode,
}

impl AtHomeOverNight {
    pub fn new(
        target_duration_h: f64,
        interval_duration_h: f64,
        end_time_h: f64,
        period_h: f64,
        strictness: f64,
    ) -> Self {
        Self {
            target_duration_h,
            period_h,
            intervals_h: effective_intervals(interval_duration_h, end_time_h, period_h),
            mode: Mode::Soft { strictness },
        }
    }

    pub fn hard(
        target_duration_h: f64,
        interval_duration_h: f64,
        end_time_h: f64,
        period_h: f64,
    ) -> Self {
        Self {
            mode: Mode::Hard,
            ..Self::new(target_duration_h, interval_duration_h, end_time_h, period_h, 1.0)
        }
    }

    /// Hours the home stay of `round_trip` spends inside the window.
    pub fn home_overlap_h(&self, round_trip: &RoundTrip) -> f64 {
        round_trip
            .episodes()
            .first()
            .map_or(0.0, |home| home.overlap_h(&self.intervals_h, self.period_h))
    }

    fn is_at_home(&self, round_trip: &RoundTrip) -> bool {
        self.home_overlap_h(round_trip) >= self.target_duration_h
    }
}

impl SamplingWeight<RoundTrip> for AtHomeOverNight {
    fn log_weight(&mut self, state: &RoundTrip) -> f64 {
        match self.mode {
            Mode::Soft { strictness } => {
                let overlap_h = self
                    .home_overlap_h(state)
                    .min(self.target_duration_h)
                    .max(MIN_DURATION_H * self.target_duration_h);
                strictness * (overlap_h.ln() - self.target_duration_h.ln())
            }
            Mode::Hard if self.is_at_home(state) => 0.0,
            Mode::Hard => f64::NEG_INFINITY,
        }
    }

    fn accept(&mut self, state: &RoundTrip) -> bool {
        match self.mode {
            Mode::Soft { .. } => true,
            Mode::Hard => self.is_at_home(state),
        }
    }
}

/*!
Episodes and the simulator that derives them from a round trip.

A round trip with `n >= 2` stays expands into `2n` alternating episodes:
the home stay, the move to stay `1`, stay `1`, and so on, ending with the
move back home. A round trip with a single stay is one stay spanning the
whole period.

Times are in hours. An episode ends at `end_time_h` and lasts `duration_h`;
the home stay may start before time zero, in which case it wraps around the
period boundary.
*/

use std::sync::Arc;

use crate::round_trip::RoundTrip;
use crate::scenario::{LocationId, Scenario};

/// Length of the overlap of `[a0, a1]` and `[b0, b1]`.
pub fn interval_overlap(a0: f64, a1: f64, b0: f64, b1: f64) -> f64 {
    (a1.min(b1) - a0.max(b0)).max(0.0)
}

/**
Maps an activity that ends at `end_h` after `duration_h` hours onto the
period `[0, period_h]`.

Returns one interval, or two if the activity wraps around the period
boundary. Activities longer than the period cover all of it.
*/
pub fn effective_intervals(duration_h: f64, end_h: f64, period_h: f64) -> Vec<(f64, f64)> {
    debug_assert!(duration_h >= 0.0, "negative duration {duration_h}");
    if duration_h > period_h {
        return vec![(0.0, period_h)];
    }
    let mut end = end_h;
    while end < 0.0 {
        end += period_h;
    }
    while end > period_h {
        end -= period_h;
    }
    let start = end - duration_h;
    if start < 0.0 {
        vec![(start + period_h, period_h), (0.0, end)]
    } else {
        vec![(start, end)]
    }
}

/// Total overlap between an activity and a set of within-period intervals.
pub fn overlap_h(duration_h: f64, end_h: f64, intervals: &[(f64, f64)], period_h: f64) -> f64 {
    effective_intervals(duration_h, end_h, period_h)
        .iter()
        .flat_map(|&(a0, a1)| {
            intervals
                .iter()
                .map(move |&(b0, b1)| interval_overlap(a0, a1, b0, b1))
        })
        .sum()
}

#[derive(Debug, Clone, PartialEq)]
pub struct StayEpisode {
    pub location: LocationId,
    pub end_time_h: f64,
    pub duration_h: f64,
    /// Whether the stay location offers charging.
    pub charging: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MoveEpisode {
    pub origin: LocationId,
    pub destination: LocationId,
    pub end_time_h: f64,
    pub duration_h: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Episode {
    Stay(StayEpisode),
    Move(MoveEpisode),
}

impl Episode {
    pub fn end_time_h(&self) -> f64 {
        match self {
            Episode::Stay(stay) => stay.end_time_h,
            Episode::Move(mv) => mv.end_time_h,
        }
    }

    pub fn duration_h(&self) -> f64 {
        match self {
            Episode::Stay(stay) => stay.duration_h,
            Episode::Move(mv) => mv.duration_h,
        }
    }

    /// Start time folded into `[0, period_h)`.
    pub fn start_time_h(&self, period_h: f64) -> f64 {
        (self.end_time_h() - self.duration_h()).rem_euclid(period_h)
    }

    pub fn effective_intervals(&self, period_h: f64) -> Vec<(f64, f64)> {
        effective_intervals(self.duration_h(), self.end_time_h(), period_h)
    }

    pub fn overlap_h(&self, intervals: &[(f64, f64)], period_h: f64) -> f64 {
        overlap_h(self.duration_h(), self.end_time_h(), intervals, period_h)
    }

    pub fn as_stay(&self) -> Option<&StayEpisode> {
        match self {
            Episode::Stay(stay) => Some(stay),
            Episode::Move(_) => None,
        }
    }

    pub fn as_move(&self) -> Option<&MoveEpisode> {
        match self {
            Episode::Move(mv) => Some(mv),
            Episode::Stay(_) => None,
        }
    }
}

/// Derives the episode sequence of a round trip.
pub trait Simulator: Send + Sync {
    fn simulate(&self, round_trip: &RoundTrip) -> Vec<Episode>;

    /// Simulates `round_trip` and stores the episodes in it.
    fn attach(&self, mut round_trip: RoundTrip) -> RoundTrip {
        let episodes = self.simulate(&round_trip);
        round_trip.set_episodes(episodes);
        round_trip
    }
}

/**
Deterministic simulator driven by the scenario's travel-time matrix.

Starting at the first departure, each move takes the scenario travel time and
each stay lasts until its departure bin starts, or zero hours if the traveler
arrives late. The home stay covers the time between the return and the first
departure of the next period.
*/
#[derive(Debug, Clone)]
pub struct DefaultSimulator {
    scenario: Arc<Scenario>,
}

impl DefaultSimulator {
    pub fn new(scenario: Arc<Scenario>) -> Self {
        Self { scenario }
    }

    fn stay(&self, location: LocationId, start_h: f64, departure_h: f64) -> StayEpisode {
        let end_time_h = start_h.max(departure_h);
        StayEpisode {
            location,
            end_time_h,
            duration_h: end_time_h - start_h,
            charging: self.scenario.location(location).allows_charging(),
        }
    }

    fn travel(&self, origin: LocationId, destination: LocationId, start_h: f64) -> MoveEpisode {
        let duration_h = self.scenario.time_h(origin, destination);
        MoveEpisode {
            origin,
            destination,
            end_time_h: start_h + duration_h,
            duration_h,
        }
    }
}

impl Simulator for DefaultSimulator {
    fn simulate(&self, round_trip: &RoundTrip) -> Vec<Episode> {
        let period_h = self.scenario.period_length_h();
        let n = round_trip.size();
        if n == 1 {
            return vec![Episode::Stay(StayEpisode {
                location: round_trip.home(),
                end_time_h: period_h,
                duration_h: period_h,
                charging: self.scenario.location(round_trip.home()).allows_charging(),
            })];
        }

        let mut episodes = Vec::with_capacity(2 * n);
        let first_departure_h = self.scenario.bin_start_h(round_trip.departure(0));
        let mut time_h = first_departure_h;
        for i in 1..n {
            let mv = self.travel(round_trip.location(i - 1), round_trip.location(i), time_h);
            let stay = self.stay(
                round_trip.location(i),
                mv.end_time_h,
                self.scenario.bin_start_h(round_trip.departure(i)),
            );
            time_h = stay.end_time_h;
            episodes.push(Episode::Move(mv));
            episodes.push(Episode::Stay(stay));
        }
        let back = self.travel(round_trip.location(n - 1), round_trip.home(), time_h);
        let home = self.stay(
            round_trip.home(),
            back.end_time_h - period_h,
            first_departure_h,
        );
        episodes.push(Episode::Move(back));
        episodes.insert(0, Episode::Stay(home));
        episodes
    }
}

//! Penalizes round trips whose home stay is too short to close the period.

use crate::round_trip::RoundTrip;
use crate::simulator::Episode;
use crate::weights::SamplingWeight;

/**
The home stay starts where the last move home ends, shifted back by one
period. A round trip that leaves home again before `min_home_duration_h`
hours have passed since it came back violates the periodic schedule by the
missing hours.
*/
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodicScheduleWeight {
    min_home_duration_h: f64,
    period_h: f64,
}

impl PeriodicScheduleWeight {
    pub fn new(min_home_duration_h: f64, period_h: f64) -> Self {
        assert!(period_h > 0.0, "period must be positive, got {period_h}");
        Self {
            min_home_duration_h,
            period_h,
        }
    }

    /// Hours by which the home stay falls short; zero for single-stay round trips.
    pub fn discrepancy_h(&self, round_trip: &RoundTrip) -> f64 {
        if round_trip.size() == 1 {
            return 0.0;
        }
        match round_trip.episodes() {
            [Episode::Stay(home), Episode::Move(leave_home), ..] => {
                let earliest_leave_h = home.end_time_h - home.duration_h + self.min_home_duration_h;
                let realized_leave_h = leave_home.end_time_h - leave_home.duration_h;
                (earliest_leave_h - realized_leave_h).max(0.0)
            }
            _ => panic!("round trip {round_trip} has not been simulated"),
        }
    }
}

impl SamplingWeight<RoundTrip> for PeriodicScheduleWeight {
    fn log_weight(&mut self, state: &RoundTrip) -> f64 {
        -self.discrepancy_h(state) / self.period_h
    }
}

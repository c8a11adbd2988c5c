/*!
Maximum-entropy priors on round-trip size.

Under a uniform proposal the number of round trips of size `j` grows like
`C(T, j) · L^j` (`T` time bins, `L` locations). The single-round-trip prior
divides a binomial envelope by that count, so that the size of a sampled round
trip follows the envelope rather than the combinatorics of the state space.

For populations, [`ChiSquaredSizePrior`] compares the realized size histogram
with the binomial size distribution implied by the realized mean size and
scores the χ² statistic under a χ²(N) density.
*/

use statrs::distribution::{Binomial, ChiSquared, Continuous, Discrete};
use statrs::function::factorial::ln_binomial;

use crate::error::SamplerError;
use crate::multiple::MultiRoundTrip;
use crate::round_trip::RoundTrip;
use crate::scenario::Scenario;
use crate::weights::{SamplingWeight, SingleToMultiWeight};

#[derive(Debug, Clone)]
pub struct MaximumEntropyPriorFactory {
    max_round_trip_length: usize,
    log_round_trip_cnt_by_size: Vec<f64>,
}

impl MaximumEntropyPriorFactory {
    pub fn new(location_cnt: usize, time_bin_cnt: usize, max_round_trip_length: usize) -> Self {
        let max_round_trip_length = max_round_trip_length.min(time_bin_cnt);
        let log_location_cnt = (location_cnt as f64).ln();
        let log_round_trip_cnt_by_size = (0..=max_round_trip_length)
            .map(|j| ln_binomial(time_bin_cnt as u64, j as u64) + j as f64 * log_location_cnt)
            .collect();
        Self {
            max_round_trip_length,
            log_round_trip_cnt_by_size,
        }
    }

    pub fn from_scenario(scenario: &Scenario) -> Self {
        Self::new(
            scenario.location_cnt(),
            scenario.time_bin_cnt(),
            scenario.max_stay_episodes(),
        )
    }

    pub fn max_round_trip_length(&self) -> usize {
        self.max_round_trip_length
    }

    fn binomial_log_weights(
        &self,
        mean_length: f64,
        correct: bool,
    ) -> Result<Vec<f64>, SamplerError> {
        let max = self.max_round_trip_length;
        if !(0.0..=max as f64).contains(&mean_length) {
            return Err(SamplerError::InvalidArgument(format!(
                "mean round trip length {mean_length} is outside [0, {max}]"
            )));
        }
        let binomial = Binomial::new(mean_length / max as f64, max as u64)
            .map_err(|e| SamplerError::InvalidArgument(e.to_string()))?;
        Ok((0..=max)
            .map(|j| {
                let lw = binomial.ln_pmf(j as u64);
                if correct {
                    lw - self.log_round_trip_cnt_by_size[j]
                } else {
                    lw
                }
            })
            .collect())
    }

    /// Size prior for a single round trip with target mean size `mean_length`.
    pub fn create_single(&self, mean_length: f64) -> Result<SizePrior, SamplerError> {
        Ok(SizePrior {
            log_weights: self.binomial_log_weights(mean_length, true)?,
        })
    }

    /// The single size prior applied to every slot of a population.
    pub fn create_singles(
        &self,
        mean_length: f64,
    ) -> Result<SingleToMultiWeight<SizePrior>, SamplerError> {
        Ok(SingleToMultiWeight::new(self.create_single(mean_length)?))
    }

    /// χ² size prior for a population of `population_size` round trips.
    pub fn create_multiple(
        &self,
        population_size: usize,
    ) -> Result<ChiSquaredSizePrior, SamplerError> {
        let size_probas_by_mean = (0..=self.max_round_trip_length)
            .map(|mean| {
                let log_weights = self.binomial_log_weights(mean as f64, false)?;
                Ok(probas_from_log_weights(&log_weights))
            })
            .collect::<Result<Vec<_>, SamplerError>>()?;
        let chi2 = ChiSquared::new(population_size as f64)
            .map_err(|e| SamplerError::InvalidArgument(e.to_string()))?;
        Ok(ChiSquaredSizePrior {
            population_size,
            size_probas_by_mean,
            chi2,
        })
    }
}

/// Normalizes `exp(log_weights)` to a probability vector.
fn probas_from_log_weights(log_weights: &[f64]) -> Vec<f64> {
    let max = log_weights
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    let weights: Vec<f64> = log_weights.iter().map(|lw| (lw - max).exp()).collect();
    let sum: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / sum).collect()
}

/// Log weight by round-trip size.
#[derive(Debug, Clone)]
pub struct SizePrior {
    log_weights: Vec<f64>,
}

impl SizePrior {
    pub fn log_weights(&self) -> &[f64] {
        &self.log_weights
    }
}

impl SamplingWeight<RoundTrip> for SizePrior {
    fn log_weight(&mut self, state: &RoundTrip) -> f64 {
        self.log_weights
            .get(state.size())
            .copied()
            .unwrap_or(f64::NEG_INFINITY)
    }
}

#[derive(Debug, Clone)]
pub struct ChiSquaredSizePrior {
    population_size: usize,
    /// `size_probas_by_mean[m][j]`: probability of size `j` given mean size `m`.
    size_probas_by_mean: Vec<Vec<f64>>,
    chi2: ChiSquared,
}

impl ChiSquaredSizePrior {
    /// χ² statistic of the population's size histogram.
    pub fn statistic(&self, population: &MultiRoundTrip) -> f64 {
        let max = self.size_probas_by_mean.len() - 1;
        let n = population.size() as f64;
        let mut frequencies = vec![0usize; max + 1];
        for rt in population {
            match frequencies.get_mut(rt.size()) {
                Some(f) => *f += 1,
                None => return f64::INFINITY,
            }
        }
        let mean = population.stay_cnt() as f64 / n;
        let floor = (mean.floor() as usize).min(max);
        let ceil = (floor + 1).min(max);
        let upper_weight = mean - floor as f64;

        let lower = &self.size_probas_by_mean[floor];
        let upper = &self.size_probas_by_mean[ceil];
        let mut chi2 = 0.0;
        for (j, &freq) in frequencies.iter().enumerate() {
            let p = (1.0 - upper_weight) * lower[j] + upper_weight * upper[j];
            let residual = freq as f64 - p * n;
            if p > 0.0 {
                chi2 += residual * residual / p;
            } else if freq > 0 {
                return f64::INFINITY;
            }
        }
        chi2
    }
}

impl SamplingWeight<MultiRoundTrip> for ChiSquaredSizePrior {
    fn log_weight(&mut self, state: &MultiRoundTrip) -> f64 {
        debug_assert_eq!(state.size(), self.population_size);
        let statistic = self.statistic(state);
        if statistic.is_finite() {
            self.chi2.ln_pdf(statistic)
        } else {
            f64::NEG_INFINITY
        }
    }

    fn name(&self) -> String {
        "Chi2Prior".to_string()
    }
}

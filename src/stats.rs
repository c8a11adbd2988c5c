//! Running chain diagnostics: windowed acceptance rate, feature moments and R-hat.

use ndarray::prelude::*;
use ndarray_stats::QuantileExt;
use num_traits::ToPrimitive;
use std::collections::VecDeque;

use crate::error::SamplerError;

/// Number of recent steps the acceptance rate is averaged over.
const ACCEPT_WINDOW: usize = 100;

/**
Tracks one chain: the acceptance rate over the last steps and the running mean
and mean square of a fixed-length feature vector of the visited states.
*/
#[derive(Debug, Clone, PartialEq)]
pub struct ChainTracker {
    n_params: usize,
    n: u64,
    p_accept: f64,
    mean: Array1<f64>,    // n_params
    mean_sq: Array1<f64>, // n_params
    accept_queue: VecDeque<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChainStats {
    pub n: u64,
    pub p_accept: f64,
    pub mean: Array1<f64>, // n_params
    pub sm2: Array1<f64>,  // n_params
}

impl ChainTracker {
    pub fn new(n_params: usize) -> Self {
        Self {
            n_params,
            n: 0,
            p_accept: 0.0,
            mean: Array1::zeros(n_params),
            mean_sq: Array1::zeros(n_params),
            accept_queue: VecDeque::with_capacity(ACCEPT_WINDOW + 1),
        }
    }

    pub fn n_params(&self) -> usize {
        self.n_params
    }

    /// Records one step and the features of the state the chain is in after it.
    pub fn step<T: ToPrimitive>(&mut self, accepted: bool, x: &[T]) -> Result<(), SamplerError> {
        if x.len() != self.n_params {
            return Err(SamplerError::InvalidArgument(format!(
                "expected {} features, got {}",
                self.n_params,
                x.len()
            )));
        }
        let x_arr = x
            .iter()
            .map(|v| {
                v.to_f64().ok_or_else(|| {
                    SamplerError::InvalidArgument("feature is not representable as f64".to_string())
                })
            })
            .collect::<Result<Array1<f64>, _>>()?;

        self.accept_queue.push_back(accepted);
        if self.accept_queue.len() > ACCEPT_WINDOW {
            self.accept_queue.pop_front();
        }
        let accepted_cnt = self.accept_queue.iter().filter(|&&a| a).count();
        self.p_accept = accepted_cnt as f64 / self.accept_queue.len() as f64;

        self.n += 1;
        let n = self.n as f64;
        self.mean = (&self.mean * (n - 1.0) + &x_arr) / n;
        self.mean_sq = (&self.mean_sq * (n - 1.0) + x_arr.pow2()) / n;
        Ok(())
    }

    pub fn n(&self) -> u64 {
        self.n
    }

    /// Acceptance rate over the last 100 steps.
    pub fn p_accept(&self) -> f64 {
        self.p_accept
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    /// Unbiased sample variance of each feature; zero before the second step.
    pub fn sm2(&self) -> Array1<f64> {
        if self.n < 2 {
            return Array1::zeros(self.n_params);
        }
        let n = self.n as f64;
        (&self.mean_sq - &self.mean.pow2()) * n / (n - 1.0)
    }

    pub fn stats(&self) -> ChainStats {
        ChainStats {
            n: self.n,
            p_accept: self.p_accept,
            mean: self.mean.clone(),
            sm2: self.sm2(),
        }
    }
}

/**
Potential scale reduction factor per feature across chains.

With `W` the mean within-chain variance, `B` the variance of the chain means
and `n` the mean chain length, `R̂ = sqrt((B + W (n − 1) / n) / W)`.
*/
pub fn collect_rhat(all_chain_stats: &[&ChainStats]) -> Result<Array1<f64>, SamplerError> {
    if all_chain_stats.len() < 2 {
        return Err(SamplerError::InvalidArgument(
            "R-hat needs at least two chains".to_string(),
        ));
    }
    let stack = |views: Vec<ArrayView1<f64>>| {
        ndarray::stack(Axis(0), &views).map_err(|e| SamplerError::InvalidArgument(e.to_string()))
    };
    let means = stack(all_chain_stats.iter().map(|x| x.mean.view()).collect())?;
    let sm2s = stack(all_chain_stats.iter().map(|x| x.sm2.view()).collect())?;

    let empty = || SamplerError::InvalidArgument("no chain statistics".to_string());
    let w = sm2s.mean_axis(Axis(0)).ok_or_else(empty)?;
    let global_means = means.mean_axis(Axis(0)).ok_or_else(empty)?;
    let diffs = &means - &global_means.insert_axis(Axis(0));
    let b = diffs.pow2().sum_axis(Axis(0)) / (all_chain_stats.len() - 1) as f64;

    let n = all_chain_stats.iter().map(|x| x.n as f64).sum::<f64>() / all_chain_stats.len() as f64;
    Ok(((b + &w * ((n - 1.0) / n)) / w).mapv(f64::sqrt))
}

/// Largest R-hat over all features.
pub fn max_rhat(all_chain_stats: &[&ChainStats]) -> Result<f64, SamplerError> {
    let rhat = collect_rhat(all_chain_stats)?;
    rhat.max()
        .copied()
        .map_err(|e| SamplerError::InvalidArgument(format!("R-hat: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn run(values: &[f64]) -> ChainStats {
        let mut tracker = ChainTracker::new(1);
        for &v in values {
            tracker.step(true, &[v]).unwrap();
        }
        tracker.stats()
    }

    #[test]
    fn test_moments() {
        let stats = run(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(stats.n, 4);
        assert_abs_diff_eq!(stats.mean[0], 2.5);
        assert_abs_diff_eq!(stats.sm2[0], 5.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_acceptance_window() {
        let mut tracker = ChainTracker::new(0);
        let none: [f64; 0] = [];
        for _ in 0..100 {
            tracker.step(false, &none).unwrap();
        }
        assert_eq!(tracker.p_accept(), 0.0);
        for _ in 0..50 {
            tracker.step(true, &none).unwrap();
        }
        assert_abs_diff_eq!(tracker.p_accept(), 0.5);
        for _ in 0..100 {
            tracker.step(true, &none).unwrap();
        }
        assert_eq!(tracker.p_accept(), 1.0);
    }

    #[test]
    fn test_feature_count_mismatch() {
        let mut tracker = ChainTracker::new(2);
        assert!(tracker.step(true, &[1u32]).is_err());
        assert!(tracker.step(true, &[1u32, 2]).is_ok());
    }

    #[test]
    fn test_rhat_of_identical_chains_is_below_one() {
        let a = run(&[1.0, 2.0, 3.0, 4.0]);
        let b = run(&[4.0, 3.0, 2.0, 1.0]);
        // B = 0, so R-hat = sqrt((n - 1) / n).
        let rhat = collect_rhat(&[&a, &b]).unwrap();
        assert_abs_diff_eq!(rhat[0], (0.75f64).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_rhat_detects_separated_chains() {
        let a = run(&[0.0, 1.0, 0.0, 1.0]);
        let b = run(&[10.0, 11.0, 10.0, 11.0]);
        assert!(max_rhat(&[&a, &b]).unwrap() > 5.0);
        assert!(collect_rhat(&[&a]).is_err());
    }
}

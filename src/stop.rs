//! Stopping policies for the inner sift loop.
//!
//! A policy sees one [`SiftIteration`] at a time and decides whether the
//! freshly computed candidate is accepted as the IMF. Every built-in policy
//! compares energies or ratios, never absolute magnitudes, so scaling the
//! input scales the extracted IMF without changing when sifting stops.

use serde::{Deserialize, Serialize};

use crate::signal::energy;

/// State of the inner sift loop after one envelope-mean subtraction.
#[derive(Debug, Clone, Copy)]
pub struct SiftIteration<'a> {
    /// 1-based iteration counter.
    pub iteration: usize,
    /// Candidate before the mean envelope was removed.
    pub previous: &'a [f64],
    /// Candidate after the mean envelope was removed.
    pub candidate: &'a [f64],
    pub upper: &'a [f64],
    pub lower: &'a [f64],
    pub mean: &'a [f64],
}

/// Decides when a sift candidate is accepted as an IMF.
pub trait StopCriterion: Send + Sync {
    fn should_stop(&self, state: &SiftIteration<'_>) -> bool;

    /// Policies that lock to a fixed iteration count are not expected to
    /// converge, so reaching the iteration bound is not reported for them.
    fn is_fixed(&self) -> bool {
        false
    }
}

/// Cauchy-type criterion: `sum((prev - next)^2) / sum(prev^2) < threshold`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SdStop {
    pub threshold: f64,
}

impl SdStop {
    pub fn metric(previous: &[f64], candidate: &[f64]) -> f64 {
        let denom = energy(previous);
        if denom == 0.0 {
            return 0.0;
        }
        let num: f64 = previous
            .iter()
            .zip(candidate.iter())
            .map(|(p, c)| (p - c).powi(2))
            .sum();
        num / denom
    }
}

impl StopCriterion for SdStop {
    fn should_stop(&self, state: &SiftIteration<'_>) -> bool {
        let metric = Self::metric(state.previous, state.candidate);
        tracing::trace!(iteration = state.iteration, metric, "sd stop check");
        metric < self.threshold
    }
}

/// Rilling, Flandrin and Goncalves (2003) criterion on the evaluation
/// function `|mean| / amplitude`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RillingStop {
    /// Threshold the evaluation function may exceed on a small fraction of samples.
    pub sd1: f64,
    /// Threshold the evaluation function may never exceed.
    pub sd2: f64,
    /// Tolerated fraction of samples above `sd1`.
    pub tol: f64,
}

impl StopCriterion for RillingStop {
    fn should_stop(&self, state: &SiftIteration<'_>) -> bool {
        let mut above_sd1 = 0usize;
        let mut above_sd2 = false;
        for ((u, l), m) in state.upper.iter().zip(state.lower.iter()).zip(state.mean.iter()) {
            let amplitude = 0.5 * (u - l).abs();
            let eval = if amplitude > 0.0 {
                m.abs() / amplitude
            } else if *m == 0.0 {
                0.0
            } else {
                f64::INFINITY
            };
            if eval > self.sd1 {
                above_sd1 += 1;
            }
            if eval > self.sd2 {
                above_sd2 = true;
            }
        }
        let fraction = above_sd1 as f64 / state.mean.len().max(1) as f64;
        tracing::trace!(iteration = state.iteration, fraction, above_sd2, "rilling stop check");
        fraction <= self.tol && !above_sd2
    }
}

/// Stop once the removed mean envelope is `threshold` dB below the candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyStop {
    pub threshold_db: f64,
}

impl StopCriterion for EnergyStop {
    fn should_stop(&self, state: &SiftIteration<'_>) -> bool {
        let removed = energy(state.mean);
        if removed == 0.0 {
            return true;
        }
        let ratio_db = 10.0 * (energy(state.previous) / removed).log10();
        tracing::trace!(iteration = state.iteration, ratio_db, "energy stop check");
        ratio_db > self.threshold_db
    }
}

/// Lock sifting to exactly `iterations` iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedStop {
    pub iterations: usize,
}

impl StopCriterion for FixedStop {
    fn should_stop(&self, state: &SiftIteration<'_>) -> bool {
        state.iteration >= self.iterations
    }

    fn is_fixed(&self) -> bool {
        true
    }
}

/// Built-in stopping policies selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopMethod {
    #[default]
    Sd,
    Rilling,
    Energy,
    Fixed,
}

//! Single-IMF extraction and the sift orchestrator.
//!
//! `get_next_imf` repeatedly removes the local mean envelope from a working
//! candidate until a [`StopCriterion`] accepts it. `sift` peels IMFs off the
//! residual until a terminal [`SiftState`] is reached and keeps the final
//! residual as the trend.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::envelope::{get_envelopes, EnvelopeFailure, EnvelopeOptions};
use crate::error::{Result, SiftError};
use crate::extrema::{has_sufficient_extrema, ExtremaOptions};
use crate::signal::ensure_samples;
use crate::stop::{
    EnergyStop, FixedStop, RillingStop, SdStop, SiftIteration, StopCriterion, StopMethod,
};

/// Options for the inner sift loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImfOptions {
    /// Fraction of the mean envelope removed per non-final iteration.
    pub env_step_size: f64,
    /// Iteration bound; also the lock count for `StopMethod::Fixed`.
    pub max_iters: usize,
    pub stop_method: StopMethod,
    pub sd_thresh: f64,
    /// `[sd1, sd2, tol]` for `StopMethod::Rilling`.
    pub rilling_thresh: [f64; 3],
    /// Decibels for `StopMethod::Energy`.
    pub energy_thresh: f64,
}

impl Default for ImfOptions {
    fn default() -> Self {
        Self {
            env_step_size: 1.0,
            max_iters: 1000,
            stop_method: StopMethod::Sd,
            sd_thresh: 0.1,
            rilling_thresh: [0.05, 0.5, 0.05],
            energy_thresh: 50.0,
        }
    }
}

impl ImfOptions {
    /// Build the stopping policy selected by `stop_method`.
    pub fn stop_criterion(&self) -> Box<dyn StopCriterion> {
        match self.stop_method {
            StopMethod::Sd => Box::new(SdStop {
                threshold: self.sd_thresh,
            }),
            StopMethod::Rilling => Box::new(RillingStop {
                sd1: self.rilling_thresh[0],
                sd2: self.rilling_thresh[1],
                tol: self.rilling_thresh[2],
            }),
            StopMethod::Energy => Box::new(EnergyStop {
                threshold_db: self.energy_thresh,
            }),
            StopMethod::Fixed => Box::new(FixedStop {
                iterations: self.max_iters,
            }),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.env_step_size > 0.0 && self.env_step_size <= 1.0) {
            return Err(SiftError::InvalidConfig(
                "env_step_size must be in (0, 1]".to_string(),
            ));
        }

        if self.max_iters == 0 {
            return Err(SiftError::InvalidConfig(
                "max_iters must be greater than zero".to_string(),
            ));
        }

        if !(self.sd_thresh > 0.0 && self.sd_thresh.is_finite()) {
            return Err(SiftError::InvalidConfig(
                "sd_thresh must be positive and finite".to_string(),
            ));
        }

        if !self.energy_thresh.is_finite() {
            return Err(SiftError::InvalidConfig(
                "energy_thresh must be finite".to_string(),
            ));
        }

        let [sd1, sd2, tol] = self.rilling_thresh;
        if !(sd1 > 0.0 && sd2 >= sd1 && (0.0..=1.0).contains(&tol)) {
            return Err(SiftError::InvalidConfig(
                "rilling_thresh must be [sd1, sd2, tol] with 0 < sd1 <= sd2 and 0 <= tol <= 1"
                    .to_string(),
            ));
        }

        Ok(())
    }
}

/// Options shared by every sift variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiftOptions {
    /// Maximum number of IMFs, unbounded when `None`.
    pub max_imfs: Option<usize>,
    /// Stop once `sum(|imf|) / sum(|x|)` falls below this.
    pub sift_thresh: f64,
    pub imf_opts: ImfOptions,
    pub envelope_opts: EnvelopeOptions,
    pub extrema_opts: ExtremaOptions,
}

impl Default for SiftOptions {
    fn default() -> Self {
        Self {
            max_imfs: None,
            sift_thresh: 1e-8,
            imf_opts: ImfOptions::default(),
            envelope_opts: EnvelopeOptions::default(),
            extrema_opts: ExtremaOptions::default(),
        }
    }
}

impl SiftOptions {
    pub fn validate(&self) -> Result<()> {
        if !(self.sift_thresh >= 0.0 && self.sift_thresh.is_finite()) {
            return Err(SiftError::InvalidConfig(
                "sift_thresh must be non-negative and finite".to_string(),
            ));
        }

        if self.extrema_opts.pad_width == 0 {
            return Err(SiftError::InvalidConfig(
                "extrema_opts/pad_width must be greater than zero".to_string(),
            ));
        }

        if self.extrema_opts.mag_pad_opts.stat_length == 0 {
            return Err(SiftError::InvalidConfig(
                "extrema_opts/mag_pad_opts/stat_length must be greater than zero".to_string(),
            ));
        }

        self.imf_opts.validate()
    }
}

/// Outcome of one single-IMF extraction.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Extracted(Vec<f64>),
    /// The working candidate ran out of extrema.
    StopInsufficientExtrema,
    /// An envelope could not be interpolated.
    StopInterpolationFailure,
}

impl Extraction {
    pub fn imf(&self) -> Option<&[f64]> {
        match self {
            Extraction::Extracted(imf) => Some(imf),
            _ => None,
        }
    }

    pub fn into_imf(self) -> Option<Vec<f64>> {
        match self {
            Extraction::Extracted(imf) => Some(imf),
            _ => None,
        }
    }

    /// Whether sifting may continue on the residual.
    pub fn should_continue(&self) -> bool {
        matches!(self, Extraction::Extracted(_))
    }
}

/// Extract the next IMF of `x` with the stopping policy from `imf_opts`.
pub fn get_next_imf(
    x: &[f64],
    imf_opts: &ImfOptions,
    envelope_opts: &EnvelopeOptions,
    extrema_opts: &ExtremaOptions,
) -> Result<Extraction> {
    ensure_samples(x)?;
    imf_opts.validate()?;
    let criterion = imf_opts.stop_criterion();
    get_next_imf_with(x, criterion.as_ref(), imf_opts, envelope_opts, extrema_opts)
}

/// Extract the next IMF of `x` with a caller-supplied stopping policy.
///
/// `imf_opts.stop_method` and its thresholds are ignored; `env_step_size`
/// and `max_iters` still apply.
pub fn get_next_imf_with(
    x: &[f64],
    criterion: &dyn StopCriterion,
    imf_opts: &ImfOptions,
    envelope_opts: &EnvelopeOptions,
    extrema_opts: &ExtremaOptions,
) -> Result<Extraction> {
    ensure_samples(x)?;

    let mut proto = x.to_vec();
    let mut iteration = 0usize;
    loop {
        iteration += 1;

        let envelope = match get_envelopes(&proto, envelope_opts, extrema_opts) {
            Ok(envelope) => envelope,
            Err(EnvelopeFailure::InsufficientExtrema) => {
                tracing::debug!(iteration, "finishing sift: candidate has too few extrema");
                return Ok(Extraction::StopInsufficientExtrema);
            }
            Err(EnvelopeFailure::Interpolation(err)) => {
                tracing::debug!(iteration, %err, "finishing sift: envelope interpolation failed");
                return Ok(Extraction::StopInterpolationFailure);
            }
        };

        let mean = envelope.mean();
        let candidate: Vec<f64> = proto.iter().zip(mean.iter()).map(|(p, m)| p - m).collect();

        let state = SiftIteration {
            iteration,
            previous: &proto,
            candidate: &candidate,
            upper: &envelope.upper,
            lower: &envelope.lower,
            mean: &mean,
        };
        if criterion.should_stop(&state) {
            tracing::trace!(iteration, "imf accepted");
            return Ok(Extraction::Extracted(candidate));
        }

        if iteration >= imf_opts.max_iters {
            if !criterion.is_fixed() {
                tracing::warn!(
                    iterations = iteration,
                    "sift did not converge, accepting candidate at the iteration bound"
                );
            }
            return Ok(Extraction::Extracted(candidate));
        }
        if iteration == 3 * imf_opts.max_iters / 4 {
            tracing::debug!(iterations = iteration, "sift is taking a long time to converge");
        }

        for (p, m) in proto.iter_mut().zip(mean.iter()) {
            *p -= imf_opts.env_step_size * m;
        }
    }
}

/// Terminal and running states of the sift orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiftState {
    Sifting,
    MaxImfs,
    /// The last IMF carried (almost) nothing.
    ResidualSmooth,
    InsufficientExtrema,
    InterpolationFailure,
}

/// Extracted IMFs plus the residual trend.
#[derive(Debug, Clone, PartialEq)]
pub struct ImfStack {
    imfs: Vec<Vec<f64>>,
    residual: Vec<f64>,
    state: SiftState,
}

impl ImfStack {
    /// Assemble a stack whose trend is `x` minus the sum of `imfs`.
    pub(crate) fn complete(x: &[f64], imfs: Vec<Vec<f64>>, state: SiftState) -> Self {
        let mut residual = x.to_vec();
        for imf in &imfs {
            for (r, v) in residual.iter_mut().zip(imf.iter()) {
                *r -= v;
            }
        }
        Self {
            imfs,
            residual,
            state,
        }
    }

    pub fn imfs(&self) -> &[Vec<f64>] {
        &self.imfs
    }

    pub fn residual(&self) -> &[f64] {
        &self.residual
    }

    /// Why sifting stopped.
    pub fn state(&self) -> SiftState {
        self.state
    }

    pub fn n_imfs(&self) -> usize {
        self.imfs.len()
    }

    /// Number of components including the trend.
    pub fn len(&self) -> usize {
        self.imfs.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn n_samples(&self) -> usize {
        self.residual.len()
    }

    /// IMFs followed by the trend.
    pub fn components(&self) -> impl Iterator<Item = &[f64]> + '_ {
        self.imfs
            .iter()
            .map(Vec::as_slice)
            .chain(std::iter::once(self.residual.as_slice()))
    }

    /// Component `index`, with the trend at `self.len() - 1`.
    pub fn component(&self, index: usize) -> Option<&[f64]> {
        if index < self.imfs.len() {
            Some(&self.imfs[index])
        } else if index == self.imfs.len() {
            Some(&self.residual)
        } else {
            None
        }
    }

    /// Sum of every component.
    pub fn reconstruct(&self) -> Vec<f64> {
        let mut out = self.residual.clone();
        for imf in &self.imfs {
            for (o, v) in out.iter_mut().zip(imf.iter()) {
                *o += v;
            }
        }
        out
    }

    /// Samples by components, trend in the last column.
    pub fn to_array(&self) -> Array2<f64> {
        let rows = self.n_samples();
        let cols = self.len();
        Array2::from_shape_fn((rows, cols), |(i, j)| match self.component(j) {
            Some(c) => c[i],
            None => 0.0,
        })
    }

    pub fn into_components(self) -> Vec<Vec<f64>> {
        let mut out = self.imfs;
        out.push(self.residual);
        out
    }
}

/// Shared orchestration loop. `extract` is called with the layer index and
/// the current residual.
///
/// Sifting ends as smooth once an IMF's total absolute content drops below
/// `sift_thresh` times that of `x`.
pub(crate) fn sift_layers<F>(
    x: &[f64],
    max_imfs: Option<usize>,
    sift_thresh: f64,
    mut extract: F,
) -> Result<ImfStack>
where
    F: FnMut(usize, &[f64]) -> Result<Extraction>,
{
    let mut imfs: Vec<Vec<f64>> = Vec::new();
    let mut residual = x.to_vec();
    let reference: f64 = x.iter().map(|v| v.abs()).sum();

    let state = loop {
        if max_imfs.is_some_and(|limit| imfs.len() >= limit) {
            break SiftState::MaxImfs;
        }
        if !has_sufficient_extrema(&residual) {
            break SiftState::InsufficientExtrema;
        }

        match extract(imfs.len(), &residual)? {
            Extraction::Extracted(imf) => {
                for (r, v) in residual.iter_mut().zip(imf.iter()) {
                    *r -= v;
                }
                let content: f64 = imf.iter().map(|v| v.abs()).sum();
                imfs.push(imf);
                tracing::debug!(layer = imfs.len(), content, "extracted imf");
                if content < sift_thresh * reference {
                    break SiftState::ResidualSmooth;
                }
            }
            Extraction::StopInsufficientExtrema => break SiftState::InsufficientExtrema,
            Extraction::StopInterpolationFailure => break SiftState::InterpolationFailure,
        }
    };

    tracing::debug!(n_imfs = imfs.len(), ?state, "sift finished");
    Ok(ImfStack::complete(x, imfs, state))
}

/// Decompose `x` into IMFs and a trend.
pub fn sift(x: &[f64], opts: &SiftOptions) -> Result<ImfStack> {
    ensure_samples(x)?;
    opts.validate()?;
    let criterion = opts.imf_opts.stop_criterion();
    sift_layers(x, opts.max_imfs, opts.sift_thresh, |_, residual| {
        get_next_imf_with(
            residual,
            criterion.as_ref(),
            &opts.imf_opts,
            &opts.envelope_opts,
            &opts.extrema_opts,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    fn two_tone(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let t = i as f64 / n as f64;
                (2.0 * PI * 3.0 * t).sin() + 0.5 * (2.0 * PI * 30.0 * t).sin()
            })
            .collect()
    }

    #[test]
    fn test_sift_reconstructs_signal() {
        let x: Vec<f64> = (0..400).map(|i| (i as f64 * 0.1).sin() + 0.3 + 0.002 * i as f64).collect();
        let stack = sift(&x, &SiftOptions::default()).unwrap();
        for (r, v) in stack.reconstruct().iter().zip(x.iter()) {
            assert_abs_diff_eq!(*r, *v, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_sift_separates_two_tones() {
        let x = two_tone(1024);
        let stack = sift(&x, &SiftOptions::default()).unwrap();
        assert!(stack.n_imfs() >= 2, "n_imfs={}", stack.n_imfs());
        assert_ne!(stack.state(), SiftState::Sifting);
    }

    #[test]
    fn test_max_imfs_is_respected() {
        let x = two_tone(512);
        let opts = SiftOptions {
            max_imfs: Some(1),
            ..SiftOptions::default()
        };
        let stack = sift(&x, &opts).unwrap();
        assert_eq!(stack.n_imfs(), 1);
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.state(), SiftState::MaxImfs);
    }

    #[test]
    fn test_monotonic_input_is_all_trend() {
        let x: Vec<f64> = (0..64).map(|i| i as f64).collect();
        let stack = sift(&x, &SiftOptions::default()).unwrap();
        assert_eq!(stack.n_imfs(), 0);
        assert_eq!(stack.residual(), x.as_slice());
        assert_eq!(stack.state(), SiftState::InsufficientExtrema);
    }

    #[test]
    fn test_get_next_imf_stops_on_monotonic_input() {
        let x: Vec<f64> = (0..64).map(|i| (i as f64).sqrt()).collect();
        let out = get_next_imf(
            &x,
            &ImfOptions::default(),
            &EnvelopeOptions::default(),
            &ExtremaOptions::default(),
        )
        .unwrap();
        assert_eq!(out, Extraction::StopInsufficientExtrema);
        assert!(!out.should_continue());
    }

    #[test]
    fn test_fixed_stop_runs_requested_iterations() {
        struct Counting(std::sync::atomic::AtomicUsize);
        impl StopCriterion for Counting {
            fn should_stop(&self, state: &SiftIteration<'_>) -> bool {
                self.0.store(state.iteration, std::sync::atomic::Ordering::SeqCst);
                false
            }
        }

        let x = two_tone(256);
        let counting = Counting(std::sync::atomic::AtomicUsize::new(0));
        let opts = ImfOptions {
            max_iters: 7,
            ..ImfOptions::default()
        };
        let out = get_next_imf_with(
            &x,
            &counting,
            &opts,
            &EnvelopeOptions::default(),
            &ExtremaOptions::default(),
        )
        .unwrap();
        assert!(out.should_continue());
        assert_eq!(counting.0.load(std::sync::atomic::Ordering::SeqCst), 7);
    }

    #[test]
    fn test_to_array_layout() {
        let x = two_tone(128);
        let stack = sift(&x, &SiftOptions::default()).unwrap();
        let arr = stack.to_array();
        assert_eq!(arr.shape(), &[128, stack.len()]);
        let last = stack.len() - 1;
        assert_eq!(arr[[5, last]], stack.residual()[5]);
    }

    #[test]
    fn test_validate_rejects_bad_step() {
        let mut opts = SiftOptions::default();
        assert!(opts.validate().is_ok());
        opts.imf_opts.env_step_size = 0.0;
        assert!(matches!(opts.validate(), Err(SiftError::InvalidConfig(_))));
    }

    #[test]
    fn test_empty_input_is_rejected() {
        assert!(sift(&[], &SiftOptions::default()).is_err());
    }
}

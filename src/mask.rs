//! Masked sifting.
//!
//! A sinusoidal mask added before extraction pulls the sift towards a chosen
//! frequency band and suppresses mode mixing between close components. The
//! mask is removed again after extraction, and running the extraction over
//! several equally spaced mask phases cancels what is left of it.

use std::f64::consts::PI;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::envelope::EnvelopeOptions;
use crate::ensemble::thread_pool;
use crate::error::{Result, SiftError};
use crate::extrema::{count_zero_crossings, ExtremaOptions};
use crate::signal::{ensure_samples, std_dev};
use crate::sift::{
    get_next_imf_with, sift_layers, Extraction, ImfOptions, ImfStack, SiftOptions, SiftState,
};
use crate::stop::StopCriterion;

/// Heuristics for picking the first mask frequency from the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FreqHeuristic {
    /// Frequency of the first ordinary IMF estimated from its zero crossings.
    #[serde(rename = "zc")]
    ZeroCrossing,
}

/// Mask frequency schedule, in cycles per sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MaskFreqs {
    /// First frequency from a heuristic, divided by `mask_step_factor` per layer.
    Heuristic(FreqHeuristic),
    /// First frequency given, divided by `mask_step_factor` per layer.
    Single(f64),
    /// One frequency per layer; its length caps the number of IMFs.
    Explicit(Vec<f64>),
}

impl Default for MaskFreqs {
    fn default() -> Self {
        MaskFreqs::Heuristic(FreqHeuristic::ZeroCrossing)
    }
}

/// How `mask_amp` is turned into an absolute mask amplitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskAmpMode {
    /// Relative to the standard deviation of the residual being masked.
    #[default]
    RatioImf,
    /// Relative to the standard deviation of the input signal.
    RatioSig,
    Abs,
}

/// Options for [`get_next_imf_mask`].
#[derive(Debug, Clone, PartialEq)]
pub struct MaskImfOptions {
    /// Number of equally spaced mask phases to average over.
    pub nphases: usize,
    pub imf_opts: ImfOptions,
    pub envelope_opts: EnvelopeOptions,
    pub extrema_opts: ExtremaOptions,
}

impl Default for MaskImfOptions {
    fn default() -> Self {
        Self {
            nphases: 4,
            imf_opts: ImfOptions::default(),
            envelope_opts: EnvelopeOptions::default(),
            extrema_opts: ExtremaOptions::default(),
        }
    }
}

/// Options for [`mask_sift`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskSiftOptions {
    #[serde(flatten)]
    pub sift: SiftOptions,
    pub mask_amp: f64,
    pub mask_amp_mode: MaskAmpMode,
    pub mask_freqs: MaskFreqs,
    pub mask_step_factor: f64,
    pub nphases: usize,
    pub nprocesses: usize,
}

impl Default for MaskSiftOptions {
    fn default() -> Self {
        Self {
            sift: SiftOptions {
                max_imfs: Some(9),
                ..SiftOptions::default()
            },
            mask_amp: 1.0,
            mask_amp_mode: MaskAmpMode::RatioImf,
            mask_freqs: MaskFreqs::default(),
            mask_step_factor: 2.0,
            nphases: 4,
            nprocesses: 1,
        }
    }
}

impl MaskSiftOptions {
    pub fn validate(&self) -> Result<()> {
        self.sift.validate()?;

        if !(self.mask_amp >= 0.0 && self.mask_amp.is_finite()) {
            return Err(SiftError::InvalidConfig(
                "mask_amp must be non-negative and finite".to_string(),
            ));
        }

        if !(self.mask_step_factor > 0.0 && self.mask_step_factor.is_finite()) {
            return Err(SiftError::InvalidConfig(
                "mask_step_factor must be positive and finite".to_string(),
            ));
        }

        if self.nphases == 0 {
            return Err(SiftError::InvalidConfig(
                "nphases must be greater than zero".to_string(),
            ));
        }

        let freqs_ok = match &self.mask_freqs {
            MaskFreqs::Heuristic(_) => true,
            MaskFreqs::Single(freq) => freq.is_finite() && *freq > 0.0,
            MaskFreqs::Explicit(freqs) => {
                !freqs.is_empty() && freqs.iter().all(|f| f.is_finite() && *f > 0.0)
            }
        };
        if !freqs_ok {
            return Err(SiftError::InvalidConfig(
                "mask_freqs must be \"zc\", a positive frequency or a non-empty list of them"
                    .to_string(),
            ));
        }

        Ok(())
    }

    fn imf_options(&self) -> MaskImfOptions {
        MaskImfOptions {
            nphases: self.nphases,
            imf_opts: self.sift.imf_opts.clone(),
            envelope_opts: self.sift.envelope_opts.clone(),
            extrema_opts: self.sift.extrema_opts.clone(),
        }
    }
}

/// Mask sift result with the mask frequency used for each IMF.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskSiftOutput {
    pub imfs: ImfStack,
    pub mask_freqs: Vec<f64>,
}

fn mask_signal(len: usize, freq: f64, amp: f64, phase: f64) -> Vec<f64> {
    let omega = 2.0 * PI * freq;
    (0..len)
        .map(|i| amp * (omega * i as f64 + phase).cos())
        .collect()
}

fn masked_extraction(
    x: &[f64],
    mask_freq: f64,
    mask_amp: f64,
    opts: &MaskImfOptions,
    criterion: &dyn StopCriterion,
) -> Result<Extraction> {
    if opts.nphases == 0 {
        return Err(SiftError::InvalidConfig(
            "nphases must be greater than zero".to_string(),
        ));
    }

    let outcomes = (0..opts.nphases)
        .into_par_iter()
        .map(|k| {
            let phase = 2.0 * PI * k as f64 / opts.nphases as f64;
            let mask = mask_signal(x.len(), mask_freq, mask_amp, phase);
            let masked: Vec<f64> = x.iter().zip(mask.iter()).map(|(v, m)| v + m).collect();
            let outcome = get_next_imf_with(
                &masked,
                criterion,
                &opts.imf_opts,
                &opts.envelope_opts,
                &opts.extrema_opts,
            )?;
            Ok(match outcome {
                Extraction::Extracted(imf) => Extraction::Extracted(
                    imf.iter().zip(mask.iter()).map(|(v, m)| v - m).collect(),
                ),
                stop => stop,
            })
        })
        .collect::<Result<Vec<Extraction>>>()?;

    let mut sum = vec![0.0; x.len()];
    let mut extracted = 0usize;
    let mut last_stop = Extraction::StopInsufficientExtrema;
    for outcome in outcomes {
        match outcome {
            Extraction::Extracted(imf) => {
                for (s, v) in sum.iter_mut().zip(imf.iter()) {
                    *s += v;
                }
                extracted += 1;
            }
            stop => last_stop = stop,
        }
    }

    if extracted == 0 {
        return Ok(last_stop);
    }
    if extracted < opts.nphases {
        tracing::debug!(extracted, nphases = opts.nphases, "some mask phases stopped early");
    }
    let scale = 1.0 / extracted as f64;
    Ok(Extraction::Extracted(sum.into_iter().map(|v| v * scale).collect()))
}

/// Extract one IMF of `x` with a sinusoidal mask of `mask_freq` cycles per
/// sample and absolute amplitude `mask_amp`.
pub fn get_next_imf_mask(
    x: &[f64],
    mask_freq: f64,
    mask_amp: f64,
    opts: &MaskImfOptions,
) -> Result<Extraction> {
    ensure_samples(x)?;
    opts.imf_opts.validate()?;
    let criterion = opts.imf_opts.stop_criterion();
    masked_extraction(x, mask_freq, mask_amp, opts, criterion.as_ref())
}

/// Zero-crossing frequency estimate in cycles per sample.
pub fn zero_crossing_frequency(x: &[f64]) -> f64 {
    if x.is_empty() {
        return 0.0;
    }
    count_zero_crossings(x) as f64 / (2.0 * x.len() as f64)
}

/// Sift with a sinusoidal mask added before every extraction.
pub fn mask_sift(x: &[f64], opts: &MaskSiftOptions) -> Result<MaskSiftOutput> {
    ensure_samples(x)?;
    opts.validate()?;

    let pool = thread_pool(opts.nprocesses)?;
    pool.install(|| mask_sift_inner(x, opts))
}

fn mask_sift_inner(x: &[f64], opts: &MaskSiftOptions) -> Result<MaskSiftOutput> {
    let criterion = opts.sift.imf_opts.stop_criterion();
    let imf_opts = opts.imf_options();

    let first_freq = match &opts.mask_freqs {
        MaskFreqs::Heuristic(FreqHeuristic::ZeroCrossing) => {
            let first = get_next_imf_with(
                x,
                criterion.as_ref(),
                &opts.sift.imf_opts,
                &opts.sift.envelope_opts,
                &opts.sift.extrema_opts,
            )?;
            match first {
                Extraction::Extracted(imf) => zero_crossing_frequency(&imf),
                Extraction::StopInsufficientExtrema => {
                    return Ok(trend_only(x, SiftState::InsufficientExtrema));
                }
                Extraction::StopInterpolationFailure => {
                    return Ok(trend_only(x, SiftState::InterpolationFailure));
                }
            }
        }
        MaskFreqs::Single(freq) => *freq,
        MaskFreqs::Explicit(freqs) => freqs.first().copied().unwrap_or_default(),
    };
    tracing::debug!(first_freq, "mask sift starting");

    let max_imfs = match &opts.mask_freqs {
        MaskFreqs::Explicit(freqs) => {
            Some(opts.sift.max_imfs.map_or(freqs.len(), |m| m.min(freqs.len())))
        }
        _ => opts.sift.max_imfs,
    };

    let signal_std = std_dev(x);
    let mut used = Vec::new();
    let imfs = sift_layers(x, max_imfs, opts.sift.sift_thresh, |layer, residual| {
        let freq = match &opts.mask_freqs {
            MaskFreqs::Explicit(freqs) => freqs[layer],
            _ => first_freq / opts.mask_step_factor.powi(layer as i32),
        };
        let amp = match opts.mask_amp_mode {
            MaskAmpMode::RatioImf => opts.mask_amp * std_dev(residual),
            MaskAmpMode::RatioSig => opts.mask_amp * signal_std,
            MaskAmpMode::Abs => opts.mask_amp,
        };
        tracing::debug!(layer, freq, amp, "masked extraction");
        used.push(freq);
        masked_extraction(residual, freq, amp, &imf_opts, criterion.as_ref())
    })?;

    used.truncate(imfs.n_imfs());
    Ok(MaskSiftOutput {
        imfs,
        mask_freqs: used,
    })
}

fn trend_only(x: &[f64], state: SiftState) -> MaskSiftOutput {
    MaskSiftOutput {
        imfs: ImfStack::complete(x, Vec::new(), state),
        mask_freqs: Vec::new(),
    }
}

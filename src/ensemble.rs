//! Noise-assisted sifting.
//!
//! Every realisation draws its noise from its own `ChaCha8Rng` stream of one
//! shared seed, so a run is reproducible for a given `noise_seed` whatever
//! the number of worker threads.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SiftError};
use crate::signal::{ensure_samples, std_dev};
use crate::sift::{get_next_imf_with, sift, sift_layers, Extraction, ImfStack, SiftOptions, SiftState};

/// How each noise realisation is applied to the signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseMode {
    /// Sift `x + n`.
    #[default]
    Single,
    /// Sift both `x + n` and `x - n` and average the pair.
    Flip,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleOptions {
    #[serde(flatten)]
    pub sift: SiftOptions,
    pub nensembles: usize,
    /// Noise standard deviation relative to the signal's.
    pub ensemble_noise: f64,
    pub noise_mode: NoiseMode,
    /// Seed for the noise streams, drawn at random when `None`.
    pub noise_seed: Option<u64>,
    /// Worker threads; `0` lets rayon pick.
    pub nprocesses: usize,
}

impl Default for EnsembleOptions {
    fn default() -> Self {
        Self {
            sift: SiftOptions::default(),
            nensembles: 4,
            ensemble_noise: 0.2,
            noise_mode: NoiseMode::Single,
            noise_seed: None,
            nprocesses: 1,
        }
    }
}

impl EnsembleOptions {
    pub fn validate(&self) -> Result<()> {
        self.sift.validate()?;
        validate_noise(self.nensembles, self.ensemble_noise)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompleteEnsembleOptions {
    #[serde(flatten)]
    pub sift: SiftOptions,
    pub nensembles: usize,
    pub ensemble_noise: f64,
    pub noise_seed: Option<u64>,
    pub nprocesses: usize,
}

impl Default for CompleteEnsembleOptions {
    fn default() -> Self {
        Self {
            sift: SiftOptions::default(),
            nensembles: 4,
            ensemble_noise: 0.2,
            noise_seed: None,
            nprocesses: 1,
        }
    }
}

impl CompleteEnsembleOptions {
    pub fn validate(&self) -> Result<()> {
        self.sift.validate()?;
        validate_noise(self.nensembles, self.ensemble_noise)
    }
}

fn validate_noise(nensembles: usize, ensemble_noise: f64) -> Result<()> {
    if nensembles == 0 {
        return Err(SiftError::InvalidConfig(
            "nensembles must be greater than zero".to_string(),
        ));
    }

    if !(ensemble_noise >= 0.0 && ensemble_noise.is_finite()) {
        return Err(SiftError::InvalidConfig(
            "ensemble_noise must be non-negative and finite".to_string(),
        ));
    }

    Ok(())
}

/// Complete ensemble result.
#[derive(Debug, Clone, PartialEq)]
pub struct CompleteEnsembleOutput {
    pub imfs: ImfStack,
    /// What is left of each noise realisation after the last stage.
    pub noise: Vec<Vec<f64>>,
    /// Mean standard deviation of the noise added at each stage, one per IMF.
    pub noise_std: Vec<f64>,
}

pub(crate) fn thread_pool(nprocesses: usize) -> Result<rayon::ThreadPool> {
    Ok(rayon::ThreadPoolBuilder::new()
        .num_threads(nprocesses)
        .build()?)
}

fn resolve_seed(seed: Option<u64>) -> u64 {
    match seed {
        Some(seed) => seed,
        None => {
            let seed = rand::random::<u64>();
            tracing::debug!(seed, "drew random noise seed");
            seed
        }
    }
}

/// Gaussian noise for realisation `index`.
fn noise_realisation(seed: u64, index: usize, len: usize, std: f64) -> Result<Vec<f64>> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(index as u64);
    let normal = Normal::new(0.0, std)?;
    Ok((0..len).map(|_| normal.sample(&mut rng)).collect())
}

fn add_scaled(x: &[f64], noise: &[f64], sign: f64) -> Vec<f64> {
    x.iter().zip(noise.iter()).map(|(v, n)| v + sign * n).collect()
}

/// Ensemble sift: average the IMFs of many noisy copies of `x`.
///
/// IMFs are matched by index; a realisation that produced fewer IMFs
/// contributes zeros to the deeper ones. The trend is whatever the averaged
/// IMFs leave of `x`.
pub fn ensemble_sift(x: &[f64], opts: &EnsembleOptions) -> Result<ImfStack> {
    ensure_samples(x)?;
    opts.validate()?;

    let seed = resolve_seed(opts.noise_seed);
    let noise_std = opts.ensemble_noise * std_dev(x);
    tracing::debug!(
        nensembles = opts.nensembles,
        noise_std,
        mode = ?opts.noise_mode,
        "starting ensemble sift"
    );

    let pool = thread_pool(opts.nprocesses)?;
    let realisations = pool.install(|| {
        (0..opts.nensembles)
            .into_par_iter()
            .map(|index| {
                let noise = noise_realisation(seed, index, x.len(), noise_std)?;
                let mut stacks = vec![sift(&add_scaled(x, &noise, 1.0), &opts.sift)?];
                if opts.noise_mode == NoiseMode::Flip {
                    stacks.push(sift(&add_scaled(x, &noise, -1.0), &opts.sift)?);
                }
                Ok(stacks)
            })
            .collect::<Result<Vec<Vec<ImfStack>>>>()
    })?;

    let stacks: Vec<ImfStack> = realisations.into_iter().flatten().collect();
    let depth = stacks.iter().map(ImfStack::n_imfs).max().unwrap_or(0);
    let scale = 1.0 / stacks.len() as f64;

    let mut imfs = vec![vec![0.0; x.len()]; depth];
    for stack in &stacks {
        for (avg, imf) in imfs.iter_mut().zip(stack.imfs()) {
            for (a, v) in avg.iter_mut().zip(imf.iter()) {
                *a += scale * v;
            }
        }
    }

    let state = stacks
        .iter()
        .find(|stack| stack.n_imfs() == depth)
        .map_or(SiftState::InsufficientExtrema, ImfStack::state);
    tracing::debug!(n_imfs = depth, ?state, "ensemble sift finished");
    Ok(ImfStack::complete(x, imfs, state))
}

/// Complete ensemble sift.
///
/// Each stage averages the first IMF of `residual + noise_i` over every
/// realisation, then advances every noise realisation by removing its own
/// first IMF. The noise therefore tracks the scale of the mode being
/// extracted at each stage.
pub fn complete_ensemble_sift(
    x: &[f64],
    opts: &CompleteEnsembleOptions,
) -> Result<CompleteEnsembleOutput> {
    ensure_samples(x)?;
    opts.validate()?;

    let seed = resolve_seed(opts.noise_seed);
    let initial_std = opts.ensemble_noise * std_dev(x);
    tracing::debug!(
        nensembles = opts.nensembles,
        noise_std = initial_std,
        "starting complete ensemble sift"
    );

    let pool = thread_pool(opts.nprocesses)?;
    pool.install(|| {
        let mut noise = (0..opts.nensembles)
            .into_par_iter()
            .map(|index| noise_realisation(seed, index, x.len(), initial_std))
            .collect::<Result<Vec<Vec<f64>>>>()?;

        let criterion = opts.sift.imf_opts.stop_criterion();
        let extract = |signal: &[f64]| {
            get_next_imf_with(
                signal,
                criterion.as_ref(),
                &opts.sift.imf_opts,
                &opts.sift.envelope_opts,
                &opts.sift.extrema_opts,
            )
        };

        let mut noise_std = Vec::new();
        let imfs = sift_layers(x, opts.sift.max_imfs, opts.sift.sift_thresh, |layer, residual| {
            let stage_std =
                noise.iter().map(|n| std_dev(n)).sum::<f64>() / noise.len() as f64;
            noise_std.push(stage_std);

            let outcomes = noise
                .par_iter()
                .map(|n| {
                    let mode = extract(&add_scaled(residual, n, 1.0))?;
                    let advanced = match extract(n)? {
                        Extraction::Extracted(own) => Some(add_scaled(n, &own, -1.0)),
                        _ => None,
                    };
                    Ok((mode, advanced))
                })
                .collect::<Result<Vec<(Extraction, Option<Vec<f64>>)>>>()?;

            let mut sum = vec![0.0; residual.len()];
            let mut extracted = 0usize;
            let mut last_stop = Extraction::StopInsufficientExtrema;
            for ((mode, advanced), n) in outcomes.into_iter().zip(noise.iter_mut()) {
                match mode {
                    Extraction::Extracted(imf) => {
                        for (s, v) in sum.iter_mut().zip(imf.iter()) {
                            *s += v;
                        }
                        extracted += 1;
                    }
                    stop => last_stop = stop,
                }
                if let Some(advanced) = advanced {
                    *n = advanced;
                }
            }

            tracing::debug!(layer, extracted, stage_std, "complete ensemble stage");
            if extracted == 0 {
                return Ok(last_stop);
            }
            let scale = 1.0 / extracted as f64;
            Ok(Extraction::Extracted(
                sum.into_iter().map(|v| v * scale).collect(),
            ))
        })?;

        noise_std.truncate(imfs.n_imfs());
        Ok(CompleteEnsembleOutput {
            imfs,
            noise,
            noise_std,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    fn chirpy(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let t = i as f64 / n as f64;
                (2.0 * PI * 4.0 * t).sin() + 0.4 * (2.0 * PI * 37.0 * t + 0.3).sin() + 0.5 * t
            })
            .collect()
    }

    #[test]
    fn noise_streams_are_independent_and_repeatable() {
        let a = noise_realisation(7, 0, 64, 1.0).unwrap();
        let b = noise_realisation(7, 1, 64, 1.0).unwrap();
        let again = noise_realisation(7, 0, 64, 1.0).unwrap();
        assert_ne!(a, b);
        assert_eq!(a, again);
    }

    #[test]
    fn zero_realisations_are_rejected() {
        let opts = EnsembleOptions {
            nensembles: 0,
            ..EnsembleOptions::default()
        };
        assert!(matches!(
            ensemble_sift(&chirpy(128), &opts),
            Err(SiftError::InvalidConfig(_))
        ));
    }

    #[test]
    fn ensemble_is_complete_and_thread_count_independent() {
        let x = chirpy(512);
        let serial = EnsembleOptions {
            noise_seed: Some(42),
            nprocesses: 1,
            ..EnsembleOptions::default()
        };
        let parallel = EnsembleOptions {
            nprocesses: 3,
            ..serial.clone()
        };
        let a = ensemble_sift(&x, &serial).unwrap();
        let b = ensemble_sift(&x, &parallel).unwrap();
        assert_eq!(a, b);
        for (r, v) in a.reconstruct().iter().zip(x.iter()) {
            assert_abs_diff_eq!(*r, *v, epsilon = 1e-9);
        }
    }

    #[test]
    fn flipped_noise_cancels_with_zero_noise_level() {
        let x = chirpy(256);
        let opts = EnsembleOptions {
            ensemble_noise: 0.0,
            noise_mode: NoiseMode::Flip,
            noise_seed: Some(1),
            ..EnsembleOptions::default()
        };
        let ensemble = ensemble_sift(&x, &opts).unwrap();
        let plain = sift(&x, &SiftOptions::default()).unwrap();
        assert_eq!(ensemble.n_imfs(), plain.n_imfs());
        for (e, p) in ensemble.imfs().iter().zip(plain.imfs()) {
            assert_abs_diff_eq!(e.as_slice(), p.as_slice(), epsilon = 1e-9);
        }
    }

    #[test]
    fn complete_ensemble_reports_noise_per_mode() {
        let x = chirpy(400);
        let opts = CompleteEnsembleOptions {
            noise_seed: Some(3),
            sift: SiftOptions {
                max_imfs: Some(3),
                ..SiftOptions::default()
            },
            ..CompleteEnsembleOptions::default()
        };
        let out = complete_ensemble_sift(&x, &opts).unwrap();
        assert!(out.imfs.n_imfs() <= 3);
        assert_eq!(out.noise_std.len(), out.imfs.n_imfs());
        assert_eq!(out.noise.len(), 4);
        for (r, v) in out.imfs.reconstruct().iter().zip(x.iter()) {
            assert_abs_diff_eq!(*r, *v, epsilon = 1e-9);
        }
    }

    #[test]
    fn complete_ensemble_keeps_modes_at_tiny_scale() {
        let x = chirpy(400);
        let tiny: Vec<f64> = x.iter().map(|v| v * 1e-12).collect();
        let opts = CompleteEnsembleOptions {
            noise_seed: Some(5),
            ..CompleteEnsembleOptions::default()
        };
        let a = complete_ensemble_sift(&x, &opts).unwrap();
        let b = complete_ensemble_sift(&tiny, &opts).unwrap();
        assert_eq!(a.imfs.n_imfs(), b.imfs.n_imfs());
        assert_eq!(a.imfs.state(), b.imfs.state());
    }
}

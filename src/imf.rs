//! IMF validity check.
//!
//! An intrinsic mode function has (a) as many zero crossings as extrema, give
//! or take one, and (b) a local envelope mean that is close to zero
//! everywhere. Both checks are relative, so they do not depend on amplitude.

use serde::{Deserialize, Serialize};

use crate::envelope::{get_envelopes, EnvelopeOptions};
use crate::extrema::{count_extrema, count_zero_crossings, ExtremaOptions, MIN_EXTREMA};
use crate::sift::ImfStack;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsImfOptions {
    /// Largest accepted `sum(|envelope mean|) / sum(|candidate|)`.
    pub avg_tol: f64,
    pub envelope_opts: EnvelopeOptions,
    pub extrema_opts: ExtremaOptions,
}

impl Default for IsImfOptions {
    fn default() -> Self {
        Self {
            avg_tol: 5e-2,
            envelope_opts: EnvelopeOptions::default(),
            extrema_opts: ExtremaOptions::default(),
        }
    }
}

/// The two IMF criteria for one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImfCriteria {
    pub balanced_oscillation: bool,
    pub zero_local_mean: bool,
}

impl ImfCriteria {
    pub fn all(&self) -> bool {
        self.balanced_oscillation && self.zero_local_mean
    }

    pub fn none(&self) -> bool {
        !self.balanced_oscillation && !self.zero_local_mean
    }
}

/// Evaluate both IMF criteria on one candidate.
///
/// A candidate without enough maxima and minima to build envelopes does not
/// oscillate and fails both criteria.
pub fn is_imf(candidate: &[f64], opts: &IsImfOptions) -> ImfCriteria {
    let (maxima, minima) = count_extrema(candidate);
    let oscillates = maxima >= MIN_EXTREMA && minima >= MIN_EXTREMA;

    let zero_crossings = count_zero_crossings(candidate);
    let balanced_oscillation = oscillates && (maxima + minima).abs_diff(zero_crossings) <= 1;

    let zero_local_mean = oscillates
        && match get_envelopes(candidate, &opts.envelope_opts, &opts.extrema_opts) {
            Ok(envelope) => {
                let mean_sum: f64 = envelope.mean().iter().map(|v| v.abs()).sum();
                let imf_sum: f64 = candidate.iter().map(|v| v.abs()).sum();
                imf_sum > 0.0 && mean_sum / imf_sum < opts.avg_tol
            }
            Err(_) => false,
        };

    ImfCriteria {
        balanced_oscillation,
        zero_local_mean,
    }
}

/// Criteria matrix, one row per component.
pub fn is_imf_all<'a, I>(components: I, opts: &IsImfOptions) -> Vec<ImfCriteria>
where
    I: IntoIterator<Item = &'a [f64]>,
{
    components
        .into_iter()
        .map(|component| is_imf(component, opts))
        .collect()
}

/// Criteria for every IMF of a stack followed by its trend.
pub fn is_imf_stack(stack: &ImfStack, opts: &IsImfOptions) -> Vec<ImfCriteria> {
    is_imf_all(stack.components(), opts)
}

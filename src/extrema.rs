//! Local extrema detection and boundary padding.
//!
//! Envelopes are only well behaved near the edges of a signal when there are
//! extrema beyond both ends to anchor the interpolation. Detected extrema are
//! therefore mirrored outwards (locations by odd reflection, magnitudes by an
//! edge statistic) until the padded set spans the whole sample domain.

use serde::{Deserialize, Serialize};

/// Minimum number of maxima (and of minima) needed to build an envelope.
pub const MIN_EXTREMA: usize = 2;

/// Upper bound on padding rounds when extending extrema past the edges.
const MAX_PAD_ROUNDS: usize = 1000;

/// Which extrema to locate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtremaMode {
    /// Local maxima, used for the upper envelope.
    Peaks,
    /// Local minima, used for the lower envelope.
    Troughs,
}

/// Location padding mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocPadMode {
    /// Odd reflection about the outermost location: `2 * edge - mirrored`.
    #[default]
    Reflect,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LocPadOptions {
    pub mode: LocPadMode,
}

/// Statistic used to fill padded magnitudes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MagPadMode {
    #[default]
    Median,
    Mean,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MagPadOptions {
    pub mode: MagPadMode,
    /// Number of outermost magnitudes the statistic is taken over.
    pub stat_length: usize,
}

impl Default for MagPadOptions {
    fn default() -> Self {
        Self {
            mode: MagPadMode::Median,
            stat_length: 1,
        }
    }
}

/// Options for extrema detection and padding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtremaOptions {
    /// Number of extrema mirrored at each boundary per padding round.
    pub pad_width: usize,
    pub loc_pad_opts: LocPadOptions,
    pub mag_pad_opts: MagPadOptions,
    /// Refine extrema to the vertex of a parabola through neighbouring samples.
    pub parabolic_extrema: bool,
}

impl Default for ExtremaOptions {
    fn default() -> Self {
        Self {
            pad_width: 2,
            loc_pad_opts: LocPadOptions::default(),
            mag_pad_opts: MagPadOptions::default(),
            parabolic_extrema: false,
        }
    }
}

/// Ordered extrema of one kind.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Extrema {
    /// Sample positions, strictly increasing.
    pub locations: Vec<f64>,
    pub magnitudes: Vec<f64>,
}

impl Extrema {
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    fn push(&mut self, location: f64, magnitude: f64) {
        self.locations.push(location);
        self.magnitudes.push(magnitude);
    }
}

/// Find the local maxima of `x`.
///
/// Endpoints never count. A flat plateau reports its middle sample (the
/// left-middle one for plateaus of even width).
pub fn find_extrema(x: &[f64], parabolic: bool) -> Extrema {
    let mut out = Extrema::default();
    let n = x.len();
    if n < 3 {
        return out;
    }

    let last = n - 1;
    let mut i = 1;
    while i < last {
        if x[i - 1] < x[i] {
            let mut ahead = i + 1;
            while ahead < last && x[ahead] == x[i] {
                ahead += 1;
            }
            if x[ahead] < x[i] {
                let left = i;
                let right = ahead - 1;
                let mid = (left + right) / 2;
                if parabolic && left == right {
                    let (loc, mag) = parabolic_vertex(x[mid - 1], x[mid], x[mid + 1]);
                    out.push(mid as f64 + loc, mag);
                } else {
                    out.push(mid as f64, x[mid]);
                }
                i = ahead;
            }
        }
        i += 1;
    }
    out
}

/// Find the local minima of `x`; magnitudes keep their sign.
pub fn find_troughs(x: &[f64], parabolic: bool) -> Extrema {
    let negated: Vec<f64> = x.iter().map(|v| -v).collect();
    let mut troughs = find_extrema(&negated, parabolic);
    for m in troughs.magnitudes.iter_mut() {
        *m = -*m;
    }
    troughs
}

/// Offset and height of the vertex of the parabola through three samples.
fn parabolic_vertex(prev: f64, centre: f64, next: f64) -> (f64, f64) {
    let denom = prev - 2.0 * centre + next;
    if denom == 0.0 {
        return (0.0, centre);
    }
    let offset = 0.5 * (prev - next) / denom;
    (offset, centre - 0.25 * (prev - next) * offset)
}

/// Counts of local maxima and minima.
pub fn count_extrema(x: &[f64]) -> (usize, usize) {
    (find_extrema(x, false).len(), find_troughs(x, false).len())
}

/// True when `x` has enough maxima and minima to build both envelopes.
pub fn has_sufficient_extrema(x: &[f64]) -> bool {
    let (maxima, minima) = count_extrema(x);
    maxima >= MIN_EXTREMA && minima >= MIN_EXTREMA
}

/// Number of sign changes between neighbouring samples, with `sign(0) = 0`.
pub fn count_zero_crossings(x: &[f64]) -> usize {
    x.windows(2)
        .filter(|w| sign(w[0]) != sign(w[1]))
        .count()
}

fn sign(v: f64) -> i8 {
    if v > 0.0 {
        1
    } else if v < 0.0 {
        -1
    } else {
        0
    }
}

/// Locate extrema of one kind and pad them past both edges of the signal.
///
/// Returns `None` when fewer than [`MIN_EXTREMA`] extrema exist, which callers
/// treat as the end of sifting rather than as an error.
pub fn get_padded_extrema(x: &[f64], mode: ExtremaMode, opts: &ExtremaOptions) -> Option<Extrema> {
    let extrema = match mode {
        ExtremaMode::Peaks => find_extrema(x, opts.parabolic_extrema),
        ExtremaMode::Troughs => find_troughs(x, opts.parabolic_extrema),
    };

    if extrema.len() < MIN_EXTREMA {
        tracing::trace!(found = extrema.len(), ?mode, "not enough extrema to pad");
        return None;
    }

    Some(pad_extrema(extrema, x.len(), opts))
}

fn pad_extrema(extrema: Extrema, len: usize, opts: &ExtremaOptions) -> Extrema {
    let width = opts.pad_width.min(extrema.len());
    if width == 0 {
        return extrema;
    }

    let mut padded = pad_once(&extrema, width, opts);
    let mut rounds = 0;
    while !covers_domain(&padded.locations, len) {
        if rounds >= MAX_PAD_ROUNDS {
            tracing::debug!(rounds, "extrema padding stopped before covering the signal");
            break;
        }
        padded = pad_once(&padded, width, opts);
        rounds += 1;
    }
    padded
}

fn covers_domain(locations: &[f64], len: usize) -> bool {
    match (locations.first(), locations.last()) {
        (Some(&first), Some(&last)) => first < 0.0 && last >= len as f64,
        _ => false,
    }
}

fn pad_once(extrema: &Extrema, width: usize, opts: &ExtremaOptions) -> Extrema {
    let locations = match opts.loc_pad_opts.mode {
        LocPadMode::Reflect => reflect_odd(&extrema.locations, width),
    };
    let magnitudes = stat_pad(&extrema.magnitudes, width, &opts.mag_pad_opts);
    Extrema {
        locations,
        magnitudes,
    }
}

/// Odd reflection padding, applied in chunks of at most `len - 1` entries
/// when the requested width is wider than the data.
fn reflect_odd(values: &[f64], width: usize) -> Vec<f64> {
    if values.len() < 2 {
        return values.to_vec();
    }

    let mut core = values.to_vec();
    let mut remaining = width;
    while remaining > 0 {
        let chunk = remaining.min(core.len() - 1);
        let edge = core[0];
        let mirrored: Vec<f64> = (1..=chunk).rev().map(|k| 2.0 * edge - core[k]).collect();
        core.splice(0..0, mirrored);
        remaining -= chunk;
    }

    let mut remaining = width;
    while remaining > 0 {
        let chunk = remaining.min(core.len() - 1);
        let last = core.len() - 1;
        let edge = core[last];
        let mirrored: Vec<f64> = (1..=chunk).map(|k| 2.0 * edge - core[last - k]).collect();
        core.extend(mirrored);
        remaining -= chunk;
    }

    core
}

fn stat_pad(values: &[f64], width: usize, opts: &MagPadOptions) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let stat_len = opts.stat_length.clamp(1, values.len());
    let stat = |window: &[f64]| match opts.mode {
        MagPadMode::Median => median(window),
        MagPadMode::Mean => window.iter().sum::<f64>() / window.len() as f64,
    };
    let left = stat(&values[..stat_len]);
    let right = stat(&values[values.len() - stat_len..]);

    let mut out = Vec::with_capacity(values.len() + 2 * width);
    out.extend(std::iter::repeat(left).take(width));
    out.extend_from_slice(values);
    out.extend(std::iter::repeat(right).take(width));
    out
}

fn median(window: &[f64]) -> f64 {
    let mut sorted = window.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        0.5 * (sorted[mid - 1] + sorted[mid])
    } else {
        sorted[mid]
    }
}

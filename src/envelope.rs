//! Upper and lower envelope interpolation.
//!
//! An envelope is an interpolating curve through the padded extrema of one
//! kind, evaluated at every sample index of the signal.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::extrema::{get_padded_extrema, ExtremaMode, ExtremaOptions};

/// Interpolation method used to build envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterpMethod {
    /// Interpolating cubic spline with not-a-knot end conditions.
    #[default]
    Splrep,
    /// Monotone piecewise cubic Hermite (Fritsch-Carlson).
    Pchip,
    Linear,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeOptions {
    pub interp_method: InterpMethod,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InterpolationError {
    #[error("need at least {needed} knots, got {got}")]
    TooFewKnots { needed: usize, got: usize },
    #[error("knot and value counts differ: {knots} vs {values}")]
    LengthMismatch { knots: usize, values: usize },
    #[error("knot locations must be strictly increasing")]
    UnorderedKnots,
    #[error("knots contain non-finite values")]
    NonFinite,
    #[error("spline system is singular")]
    Singular,
}

/// Why an envelope could not be built.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnvelopeFailure {
    #[error("not enough extrema to build an envelope")]
    InsufficientExtrema,
    #[error("envelope interpolation failed: {0}")]
    Interpolation(#[from] InterpolationError),
}

/// A curve that can be evaluated anywhere on the real line.
pub trait Interpolant {
    fn evaluate(&self, t: f64) -> f64;

    /// Evaluate at the sample indices `0..len`.
    fn sample(&self, len: usize) -> Vec<f64> {
        (0..len).map(|i| self.evaluate(i as f64)).collect()
    }
}

fn check_knots(x: &[f64], y: &[f64], needed: usize) -> Result<(), InterpolationError> {
    if x.len() != y.len() {
        return Err(InterpolationError::LengthMismatch {
            knots: x.len(),
            values: y.len(),
        });
    }
    if x.len() < needed {
        return Err(InterpolationError::TooFewKnots {
            needed,
            got: x.len(),
        });
    }
    if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
        return Err(InterpolationError::NonFinite);
    }
    if x.windows(2).any(|w| w[1] <= w[0]) {
        return Err(InterpolationError::UnorderedKnots);
    }
    Ok(())
}

/// Index of the segment `[x[i], x[i + 1]]` used to evaluate at `t`; points
/// outside the knot range use the end segments.
fn segment(x: &[f64], t: f64) -> usize {
    let last = x.len() - 2;
    match x.binary_search_by(|knot| knot.total_cmp(&t)) {
        Ok(i) => i.min(last),
        Err(i) => i.saturating_sub(1).min(last),
    }
}

/// Interpolating cubic spline stored as knot values and second derivatives.
#[derive(Debug, Clone)]
pub struct CubicSpline {
    x: Vec<f64>,
    y: Vec<f64>,
    m: Vec<f64>,
}

impl CubicSpline {
    /// Fit a not-a-knot cubic spline. Three knots give the interpolating
    /// parabola, two give a straight line.
    pub fn not_a_knot(x: &[f64], y: &[f64]) -> Result<Self, InterpolationError> {
        check_knots(x, y, 2)?;
        let n = x.len();
        let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
        let d: Vec<f64> = y
            .windows(2)
            .zip(h.iter())
            .map(|(w, hi)| (w[1] - w[0]) / hi)
            .collect();

        let m = match n {
            2 => vec![0.0; 2],
            3 => {
                let curvature = 2.0 * (d[1] - d[0]) / (x[2] - x[0]);
                vec![curvature; 3]
            }
            _ => not_a_knot_second_derivatives(&h, &d)?,
        };

        Ok(Self {
            x: x.to_vec(),
            y: y.to_vec(),
            m,
        })
    }
}

/// Second derivatives of a not-a-knot spline for `n >= 4` knots (so at
/// least two interior unknowns).
///
/// The end conditions are substituted into the first and last interior rows,
/// which keeps the system tridiagonal in `M[1..n-1]`.
fn not_a_knot_second_derivatives(h: &[f64], d: &[f64]) -> Result<Vec<f64>, InterpolationError> {
    let n = h.len() + 1;
    let size = n - 2;
    let mut sub = vec![0.0; size];
    let mut diag = vec![0.0; size];
    let mut sup = vec![0.0; size];
    let mut rhs = vec![0.0; size];

    for row in 0..size {
        let i = row + 1;
        sub[row] = h[i - 1];
        diag[row] = 2.0 * (h[i - 1] + h[i]);
        sup[row] = h[i];
        rhs[row] = 6.0 * (d[i] - d[i - 1]);
    }

    let (h0, h1) = (h[0], h[1]);
    diag[0] = (h0 + h1) * (h0 + 2.0 * h1) / h1;
    sup[0] = (h1 * h1 - h0 * h0) / h1;

    let (a, b) = (h[n - 3], h[n - 2]);
    let last = size - 1;
    sub[last] = (a * a - b * b) / a;
    diag[last] = (a + b) * (2.0 * a + b) / a;

    let interior = solve_tridiagonal(&sub, &diag, &sup, &rhs)?;

    let mut m = Vec::with_capacity(n);
    m.push(((h0 + h1) * interior[0] - h0 * interior[1]) / h1);
    m.extend_from_slice(&interior);
    m.push(((a + b) * interior[last] - b * interior[last - 1]) / a);
    Ok(m)
}

/// Thomas algorithm for a tridiagonal system.
fn solve_tridiagonal(
    sub: &[f64],
    diag: &[f64],
    sup: &[f64],
    rhs: &[f64],
) -> Result<Vec<f64>, InterpolationError> {
    let n = diag.len();
    let mut c = vec![0.0; n];
    let mut r = vec![0.0; n];

    let mut pivot = diag[0];
    if pivot == 0.0 || !pivot.is_finite() {
        return Err(InterpolationError::Singular);
    }
    c[0] = sup[0] / pivot;
    r[0] = rhs[0] / pivot;
    for i in 1..n {
        pivot = diag[i] - sub[i] * c[i - 1];
        if pivot == 0.0 || !pivot.is_finite() {
            return Err(InterpolationError::Singular);
        }
        c[i] = sup[i] / pivot;
        r[i] = (rhs[i] - sub[i] * r[i - 1]) / pivot;
    }

    let mut out = vec![0.0; n];
    out[n - 1] = r[n - 1];
    for i in (0..n - 1).rev() {
        out[i] = r[i] - c[i] * out[i + 1];
    }
    if out.iter().any(|v| !v.is_finite()) {
        return Err(InterpolationError::Singular);
    }
    Ok(out)
}

impl Interpolant for CubicSpline {
    fn evaluate(&self, t: f64) -> f64 {
        let i = segment(&self.x, t);
        let h = self.x[i + 1] - self.x[i];
        let left = self.x[i + 1] - t;
        let right = t - self.x[i];
        self.m[i] * left.powi(3) / (6.0 * h)
            + self.m[i + 1] * right.powi(3) / (6.0 * h)
            + (self.y[i] / h - self.m[i] * h / 6.0) * left
            + (self.y[i + 1] / h - self.m[i + 1] * h / 6.0) * right
    }
}

/// Piecewise cubic Hermite interpolant with shape-preserving slopes.
#[derive(Debug, Clone)]
pub struct Pchip {
    x: Vec<f64>,
    y: Vec<f64>,
    slopes: Vec<f64>,
}

impl Pchip {
    pub fn new(x: &[f64], y: &[f64]) -> Result<Self, InterpolationError> {
        check_knots(x, y, 2)?;
        let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
        let delta: Vec<f64> = y
            .windows(2)
            .zip(h.iter())
            .map(|(w, hi)| (w[1] - w[0]) / hi)
            .collect();

        let n = x.len();
        let slopes = if n == 2 {
            vec![delta[0]; 2]
        } else {
            let mut s = vec![0.0; n];
            for k in 1..n - 1 {
                if delta[k - 1] * delta[k] > 0.0 {
                    let w1 = 2.0 * h[k] + h[k - 1];
                    let w2 = h[k] + 2.0 * h[k - 1];
                    s[k] = (w1 + w2) / (w1 / delta[k - 1] + w2 / delta[k]);
                }
            }
            s[0] = pchip_end_slope(h[0], h[1], delta[0], delta[1]);
            s[n - 1] = pchip_end_slope(h[n - 2], h[n - 3], delta[n - 2], delta[n - 3]);
            s
        };

        Ok(Self {
            x: x.to_vec(),
            y: y.to_vec(),
            slopes,
        })
    }
}

/// One-sided three-point end slope, limited to preserve shape.
fn pchip_end_slope(h0: f64, h1: f64, d0: f64, d1: f64) -> f64 {
    let slope = ((2.0 * h0 + h1) * d0 - h0 * d1) / (h0 + h1);
    if slope.signum() != d0.signum() {
        0.0
    } else if d0.signum() != d1.signum() && slope.abs() > 3.0 * d0.abs() {
        3.0 * d0
    } else {
        slope
    }
}

impl Interpolant for Pchip {
    fn evaluate(&self, t: f64) -> f64 {
        let i = segment(&self.x, t);
        let h = self.x[i + 1] - self.x[i];
        let s = (t - self.x[i]) / h;
        let s2 = s * s;
        let s3 = s2 * s;
        let h00 = 2.0 * s3 - 3.0 * s2 + 1.0;
        let h10 = s3 - 2.0 * s2 + s;
        let h01 = -2.0 * s3 + 3.0 * s2;
        let h11 = s3 - s2;
        h00 * self.y[i] + h10 * h * self.slopes[i] + h01 * self.y[i + 1] + h11 * h * self.slopes[i + 1]
    }
}

#[derive(Debug, Clone)]
pub struct PiecewiseLinear {
    x: Vec<f64>,
    y: Vec<f64>,
}

impl PiecewiseLinear {
    pub fn new(x: &[f64], y: &[f64]) -> Result<Self, InterpolationError> {
        check_knots(x, y, 2)?;
        Ok(Self {
            x: x.to_vec(),
            y: y.to_vec(),
        })
    }
}

impl Interpolant for PiecewiseLinear {
    fn evaluate(&self, t: f64) -> f64 {
        let i = segment(&self.x, t);
        let frac = (t - self.x[i]) / (self.x[i + 1] - self.x[i]);
        self.y[i] + frac * (self.y[i + 1] - self.y[i])
    }
}

/// Fit the interpolant selected by `method` through the given knots.
pub fn build_interpolant(
    method: InterpMethod,
    x: &[f64],
    y: &[f64],
) -> Result<Box<dyn Interpolant + Send + Sync>, InterpolationError> {
    Ok(match method {
        InterpMethod::Splrep => Box::new(CubicSpline::not_a_knot(x, y)?),
        InterpMethod::Pchip => Box::new(Pchip::new(x, y)?),
        InterpMethod::Linear => Box::new(PiecewiseLinear::new(x, y)?),
    })
}

/// Interpolate the upper (`Peaks`) or lower (`Troughs`) envelope of `x`.
pub fn interp_envelope(
    x: &[f64],
    mode: ExtremaMode,
    envelope_opts: &EnvelopeOptions,
    extrema_opts: &ExtremaOptions,
) -> Result<Vec<f64>, EnvelopeFailure> {
    let extrema =
        get_padded_extrema(x, mode, extrema_opts).ok_or(EnvelopeFailure::InsufficientExtrema)?;
    let curve = build_interpolant(
        envelope_opts.interp_method,
        &extrema.locations,
        &extrema.magnitudes,
    )?;
    Ok(curve.sample(x.len()))
}

/// Upper and lower envelopes of a signal.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub upper: Vec<f64>,
    pub lower: Vec<f64>,
}

impl Envelope {
    /// Local mean `(upper + lower) / 2`.
    pub fn mean(&self) -> Vec<f64> {
        self.upper
            .iter()
            .zip(self.lower.iter())
            .map(|(u, l)| 0.5 * (u + l))
            .collect()
    }
}

pub fn get_envelopes(
    x: &[f64],
    envelope_opts: &EnvelopeOptions,
    extrema_opts: &ExtremaOptions,
) -> Result<Envelope, EnvelopeFailure> {
    let upper = interp_envelope(x, ExtremaMode::Peaks, envelope_opts, extrema_opts)?;
    let lower = interp_envelope(x, ExtremaMode::Troughs, envelope_opts, extrema_opts)?;
    Ok(Envelope { upper, lower })
}

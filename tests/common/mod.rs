//! Shared test signals.

#![allow(dead_code)]

use std::f64::consts::PI;

pub const SECONDS: f64 = 5.1;
pub const SAMPLE_RATE: f64 = 2000.0;

/// `n` evenly spaced points from `start` to `stop` inclusive.
pub fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![start];
    }
    let step = (stop - start) / (n - 1) as f64;
    (0..n).map(|i| start + step * i as f64).collect()
}

pub fn time_vector() -> Vec<f64> {
    linspace(0.0, SECONDS, (SECONDS * SAMPLE_RATE) as usize)
}

/// Non-sinusoidal oscillation of Abreu et al. (2010) with nonlinearity
/// `degree` and phase `phi`.
pub fn abreu2010(freq: f64, degree: f64, phi: f64, time: &[f64]) -> Vec<f64> {
    let factor = (1.0 - degree * degree).sqrt();
    let offset = degree * phi.sin() / (1.0 + factor);
    time.iter()
        .map(|&t| {
            let theta = 2.0 * PI * freq * t;
            factor * (offset + theta.sin()) / (1.0 - degree * (theta + phi).cos())
        })
        .collect()
}

/// 2 Hz nonlinear oscillation + 20.7 Hz cosine + linear trend.
pub fn test_signal() -> Vec<f64> {
    let time = time_vector();
    let slow = abreu2010(2.0, 0.2, 0.0, &time);
    let trend = linspace(-0.5, 1.0, time.len());
    time.iter()
        .zip(slow.iter())
        .zip(trend.iter())
        .map(|((&t, s), tr)| s + (2.3 * PI * 18.0 * t).cos() + tr)
        .collect()
}

/// Fraction of the energy of `x` explained by `x_bar`.
pub fn explained(x: &[f64], x_bar: &[f64]) -> f64 {
    let ss_orig: f64 = x.iter().map(|v| v * v).sum();
    let ss_resid: f64 = x.iter().zip(x_bar.iter()).map(|(a, b)| (a - b).powi(2)).sum();
    (ss_orig - ss_resid) / ss_orig
}

pub fn power(x: &[f64]) -> f64 {
    x.iter().map(|v| v * v).sum()
}

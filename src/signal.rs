//! Input boundary for the sift functions.
//!
//! Everything past this module works on a contiguous `&[f64]`. Arrays with
//! trailing singleton dimensions (`(n,)`, `(n, 1)`, `(n, 1, 1)`, ...) are
//! flattened here; anything else is rejected with
//! [`SiftError::InputShape`].

use std::ops::Deref;

use ndarray::ArrayViewD;

use crate::error::{Result, SiftError};

/// A one-dimensional, uniformly sampled signal.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    samples: Vec<f64>,
}

impl Signal {
    /// Wrap a one-dimensional sample vector.
    pub fn new(samples: Vec<f64>) -> Result<Self> {
        check_shape(&[samples.len()])?;
        Ok(Self { samples })
    }

    /// Build a signal from row-major data of the given shape.
    pub fn from_shape_vec(shape: &[usize], samples: Vec<f64>) -> Result<Self> {
        check_shape(shape)?;
        let expected: usize = shape.iter().product();
        if expected != samples.len() {
            return Err(SiftError::InputShape {
                shape: shape.to_vec(),
            });
        }
        Ok(Self { samples })
    }

    /// Build a signal from an n-dimensional array view.
    pub fn from_array(array: ArrayViewD<'_, f64>) -> Result<Self> {
        check_shape(array.shape())?;
        Ok(Self {
            samples: array.iter().copied().collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.samples
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.samples
    }
}

impl Deref for Signal {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        &self.samples
    }
}

impl AsRef<[f64]> for Signal {
    fn as_ref(&self) -> &[f64] {
        &self.samples
    }
}

/// Accepts `(n, 1, 1, ...)` with `n > 1`.
fn check_shape(shape: &[usize]) -> Result<()> {
    let valid = match shape.split_first() {
        Some((&first, rest)) => first > 1 && rest.iter().all(|&d| d == 1),
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(SiftError::InputShape {
            shape: shape.to_vec(),
        })
    }
}

/// Rejects empty sample slices at the top of every public entry point.
pub(crate) fn ensure_samples(x: &[f64]) -> Result<()> {
    if x.is_empty() {
        return Err(SiftError::InputShape { shape: vec![0] });
    }
    Ok(())
}

pub(crate) fn energy(x: &[f64]) -> f64 {
    x.iter().map(|v| v * v).sum()
}

pub(crate) fn std_dev(x: &[f64]) -> f64 {
    if x.is_empty() {
        return 0.0;
    }
    let n = x.len() as f64;
    let mean = x.iter().sum::<f64>() / n;
    (x.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array1, Array2, Array3};

    #[test]
    fn accepts_trailing_singletons() {
        let data: Vec<f64> = (0..16).map(|i| i as f64).collect();

        let one = Array1::from(data.clone());
        assert_eq!(Signal::from_array(one.view().into_dyn()).unwrap().len(), 16);

        let two = Array2::from_shape_vec((16, 1), data.clone()).unwrap();
        assert_eq!(Signal::from_array(two.view().into_dyn()).unwrap().len(), 16);

        let three = Array3::from_shape_vec((16, 1, 1), data).unwrap();
        assert_eq!(
            Signal::from_array(three.view().into_dyn()).unwrap().as_slice()[15],
            15.0
        );
    }

    #[test]
    fn rejects_second_non_singleton_dimension() {
        let two = Array2::<f64>::zeros((16, 2));
        assert!(matches!(
            Signal::from_array(two.view().into_dyn()),
            Err(SiftError::InputShape { .. })
        ));

        let three = Array3::<f64>::zeros((16, 2, 3));
        assert!(matches!(
            Signal::from_array(three.view().into_dyn()),
            Err(SiftError::InputShape { .. })
        ));
    }

    #[test]
    fn rejects_leading_singleton_and_empty() {
        assert!(Signal::from_shape_vec(&[1, 16], vec![0.0; 16]).is_err());
        assert!(Signal::new(Vec::new()).is_err());
        assert!(Signal::from_shape_vec(&[4, 1], vec![0.0; 3]).is_err());
    }

    #[test]
    fn std_dev_of_constant_is_zero() {
        assert_eq!(std_dev(&[2.0; 8]), 0.0);
        assert_abs_diff_eq!(std_dev(&[1.0, -1.0]), 1.0, epsilon = 1e-12);
    }
}

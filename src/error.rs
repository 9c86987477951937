//! Error taxonomy for the sift family.
//!
//! Running out of extrema or failing to interpolate an envelope is not an
//! error: those outcomes are reported through [`crate::sift::Extraction`] and
//! [`crate::sift::SiftState`] and only ever end a sift gracefully.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SiftError {
    #[error("input must have exactly one non-singleton leading dimension, got shape {shape:?}")]
    InputShape { shape: Vec<usize> },
    #[error("unknown configuration key: {path}")]
    ConfigKey { path: String },
    #[error("invalid value for configuration key {path}: {reason}")]
    ConfigValue { path: String, reason: String },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("noise distribution error: {0}")]
    Noise(#[from] rand_distr::NormalError),
    #[error("thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SiftError>;

//! emd-sift - Empirical Mode Decomposition
//!
//! Decomposes a one-dimensional signal into intrinsic mode functions (IMFs)
//! and a residual trend by iterative sifting, with noise-assisted (ensemble,
//! complete ensemble) and masked variants.
//!
//! ```no_run
//! use emd_sift::{sift, SiftOptions};
//!
//! let x: Vec<f64> = (0..1000).map(|i| (i as f64 * 0.05).sin() + 0.001 * i as f64).collect();
//! let stack = sift(&x, &SiftOptions::default())?;
//! assert_eq!(stack.reconstruct().len(), x.len());
//! # Ok::<(), emd_sift::SiftError>(())
//! ```

pub mod config;
pub mod ensemble;
pub mod envelope;
pub mod error;
pub mod extrema;
pub mod imf;
pub mod mask;
pub mod sift;
pub mod signal;
pub mod stop;

// Re-export main types
pub use config::{get_config, Decomposition, SiftConfig, SiftType};
pub use ensemble::{
    complete_ensemble_sift, ensemble_sift, CompleteEnsembleOptions, CompleteEnsembleOutput,
    EnsembleOptions, NoiseMode,
};
pub use envelope::{EnvelopeOptions, InterpMethod};
pub use error::{Result, SiftError};
pub use extrema::{ExtremaOptions, MIN_EXTREMA};
pub use imf::{is_imf, is_imf_stack, ImfCriteria, IsImfOptions};
pub use mask::{
    get_next_imf_mask, mask_sift, MaskAmpMode, MaskFreqs, MaskImfOptions, MaskSiftOptions,
    MaskSiftOutput,
};
pub use sift::{get_next_imf, sift, Extraction, ImfOptions, ImfStack, SiftOptions, SiftState};
pub use signal::Signal;
pub use stop::{StopCriterion, StopMethod};

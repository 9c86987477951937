//! Sift configuration.
//!
//! [`SiftConfig`] holds the typed options of one sift variant. A path adapter
//! (`get`/`set` with `/`-separated keys) and YAML round-tripping are offered
//! on top of the typed options for callers that store configurations as
//! files.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ensemble::{
    complete_ensemble_sift, ensemble_sift, CompleteEnsembleOptions, CompleteEnsembleOutput,
    EnsembleOptions,
};
use crate::error::{Result, SiftError};
use crate::mask::{mask_sift, MaskSiftOptions, MaskSiftOutput};
use crate::sift::{sift, ImfStack, SiftOptions};

const TYPE_KEY: &str = "sift_type";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiftType {
    Sift,
    EnsembleSift,
    CompleteEnsembleSift,
    MaskSift,
}

impl SiftType {
    pub const ALL: [SiftType; 4] = [
        SiftType::Sift,
        SiftType::EnsembleSift,
        SiftType::CompleteEnsembleSift,
        SiftType::MaskSift,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SiftType::Sift => "sift",
            SiftType::EnsembleSift => "ensemble_sift",
            SiftType::CompleteEnsembleSift => "complete_ensemble_sift",
            SiftType::MaskSift => "mask_sift",
        }
    }
}

impl fmt::Display for SiftType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SiftType {
    type Err = SiftError;

    fn from_str(s: &str) -> Result<Self> {
        SiftType::ALL
            .into_iter()
            .find(|ty| ty.as_str() == s)
            .ok_or_else(|| SiftError::ConfigKey {
                path: format!("{TYPE_KEY}/{s}"),
            })
    }
}

/// Options for one sift variant, tagged by `sift_type` when serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "sift_type", rename_all = "snake_case")]
pub enum SiftConfig {
    Sift(SiftOptions),
    EnsembleSift(EnsembleOptions),
    CompleteEnsembleSift(CompleteEnsembleOptions),
    MaskSift(MaskSiftOptions),
}

impl Default for SiftConfig {
    fn default() -> Self {
        SiftConfig::Sift(SiftOptions::default())
    }
}

/// Default configuration for a sift variant.
pub fn get_config(sift_type: SiftType) -> SiftConfig {
    match sift_type {
        SiftType::Sift => SiftConfig::Sift(SiftOptions::default()),
        SiftType::EnsembleSift => SiftConfig::EnsembleSift(EnsembleOptions::default()),
        SiftType::CompleteEnsembleSift => {
            SiftConfig::CompleteEnsembleSift(CompleteEnsembleOptions::default())
        }
        SiftType::MaskSift => SiftConfig::MaskSift(MaskSiftOptions::default()),
    }
}

/// Output of [`SiftConfig::run`].
#[derive(Debug, Clone, PartialEq)]
pub enum Decomposition {
    Sift(ImfStack),
    EnsembleSift(ImfStack),
    CompleteEnsembleSift(CompleteEnsembleOutput),
    MaskSift(MaskSiftOutput),
}

impl Decomposition {
    pub fn imfs(&self) -> &ImfStack {
        match self {
            Decomposition::Sift(stack) | Decomposition::EnsembleSift(stack) => stack,
            Decomposition::CompleteEnsembleSift(out) => &out.imfs,
            Decomposition::MaskSift(out) => &out.imfs,
        }
    }

    pub fn into_imfs(self) -> ImfStack {
        match self {
            Decomposition::Sift(stack) | Decomposition::EnsembleSift(stack) => stack,
            Decomposition::CompleteEnsembleSift(out) => out.imfs,
            Decomposition::MaskSift(out) => out.imfs,
        }
    }
}

impl SiftConfig {
    pub fn sift_type(&self) -> SiftType {
        match self {
            SiftConfig::Sift(_) => SiftType::Sift,
            SiftConfig::EnsembleSift(_) => SiftType::EnsembleSift,
            SiftConfig::CompleteEnsembleSift(_) => SiftType::CompleteEnsembleSift,
            SiftConfig::MaskSift(_) => SiftType::MaskSift,
        }
    }

    /// Options shared by every variant.
    pub fn sift_options(&self) -> &SiftOptions {
        match self {
            SiftConfig::Sift(opts) => opts,
            SiftConfig::EnsembleSift(opts) => &opts.sift,
            SiftConfig::CompleteEnsembleSift(opts) => &opts.sift,
            SiftConfig::MaskSift(opts) => &opts.sift,
        }
    }

    pub fn sift_options_mut(&mut self) -> &mut SiftOptions {
        match self {
            SiftConfig::Sift(opts) => opts,
            SiftConfig::EnsembleSift(opts) => &mut opts.sift,
            SiftConfig::CompleteEnsembleSift(opts) => &mut opts.sift,
            SiftConfig::MaskSift(opts) => &mut opts.sift,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            SiftConfig::Sift(opts) => opts.validate(),
            SiftConfig::EnsembleSift(opts) => opts.validate(),
            SiftConfig::CompleteEnsembleSift(opts) => opts.validate(),
            SiftConfig::MaskSift(opts) => opts.validate(),
        }
    }

    /// Run the configured sift on `x`.
    pub fn run(&self, x: &[f64]) -> Result<Decomposition> {
        tracing::debug!(sift_type = %self.sift_type(), samples = x.len(), "running sift");
        Ok(match self {
            SiftConfig::Sift(opts) => Decomposition::Sift(sift(x, opts)?),
            SiftConfig::EnsembleSift(opts) => Decomposition::EnsembleSift(ensemble_sift(x, opts)?),
            SiftConfig::CompleteEnsembleSift(opts) => {
                Decomposition::CompleteEnsembleSift(complete_ensemble_sift(x, opts)?)
            }
            SiftConfig::MaskSift(opts) => Decomposition::MaskSift(mask_sift(x, opts)?),
        })
    }

    /// Every leaf key path in the configuration, `sift_type` included.
    pub fn keys(&self) -> Result<Vec<String>> {
        let tree = serde_json::to_value(self)?;
        let mut out = Vec::new();
        collect_keys(&tree, String::new(), &mut out);
        Ok(out)
    }

    /// Value at a `/`-separated key path, e.g. `imf_opts/sd_thresh`.
    pub fn get(&self, path: &str) -> Result<Value> {
        let tree = serde_json::to_value(self)?;
        lookup(&tree, path).cloned().ok_or_else(|| SiftError::ConfigKey {
            path: path.to_string(),
        })
    }

    /// Replace the value at a `/`-separated key path.
    ///
    /// `sift_type` cannot be changed; start from [`get_config`] instead.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> Result<()> {
        if path == TYPE_KEY {
            return Err(SiftError::ConfigValue {
                path: path.to_string(),
                reason: "sift_type is read-only".to_string(),
            });
        }

        let mut tree = serde_json::to_value(&*self)?;
        let slot = lookup_mut(&mut tree, path).ok_or_else(|| SiftError::ConfigKey {
            path: path.to_string(),
        })?;
        *slot = value.into();

        let updated: SiftConfig =
            serde_json::from_value(tree).map_err(|err| SiftError::ConfigValue {
                path: path.to_string(),
                reason: err.to_string(),
            })?;
        *self = updated;
        Ok(())
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = self.to_yaml_string()?;
        fs::write(path.as_ref(), content)?;
        tracing::debug!(path = %path.as_ref().display(), "wrote sift config");
        Ok(())
    }

    /// Parse a YAML configuration.
    ///
    /// Keys that the declared `sift_type` does not know are rejected; keys
    /// that are left out keep their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let loaded: serde_yaml::Value = serde_yaml::from_str(yaml)?;
        let loaded = serde_json::to_value(loaded)?;

        let sift_type = match loaded.get(TYPE_KEY) {
            Some(Value::String(name)) => name.parse::<SiftType>()?,
            Some(_) => {
                return Err(SiftError::ConfigValue {
                    path: TYPE_KEY.to_string(),
                    reason: "expected a string".to_string(),
                })
            }
            None => {
                return Err(SiftError::ConfigKey {
                    path: TYPE_KEY.to_string(),
                })
            }
        };

        let defaults = serde_json::to_value(get_config(sift_type))?;
        check_known_keys(&loaded, &defaults, "")?;

        let config: SiftConfig =
            serde_json::from_value(loaded).map_err(|err| SiftError::ConfigValue {
                path: String::new(),
                reason: err.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config = Self::from_yaml_str(&content)?;
        tracing::debug!(
            path = %path.as_ref().display(),
            sift_type = %config.sift_type(),
            "loaded sift config"
        );
        Ok(config)
    }
}

fn lookup<'a>(tree: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .try_fold(tree, |node, segment| match node {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

fn lookup_mut<'a>(tree: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    let mut node = tree;
    for segment in path.split('/').filter(|segment| !segment.is_empty()) {
        node = match node {
            Value::Object(map) => map.get_mut(segment)?,
            Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(node)
}

fn collect_keys(node: &Value, prefix: String, out: &mut Vec<String>) {
    match node {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}/{key}")
                };
                collect_keys(child, path, out);
            }
        }
        _ => out.push(prefix),
    }
}

fn check_known_keys(loaded: &Value, defaults: &Value, prefix: &str) -> Result<()> {
    let (Value::Object(loaded), Value::Object(defaults)) = (loaded, defaults) else {
        return Ok(());
    };
    for (key, child) in loaded {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}/{key}")
        };
        match defaults.get(key) {
            Some(default) => check_known_keys(child, default, &path)?,
            None => return Err(SiftError::ConfigKey { path }),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stop::StopMethod;

    #[test]
    fn sift_type_names_round_trip() {
        for ty in SiftType::ALL {
            assert_eq!(ty.as_str().parse::<SiftType>().unwrap(), ty);
            assert_eq!(get_config(ty).sift_type(), ty);
        }
        assert!(matches!(
            "hht".parse::<SiftType>(),
            Err(SiftError::ConfigKey { .. })
        ));
    }

    #[test]
    fn get_reads_nested_defaults() {
        let config = get_config(SiftType::Sift);
        assert_eq!(config.get("sift_type").unwrap(), Value::from("sift"));
        assert_eq!(config.get("max_imfs").unwrap(), Value::Null);
        assert_eq!(config.get("imf_opts/sd_thresh").unwrap(), Value::from(0.1));
        assert_eq!(config.get("extrema_opts/pad_width").unwrap(), Value::from(2));
        assert_eq!(
            config.get("extrema_opts/loc_pad_opts/mode").unwrap(),
            Value::from("reflect")
        );
        assert_eq!(
            config.get("envelope_opts/interp_method").unwrap(),
            Value::from("splrep")
        );
        assert_eq!(config.get("imf_opts/rilling_thresh/1").unwrap(), Value::from(0.5));
    }

    #[test]
    fn flattened_options_share_top_level() {
        let config = get_config(SiftType::MaskSift);
        assert_eq!(config.get("max_imfs").unwrap(), Value::from(9));
        assert_eq!(config.get("mask_freqs").unwrap(), Value::from("zc"));
        assert_eq!(config.get("nphases").unwrap(), Value::from(4));

        let config = get_config(SiftType::EnsembleSift);
        assert_eq!(config.get("nensembles").unwrap(), Value::from(4));
        assert_eq!(config.get("noise_mode").unwrap(), Value::from("single"));
    }

    #[test]
    fn set_updates_typed_options() {
        let mut config = get_config(SiftType::Sift);
        config.set("imf_opts/stop_method", "rilling").unwrap();
        config.set("max_imfs", 5).unwrap();
        assert_eq!(config.sift_options().imf_opts.stop_method, StopMethod::Rilling);
        assert_eq!(config.sift_options().max_imfs, Some(5));
    }

    #[test]
    fn set_rejects_unknown_keys_and_bad_values() {
        let mut config = get_config(SiftType::Sift);
        assert!(matches!(
            config.set("imf_opts/not_a_key", 1),
            Err(SiftError::ConfigKey { .. })
        ));
        assert!(matches!(
            config.set("imf_opts/sd_thresh", "high"),
            Err(SiftError::ConfigValue { .. })
        ));
        assert!(matches!(
            config.set("sift_type", "mask_sift"),
            Err(SiftError::ConfigValue { .. })
        ));
        assert_eq!(config, get_config(SiftType::Sift));
    }

    #[test]
    fn keys_list_every_leaf() {
        let keys = get_config(SiftType::Sift).keys().unwrap();
        assert!(keys.iter().any(|k| k == "sift_type"));
        assert!(keys.iter().any(|k| k == "extrema_opts/mag_pad_opts/stat_length"));
        assert!(keys.iter().any(|k| k == "imf_opts/max_iters"));
    }

    #[test]
    fn yaml_round_trip_keeps_every_variant() {
        for ty in SiftType::ALL {
            let mut config = get_config(ty);
            config.sift_options_mut().sift_thresh = 1e-6;
            let yaml = config.to_yaml_string().unwrap();
            let parsed = SiftConfig::from_yaml_str(&yaml).unwrap();
            assert_eq!(parsed, config);
        }
    }

    #[test]
    fn yaml_fills_defaults_and_rejects_unknown_keys() {
        let parsed = SiftConfig::from_yaml_str("sift_type: ensemble_sift\nnensembles: 8\n").unwrap();
        match parsed {
            SiftConfig::EnsembleSift(opts) => {
                assert_eq!(opts.nensembles, 8);
                assert_eq!(opts.ensemble_noise, 0.2);
            }
            other => panic!("unexpected config {other:?}"),
        }

        assert!(matches!(
            SiftConfig::from_yaml_str("sift_type: sift\nnensembles: 8\n"),
            Err(SiftError::ConfigKey { .. })
        ));
        assert!(matches!(
            SiftConfig::from_yaml_str("max_imfs: 3\n"),
            Err(SiftError::ConfigKey { .. })
        ));
    }

    #[test]
    fn yaml_load_validates() {
        assert!(matches!(
            SiftConfig::from_yaml_str("sift_type: ensemble_sift\nnensembles: 0\n"),
            Err(SiftError::InvalidConfig(_))
        ));
    }
}

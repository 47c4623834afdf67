//! Bundled resources and the package directory they live in.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use tracing::debug;

use crate::error::{EarthformerError, Result};

/// Name used to locate this package's resources.
pub const PACKAGE_NAME: &str = "earthformer";

/// EarthNet training configuration, relative to the package directory.
pub const EARTHNET_CONFIG: &str =
    "scripts/cuboid_transformer/earthnet_w_meso/earthformer_earthnet_v1.yaml";

/// Environment variable overriding the directory of package `name`,
/// e.g. `EARTHFORMER_HOME`.
pub fn home_env_var(name: &str) -> String {
    format!("{}_HOME", name.to_ascii_uppercase().replace('-', "_"))
}

/// Directory holding the resources of package `name`.
///
/// `<NAME>_HOME` wins when set; otherwise this package resolves to the
/// directory it was built from.
pub fn package_dir(name: &str) -> Result<PathBuf> {
    resolve_package_dir(name, std::env::var_os(home_env_var(name)))
}

fn resolve_package_dir(name: &str, home: Option<OsString>) -> Result<PathBuf> {
    match home {
        Some(dir) if !dir.is_empty() => Ok(PathBuf::from(dir)),
        _ if name == PACKAGE_NAME => Ok(PathBuf::from(env!("CARGO_MANIFEST_DIR"))),
        _ => Err(EarthformerError::PackageNotFound(
            name.to_string(),
            home_env_var(name),
        )),
    }
}

/// Path of the bundled EarthNet configuration.
pub fn earthnet_config_path() -> Result<PathBuf> {
    config_in(&package_dir(PACKAGE_NAME)?)
}

fn config_in(pkg_dir: &Path) -> Result<PathBuf> {
    let path = pkg_dir.join(EARTHNET_CONFIG);
    if path.is_file() {
        Ok(path)
    } else {
        Err(EarthformerError::ConfigNotFound(path))
    }
}

/// Load and check the bundled EarthNet configuration.
pub fn load_earthnet_config() -> Result<EarthnetConfig> {
    read_earthnet_config(&earthnet_config_path()?)
}

pub fn read_earthnet_config(path: &Path) -> Result<EarthnetConfig> {
    let text = std::fs::read_to_string(path)?;
    let config: EarthnetConfig = serde_yaml::from_str(&text)?;
    config.validate()?;
    debug!(
        path = %path.display(),
        in_len = config.layout.in_len,
        out_len = config.layout.out_len,
        "Loaded EarthNet config"
    );
    Ok(config)
}

/// Typed view of the EarthNet training configuration.
///
/// Sections and keys without a typed field are kept as raw YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarthnetConfig {
    pub dataset: DatasetConfig,
    pub layout: LayoutConfig,
    pub optim: OptimConfig,
    pub model: ModelConfig,
    #[serde(flatten)]
    pub sections: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub return_mode: String,
    pub img_height: usize,
    pub img_width: usize,
    pub in_len: usize,
    pub out_len: usize,
    pub seq_len: usize,
    pub layout: String,
    pub val_ratio: f64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    pub in_len: usize,
    pub out_len: usize,
    pub img_height: usize,
    pub img_width: usize,
    pub data_channels: usize,
    pub layout: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimConfig {
    pub total_batch_size: usize,
    pub micro_batch_size: usize,
    pub seed: u64,
    pub method: String,
    pub lr: f64,
    pub wd: f64,
    pub max_epochs: usize,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub input_shape: Vec<usize>,
    pub target_shape: Vec<usize>,
    pub base_units: usize,
    pub num_heads: usize,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl EarthnetConfig {
    /// Check that the model shapes agree with the data layout.
    pub fn validate(&self) -> Result<()> {
        let l = &self.layout;
        if self.dataset.in_len + self.dataset.out_len != self.dataset.seq_len {
            return Err(EarthformerError::Config(format!(
                "dataset in_len {} + out_len {} != seq_len {}",
                self.dataset.in_len, self.dataset.out_len, self.dataset.seq_len
            )));
        }

        let expected_input = [l.in_len, l.img_height, l.img_width, l.data_channels];
        let expected_target = [l.out_len, l.img_height, l.img_width, l.data_channels];
        if self.model.input_shape != expected_input {
            return Err(EarthformerError::Config(format!(
                "model input_shape {:?} does not match layout {:?}",
                self.model.input_shape, expected_input
            )));
        }
        if self.model.target_shape != expected_target {
            return Err(EarthformerError::Config(format!(
                "model target_shape {:?} does not match layout {:?}",
                self.model.target_shape, expected_target
            )));
        }
        Ok(())
    }
}

//! Configuration types for weight transfer.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::Result;

/// Key namespaces used to route each parameter to a merge rule.
///
/// The defaults match Stable Diffusion 1.x checkpoints with a ControlNet
/// adapter attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyPrefixes {
    /// VAE namespace. Keys under it are copied from the donor.
    pub first_stage: String,
    /// Text-encoder namespace. Keys under it are copied from the donor.
    pub cond_stage: String,
    /// Namespace of the control adapter's own parameters.
    pub control: String,
    /// Namespace of the base model's main network that `control` mirrors.
    pub diffusion: String,
}

impl Default for KeyPrefixes {
    fn default() -> Self {
        Self {
            first_stage: "first_stage_model".to_string(),
            cond_stage: "cond_stage_model".to_string(),
            control: "control_".to_string(),
            diffusion: "model.diffusion_".to_string(),
        }
    }
}

/// Complete transfer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Unmodified base model checkpoint.
    pub base_model: PathBuf,

    /// Base model extended with the control adapter.
    pub control_model: PathBuf,

    /// Fine-tuned model sharing the base architecture.
    pub donor_model: PathBuf,

    /// Where the transferred adapter is written.
    pub output_path: PathBuf,

    /// Key namespaces.
    #[serde(default)]
    pub prefixes: KeyPrefixes,

    /// Plan the transfer without loading the base model or writing output.
    #[serde(default)]
    pub dry_run: bool,
}

impl TransferConfig {
    /// Create a configuration with default prefixes.
    pub fn new(
        base_model: impl Into<PathBuf>,
        control_model: impl Into<PathBuf>,
        donor_model: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            base_model: base_model.into(),
            control_model: control_model.into(),
            donor_model: donor_model.into(),
            output_path: output_path.into(),
            prefixes: KeyPrefixes::default(),
            dry_run: false,
        }
    }

    /// Load key prefixes from a YAML file. Absent fields keep their defaults.
    pub fn prefixes_from_yaml(path: impl AsRef<Path>) -> Result<KeyPrefixes> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&contents)?)
    }
}

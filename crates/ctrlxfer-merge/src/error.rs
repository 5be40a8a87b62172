//! Error types for weight transfer operations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while transferring control weights.
#[derive(Debug, Error)]
pub enum MergeError {
    /// A required input or output location does not exist.
    #[error("{what} does not exist: {path:?}")]
    Precondition {
        /// Which resource is missing (e.g. "Base model").
        what: &'static str,
        /// The offending path.
        path: PathBuf,
    },

    /// Output path does not name a safetensors file.
    #[error("Output must be a .safetensors file: {0:?}")]
    OutputFormat(PathBuf),

    /// Tensor not found in a parameter store.
    #[error("Tensor not found in {store} checkpoint: {name}")]
    MissingTensor {
        /// Tensor name.
        name: String,
        /// Role of the store that was searched.
        store: &'static str,
    },

    /// Operand shapes cannot be combined elementwise.
    #[error("Shape mismatch for tensor '{name}': {lhs:?} vs {rhs:?} (from '{source_name}')")]
    ShapeMismatch {
        /// Output tensor name.
        name: String,
        /// Tensor name the offset was read from.
        source_name: String,
        /// Shape of the left operand.
        lhs: Vec<usize>,
        /// Shape of the right operand.
        rhs: Vec<usize>,
    },

    /// Operand dtypes differ.
    #[error("Dtype mismatch for tensor '{name}': {lhs:?} vs {rhs:?} (from '{source_name}')")]
    DtypeMismatch {
        /// Output tensor name.
        name: String,
        /// Tensor name the offset was read from.
        source_name: String,
        /// Dtype of the left operand.
        lhs: candle_core::DType,
        /// Dtype of the right operand.
        rhs: candle_core::DType,
    },

    /// Checkpoint could not be read or is not a recognized container.
    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    /// Tensor backend error.
    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    /// Safetensors error.
    #[error("Safetensors error: {0}")]
    Safetensors(#[from] safetensors::SafeTensorError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type for transfer operations.
pub type Result<T> = std::result::Result<T, MergeError>;

//! Checkpoint loading and saving.
//!
//! Two input containers are understood:
//!
//! - **safetensors**: a single `.safetensors` file, or a directory of shards.
//!   Files are memory-mapped and tensors are read in file order.
//! - **PyTorch pickle** (`.ckpt`, `.pth`, `.pt`, `.bin`): top-level tensors
//!   are used; when there are none, the `state_dict` entry is read instead.
//!
//! Output is always a single safetensors file, and the output path must say so.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use candle_core::safetensors::Load;
use candle_core::Device;
use safetensors::SafeTensors;
use tracing::{debug, info, warn};

use crate::{MergeError, ParameterStore, Result};

const PICKLE_EXTENSIONS: &[&str] = &["ckpt", "pth", "pt", "bin"];

/// Reads a checkpoint into memory.
pub trait CheckpointLoader {
    /// Load every tensor at `path`.
    fn load(&self, path: &Path) -> Result<ParameterStore>;
}

/// Writes a parameter store to disk.
pub trait CheckpointSaver {
    /// Create or overwrite the checkpoint at `path`.
    fn save(&self, store: &ParameterStore, path: &Path) -> Result<()>;
}

/// Loader for safetensors files and sharded safetensors directories.
#[derive(Debug, Clone, Copy, Default)]
pub struct SafetensorsLoader;

impl SafetensorsLoader {
    /// Create a new loader.
    pub fn new() -> Self {
        Self
    }

    fn shard_files(path: &Path) -> Result<Vec<PathBuf>> {
        let mut safetensor_files = Vec::new();

        if path.is_file() && is_safetensors(path) {
            safetensor_files.push(path.to_path_buf());
        } else if path.is_dir() {
            for entry in std::fs::read_dir(path)? {
                let file_path = entry?.path();
                if is_safetensors(&file_path) {
                    safetensor_files.push(file_path);
                }
            }
        }

        if safetensor_files.is_empty() {
            return Err(MergeError::ModelLoad(format!(
                "No safetensors files found in {:?}",
                path
            )));
        }

        // Sort for deterministic ordering
        safetensor_files.sort();
        Ok(safetensor_files)
    }

    fn load_shard(file_path: &Path, store: &mut ParameterStore) -> Result<()> {
        debug!("Memory-mapping {:?}", file_path);

        let file = std::fs::File::open(file_path)?;
        // SAFETY: The file is opened read-only and the mapping is dropped before
        // this function returns; every tensor is copied out of it.
        #[allow(unsafe_code)]
        let mmap = unsafe { memmap2::Mmap::map(&file)? };

        let tensors = SafeTensors::deserialize(&mmap)?;
        let base_ptr = mmap.as_ptr() as usize;

        // Header order is not file order; recover it from data offsets.
        let mut views = tensors.tensors();
        views.sort_by_key(|(_, view)| view.data().as_ptr() as usize - base_ptr);

        for (name, view) in views {
            let tensor = view.load(&Device::Cpu)?;
            if store.insert(name.clone(), tensor).is_some() {
                warn!("Tensor {} appears in more than one shard, keeping the last", name);
            }
        }

        Ok(())
    }
}

impl CheckpointLoader for SafetensorsLoader {
    fn load(&self, path: &Path) -> Result<ParameterStore> {
        let files = Self::shard_files(path)?;
        info!("Loading {} safetensors files from {:?}", files.len(), path);

        let mut store = ParameterStore::new();
        for file_path in &files {
            Self::load_shard(file_path, &mut store)?;
        }

        info!("Loaded {} tensors", store.len());
        Ok(store)
    }
}

/// Loader for PyTorch pickle checkpoints.
#[derive(Debug, Clone, Copy, Default)]
pub struct PickleLoader;

impl PickleLoader {
    /// Create a new loader.
    pub fn new() -> Self {
        Self
    }
}

impl CheckpointLoader for PickleLoader {
    fn load(&self, path: &Path) -> Result<ParameterStore> {
        info!("Loading PyTorch checkpoint from {:?}", path);

        let load_err = |e: candle_core::Error| MergeError::ModelLoad(format!("{:?}: {}", path, e));

        // Lightning-style checkpoints keep no tensors at the top level and
        // nest them under `state_dict`. Only that case falls through.
        let mut tensors = candle_core::pickle::read_all(path).map_err(load_err)?;
        if tensors.is_empty() {
            debug!("No top-level tensors in {:?}, reading state_dict", path);
            tensors = candle_core::pickle::read_all_with_key(path, Some("state_dict"))
                .map_err(load_err)?;
        }

        let store: ParameterStore = tensors.into_iter().collect();
        info!("Loaded {} tensors", store.len());
        Ok(store)
    }
}

/// Load a checkpoint, choosing the container from the path.
///
/// Directories are treated as sharded safetensors.
pub fn load_checkpoint(path: impl AsRef<Path>) -> Result<ParameterStore> {
    let path = path.as_ref();
    if path.is_dir() || is_safetensors(path) {
        return SafetensorsLoader::new().load(path);
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some(ext) if PICKLE_EXTENSIONS.contains(&ext) => PickleLoader::new().load(path),
        _ => Err(MergeError::ModelLoad(format!(
            "Unrecognized checkpoint format: {:?}",
            path
        ))),
    }
}

/// Writes a single safetensors file, keeping each tensor's dtype.
#[derive(Debug, Clone, Default)]
pub struct SafetensorsSaver {
    metadata: HashMap<String, String>,
}

impl SafetensorsSaver {
    /// Create a saver that tags the file with `format: pt`.
    pub fn new() -> Self {
        Self {
            metadata: HashMap::from([("format".to_string(), "pt".to_string())]),
        }
    }

    /// Add a metadata entry to the file header.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

impl CheckpointSaver for SafetensorsSaver {
    fn save(&self, store: &ParameterStore, path: &Path) -> Result<()> {
        if !is_safetensors(path) {
            return Err(MergeError::OutputFormat(path.to_path_buf()));
        }

        info!("Writing {} tensors to {:?}", store.len(), path);
        let metadata = (!self.metadata.is_empty()).then(|| self.metadata.clone());
        safetensors::serialize_to_file(store.iter(), &metadata, path)?;
        Ok(())
    }
}

pub(crate) fn is_safetensors(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == "safetensors")
}

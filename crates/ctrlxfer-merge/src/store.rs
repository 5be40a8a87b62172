//! In-memory parameter stores.

use std::collections::HashMap;

use candle_core::Tensor;

use crate::{MergeError, Result};

/// Ordered mapping from parameter name to tensor.
///
/// Iteration follows insertion order, which loaders set to checkpoint order.
#[derive(Debug, Clone, Default)]
pub struct ParameterStore {
    names: Vec<String>,
    tensors: HashMap<String, Tensor>,
}

impl ParameterStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store with room for `capacity` tensors.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            names: Vec::with_capacity(capacity),
            tensors: HashMap::with_capacity(capacity),
        }
    }

    /// Insert a tensor. Replacing an existing name keeps its position.
    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) -> Option<Tensor> {
        let name = name.into();
        if !self.tensors.contains_key(&name) {
            self.names.push(name.clone());
        }
        self.tensors.insert(name, tensor)
    }

    /// Look up a tensor.
    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.tensors.get(name)
    }

    /// Look up a tensor that must exist. `store` names the checkpoint's role
    /// in the error.
    pub fn require(&self, name: &str, store: &'static str) -> Result<&Tensor> {
        self.get(name).ok_or_else(|| MergeError::MissingTensor {
            name: name.to_string(),
            store,
        })
    }

    /// Whether the store holds `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.tensors.contains_key(name)
    }

    /// Tensor names in order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Iterate over `(name, tensor)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tensor)> {
        self.names
            .iter()
            .filter_map(|name| self.tensors.get(name).map(|t| (name.as_str(), t)))
    }

    /// Number of tensors.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, Tensor)> for ParameterStore {
    fn from_iter<I: IntoIterator<Item = (S, Tensor)>>(iter: I) -> Self {
        let mut store = Self::new();
        for (name, tensor) in iter {
            store.insert(name, tensor);
        }
        store
    }
}

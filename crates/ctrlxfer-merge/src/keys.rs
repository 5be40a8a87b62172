//! Key classification and namespace remapping.

use crate::KeyPrefixes;

/// Strip `prefix` from `key`.
///
/// Returns the remaining suffix when `key` starts with `prefix` and is
/// strictly longer than it, `None` otherwise.
pub fn classify<'a>(key: &'a str, prefix: &str) -> Option<&'a str> {
    if key.len() <= prefix.len() {
        return None;
    }
    key.strip_prefix(prefix)
}

/// Routing decision for a single key, before consulting the donor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyDecision {
    /// VAE or text-encoder parameter: take the donor's tensor verbatim.
    Substitute,
    /// Look for an offset under `target` in the base and donor checkpoints.
    Remap {
        /// Key in base/donor naming.
        target: String,
    },
}

impl KeyPrefixes {
    /// Decide how `key` is routed.
    pub fn decide(&self, key: &str) -> KeyDecision {
        if classify(key, &self.first_stage).is_some() || classify(key, &self.cond_stage).is_some() {
            return KeyDecision::Substitute;
        }
        KeyDecision::Remap {
            target: self.target_key(key),
        }
    }

    /// Resolve the base/donor key that corresponds to `key`.
    pub fn target_key(&self, key: &str) -> String {
        match classify(key, &self.control) {
            Some(suffix) => format!("{}{}", self.diffusion, suffix),
            None => key.to_string(),
        }
    }
}

use candle_core::Tensor;

use crate::{ParameterStore, Result};

/// Substitution rule: the donor's tensor under the same key, unmodified.
///
/// Used for the VAE and text encoder, which the adapter shares with whatever
/// base model it is paired with. The donor must hold `key`.
pub fn apply_substitute(key: &str, donor: &ParameterStore) -> Result<Tensor> {
    Ok(donor.require(key, "donor")?.clone())
}

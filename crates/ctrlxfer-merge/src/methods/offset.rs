use candle_core::{DType, Tensor};
use tracing::debug;

use crate::{MergeError, ParameterStore, Result};

/// Offset rule: transplant the donor's fine-tuning delta onto an adapter weight.
///
/// Formula: `W_new = W_control + (W_donor - W_base)`, all read under `target`
/// except `W_control`, which is `p`.
///
/// Operands must have broadcast-compatible shapes; this is checked up front
/// so failures name the offending key. Floating-point operands of different
/// precision are promoted to the wider one (`f16 + f32 -> f32`,
/// `f16 + bf16 -> f32`). Any other dtype difference is an error. The base
/// checkpoint must hold `target`.
pub fn apply_offset(
    key: &str,
    target: &str,
    p: &Tensor,
    base: &ParameterStore,
    donor: &ParameterStore,
) -> Result<Tensor> {
    let donor_tensor = donor.require(target, "donor")?;
    let base_tensor = base.require(target, "base")?;

    let (p, donor_tensor) = align_operands(key, target, p, donor_tensor)?;
    let summed = p.broadcast_add(&donor_tensor)?;
    let (summed, base_tensor) = align_operands(key, target, &summed, base_tensor)?;
    Ok(summed.broadcast_sub(&base_tensor)?)
}

/// Common dtype for an elementwise op, if one exists without leaving floats.
fn promote(lhs: DType, rhs: DType) -> Option<DType> {
    if lhs == rhs {
        return Some(lhs);
    }
    if !lhs.is_float() || !rhs.is_float() {
        return None;
    }
    if lhs == DType::F64 || rhs == DType::F64 {
        Some(DType::F64)
    } else {
        // f32 against a half type, or f16 against bf16.
        Some(DType::F32)
    }
}

fn align_operands(key: &str, target: &str, lhs: &Tensor, rhs: &Tensor) -> Result<(Tensor, Tensor)> {
    if lhs
        .shape()
        .broadcast_shape_binary_op(rhs.shape(), "offset")
        .is_err()
    {
        return Err(MergeError::ShapeMismatch {
            name: key.to_string(),
            source_name: target.to_string(),
            lhs: lhs.dims().to_vec(),
            rhs: rhs.dims().to_vec(),
        });
    }

    let dtype = promote(lhs.dtype(), rhs.dtype()).ok_or_else(|| MergeError::DtypeMismatch {
        name: key.to_string(),
        source_name: target.to_string(),
        lhs: lhs.dtype(),
        rhs: rhs.dtype(),
    })?;
    if dtype != lhs.dtype() || dtype != rhs.dtype() {
        debug!(
            "Promoting {:?}/{:?} to {:?} for [{}]",
            lhs.dtype(),
            rhs.dtype(),
            dtype,
            key
        );
    }

    Ok((lhs.to_dtype(dtype)?, rhs.to_dtype(dtype)?))
}

use candle_core::Tensor;

/// Pass-through rule: keep the adapter's tensor.
///
/// Applies to adapter-only parameters (zero convolutions, hint blocks) that
/// have no counterpart in the donor.
pub fn apply_pass_through(p: &Tensor) -> Tensor {
    p.clone()
}

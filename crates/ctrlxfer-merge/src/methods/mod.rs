//! Per-key merge rules.
//!
//! Every key of the control checkpoint is routed to exactly one rule:
//!
//! - **Substitute**: VAE and text-encoder weights are taken from the donor.
//! - **Offset**: the donor's fine-tuning delta is added to the adapter weight.
//! - **PassThrough**: the adapter weight is kept unchanged.
//!
//! Routing ([`plan_key`]) is pure string work; the arithmetic lives in the
//! rule modules.

mod offset;
mod passthrough;
mod substitute;

pub use offset::apply_offset;
pub use passthrough::apply_pass_through;
pub use substitute::apply_substitute;

use candle_core::Tensor;

use crate::{KeyDecision, KeyPrefixes, ParameterStore, Result};

/// The rule selected for a single key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeRule {
    /// Copy the donor tensor stored under the same key.
    Substitute,
    /// `control[key] + donor[target] - base[target]`.
    Offset {
        /// Key in base/donor naming.
        target: String,
    },
    /// Keep `control[key]`; the donor has nothing under `target`.
    PassThrough {
        /// Key in base/donor naming that was looked up.
        target: String,
    },
}

impl MergeRule {
    /// Short label used in logs and reports.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Substitute => "substitute",
            Self::Offset { .. } => "offset",
            Self::PassThrough { .. } => "passthrough",
        }
    }
}

/// Select the rule for `key` given the donor checkpoint's contents.
pub fn plan_key(key: &str, prefixes: &KeyPrefixes, donor: &ParameterStore) -> MergeRule {
    match prefixes.decide(key) {
        KeyDecision::Substitute => MergeRule::Substitute,
        KeyDecision::Remap { target } if donor.contains(&target) => MergeRule::Offset { target },
        KeyDecision::Remap { target } => MergeRule::PassThrough { target },
    }
}

/// Compute the output tensor for `key` under `rule`.
pub fn apply_rule(
    key: &str,
    rule: &MergeRule,
    base: &ParameterStore,
    control: &ParameterStore,
    donor: &ParameterStore,
) -> Result<Tensor> {
    match rule {
        MergeRule::Substitute => apply_substitute(key, donor),
        MergeRule::Offset { target } => {
            let p = control.require(key, "control")?;
            apply_offset(key, target, p, base, donor)
        }
        MergeRule::PassThrough { .. } => {
            let p = control.require(key, "control")?;
            Ok(apply_pass_through(p))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn store(names: &[&str]) -> ParameterStore {
        names
            .iter()
            .map(|n| (*n, Tensor::new(&[0.0_f32], &Device::Cpu).unwrap()))
            .collect()
    }

    #[test]
    fn test_plan_substitute_ignores_donor_contents() {
        let prefixes = KeyPrefixes::default();
        let donor = store(&[]);
        assert_eq!(
            plan_key("first_stage_model.encoder.w", &prefixes, &donor),
            MergeRule::Substitute
        );
    }

    #[test]
    fn test_plan_offset_when_donor_has_target() {
        let prefixes = KeyPrefixes::default();
        let donor = store(&["model.diffusion_model.input_blocks.1.w"]);
        assert_eq!(
            plan_key("control_model.input_blocks.1.w", &prefixes, &donor),
            MergeRule::Offset {
                target: "model.diffusion_model.input_blocks.1.w".to_string()
            }
        );
    }

    #[test]
    fn test_plan_pass_through_when_donor_lacks_target() {
        let prefixes = KeyPrefixes::default();
        let donor = store(&["model.diffusion_model.out.w"]);
        let rule = plan_key("control_model.zero_convs.0.0.weight", &prefixes, &donor);
        assert_eq!(
            rule,
            MergeRule::PassThrough {
                target: "model.diffusion_model.zero_convs.0.0.weight".to_string()
            }
        );
        assert_eq!(rule.name(), "passthrough");
    }

    #[test]
    fn test_plan_unprefixed_key_uses_itself() {
        let prefixes = KeyPrefixes::default();
        let donor = store(&["model.diffusion_model.out.w"]);
        assert_eq!(
            plan_key("model.diffusion_model.out.w", &prefixes, &donor),
            MergeRule::Offset {
                target: "model.diffusion_model.out.w".to_string()
            }
        );
    }
}

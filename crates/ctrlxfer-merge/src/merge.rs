//! Weight transfer orchestration.
//!
//! This module provides the high-level API: check preconditions, load the
//! three checkpoints, route every control key through a [`MergeRule`], and
//! save the result.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::loader::is_safetensors;
use crate::methods::{apply_rule, plan_key, MergeRule};
use crate::{
    load_checkpoint, CheckpointSaver, KeyPrefixes, MergeError, ParameterStore, Result,
    SafetensorsSaver, TransferConfig,
};

/// Per-rule counts for a transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferReport {
    /// Keys copied from the donor.
    pub substituted: usize,
    /// Keys that received the donor's offset.
    pub offset: usize,
    /// Keys kept from the control checkpoint.
    pub passed_through: usize,
}

impl TransferReport {
    /// Count one key routed to `rule`.
    pub fn record(&mut self, rule: &MergeRule) {
        match rule {
            MergeRule::Substitute => self.substituted += 1,
            MergeRule::Offset { .. } => self.offset += 1,
            MergeRule::PassThrough { .. } => self.passed_through += 1,
        }
    }

    /// Total keys processed.
    pub fn total(&self) -> usize {
        self.substituted + self.offset + self.passed_through
    }
}

/// The rule chosen for every control key, in checkpoint order.
#[derive(Debug, Clone, Default)]
pub struct TransferPlan {
    /// `(key, rule)` pairs.
    pub entries: Vec<(String, MergeRule)>,
}

impl TransferPlan {
    /// Summarize the plan.
    pub fn report(&self) -> TransferReport {
        let mut report = TransferReport::default();
        for (_, rule) in &self.entries {
            report.record(rule);
        }
        report
    }
}

/// Result of [`run_transfer`].
#[derive(Debug, Clone)]
pub struct TransferSummary {
    /// Where the output was written. `None` for dry runs.
    pub output_path: Option<PathBuf>,
    /// Per-rule counts.
    pub report: TransferReport,
}

/// Route every key of `control` without touching any tensor data.
pub fn plan_transfer(
    control: &ParameterStore,
    donor: &ParameterStore,
    prefixes: &KeyPrefixes,
) -> TransferPlan {
    let entries = control
        .names()
        .iter()
        .map(|key| (key.clone(), plan_key(key, prefixes, donor)))
        .collect();
    TransferPlan { entries }
}

/// Transplant the donor's fine-tuning onto the control adapter.
///
/// The output holds exactly the keys of `control`, in the same order. The
/// first missing tensor or incompatible operand aborts the whole transfer.
pub fn transfer_weights(
    base: &ParameterStore,
    control: &ParameterStore,
    donor: &ParameterStore,
    prefixes: &KeyPrefixes,
) -> Result<(ParameterStore, TransferReport)> {
    let mut output = ParameterStore::with_capacity(control.len());
    let mut report = TransferReport::default();

    for key in control.names() {
        let rule = plan_key(key, prefixes, donor);
        match &rule {
            MergeRule::Substitute => debug!("{} [{}]", rule.name(), key),
            MergeRule::Offset { target } | MergeRule::PassThrough { target } => {
                debug!("{} [{}] from [{}]", rule.name(), key, target)
            }
        }

        let merged = apply_rule(key, &rule, base, control, donor)?;
        output.insert(key.clone(), merged);
        report.record(&rule);
    }

    info!(
        "Transferred {} tensors: {} substituted, {} offset, {} passed through",
        report.total(),
        report.substituted,
        report.offset,
        report.passed_through
    );
    Ok((output, report))
}

/// Verify that all inputs exist, the output directory is present and the
/// output is named as a safetensors file.
///
/// Nothing is loaded; the first violation is returned.
pub fn check_preconditions(config: &TransferConfig) -> Result<()> {
    let inputs = [
        ("Base model", &config.base_model),
        ("Control model", &config.control_model),
        ("Donor model", &config.donor_model),
    ];
    for (what, path) in inputs {
        if !path.exists() {
            return Err(MergeError::Precondition {
                what,
                path: path.clone(),
            });
        }
    }

    let parent = output_dir(&config.output_path);
    if !parent.is_dir() {
        return Err(MergeError::Precondition {
            what: "Output folder",
            path: parent.to_path_buf(),
        });
    }

    if !is_safetensors(&config.output_path) {
        return Err(MergeError::OutputFormat(config.output_path.clone()));
    }

    Ok(())
}

fn output_dir(output_path: &Path) -> &Path {
    match output_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Main entry point: check, load, transfer, save.
pub fn run_transfer(config: &TransferConfig) -> Result<TransferSummary> {
    check_preconditions(config)?;

    info!("Loading control model: {:?}", config.control_model);
    let control = load_checkpoint(&config.control_model)?;
    info!("Loading donor model: {:?}", config.donor_model);
    let donor = load_checkpoint(&config.donor_model)?;

    if config.dry_run {
        let report = plan_transfer(&control, &donor, &config.prefixes).report();
        info!(
            "Dry run: {} substitute, {} offset, {} passthrough",
            report.substituted, report.offset, report.passed_through
        );
        return Ok(TransferSummary {
            output_path: None,
            report,
        });
    }

    info!("Loading base model: {:?}", config.base_model);
    let base = load_checkpoint(&config.base_model)?;

    let (output, report) = transfer_weights(&base, &control, &donor, &config.prefixes)?;

    SafetensorsSaver::new().save(&output, &config.output_path)?;
    info!("Transferred model saved at {:?}", config.output_path);

    Ok(TransferSummary {
        output_path: Some(config.output_path.clone()),
        report,
    })
}

/// Builder for creating transfer configurations programmatically.
#[derive(Debug, Default)]
pub struct TransferBuilder {
    base_model: Option<PathBuf>,
    control_model: Option<PathBuf>,
    donor_model: Option<PathBuf>,
    output_path: Option<PathBuf>,
    prefixes: KeyPrefixes,
    dry_run: bool,
}

impl TransferBuilder {
    /// Start an empty builder with default prefixes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the unmodified base model.
    pub fn base_model(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_model = Some(path.into());
        self
    }

    /// Set the base-plus-adapter model.
    pub fn control_model(mut self, path: impl Into<PathBuf>) -> Self {
        self.control_model = Some(path.into());
        self
    }

    /// Set the fine-tuned donor model.
    pub fn donor_model(mut self, path: impl Into<PathBuf>) -> Self {
        self.donor_model = Some(path.into());
        self
    }

    /// Set the output file.
    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    /// Override the key namespaces.
    pub fn prefixes(mut self, prefixes: KeyPrefixes) -> Self {
        self.prefixes = prefixes;
        self
    }

    /// Plan only; do not load the base model or write output.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Build the transfer configuration.
    pub fn build(self) -> Result<TransferConfig> {
        fn required(value: Option<PathBuf>, what: &'static str) -> Result<PathBuf> {
            value.ok_or(MergeError::Precondition {
                what,
                path: PathBuf::new(),
            })
        }

        Ok(TransferConfig {
            base_model: required(self.base_model, "Base model")?,
            control_model: required(self.control_model, "Control model")?,
            donor_model: required(self.donor_model, "Donor model")?,
            output_path: required(self.output_path, "Output path")?,
            prefixes: self.prefixes,
            dry_run: self.dry_run,
        })
    }

    /// Build and run the transfer.
    pub fn run(self) -> Result<TransferSummary> {
        let config = self.build()?;
        run_transfer(&config)
    }
}

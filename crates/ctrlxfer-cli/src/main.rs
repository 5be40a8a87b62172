//! ctrlxfer CLI - transfer a control adapter onto a fine-tuned base model.
//!
//! Example:
//!
//! ```text
//! ctrlxfer ./models/v1-5-pruned.ckpt ./models/control_sd15_openpose.pth \
//!     ./models/anything-v3-full.safetensors ./models/control_any3_openpose.safetensors
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use ctrlxfer_merge::{run_transfer, TransferConfig, TransferSummary};

#[derive(Parser, Debug)]
#[command(name = "ctrlxfer")]
#[command(author, version, about = "Transfer model weights with control", long_about = None)]
struct Cli {
    /// Path to the base model weights the adapter was trained against
    base_model: PathBuf,

    /// Path to the base model weights with the control adapter attached
    control_model: PathBuf,

    /// Path to the fine-tuned model weights to transfer onto
    donor_model: PathBuf,

    /// Path to save the transferred model weights; must end in .safetensors.
    /// A bare file name is written to the current directory
    output: PathBuf,

    /// YAML file overriding the key prefixes
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Classify every key and report counts without writing output
    #[arg(long)]
    dry_run: bool,

    /// Log every key as it is transferred
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<TransferConfig> {
        let mut config =
            TransferConfig::new(self.base_model, self.control_model, self.donor_model, self.output);
        config.dry_run = self.dry_run;

        if let Some(path) = self.config {
            config.prefixes = TransferConfig::prefixes_from_yaml(&path)
                .with_context(|| format!("Failed to read prefix config {:?}", path))?;
        }

        Ok(config)
    }
}

fn run(cli: Cli) -> anyhow::Result<TransferSummary> {
    let config = cli.into_config()?;
    run_transfer(&config)
        .with_context(|| format!("Failed to transfer weights into {}", config.output_path.display()))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    let summary = run(cli)?;

    match summary.output_path {
        Some(path) => println!("Transferred model saved at {}", path.display()),
        None => {
            println!("Dry run, nothing written");
            println!("  substitute:  {}", summary.report.substituted);
            println!("  offset:      {}", summary.report.offset);
            println!("  passthrough: {}", summary.report.passed_through);
        }
    }

    Ok(())
}

//! Control-adapter weight transfer.
//!
//! Given three checkpoints:
//!
//! - `base`: the model a control adapter was trained against,
//! - `control`: that model with the adapter attached,
//! - `donor`: a fine-tune of `base`,
//!
//! this crate builds an adapter for `donor` without retraining. VAE and text
//! encoder weights are taken from the donor, every adapter weight that mirrors
//! a base weight receives the donor's fine-tuning offset, and adapter-only
//! weights are kept as they are.
//!
//! # Example
//!
//! ```ignore
//! use ctrlxfer_merge::TransferBuilder;
//!
//! let summary = TransferBuilder::new()
//!     .base_model("models/v1-5-pruned.ckpt")
//!     .control_model("models/control_sd15_openpose.pth")
//!     .donor_model("models/anything-v3-full.safetensors")
//!     .output("models/control_any3_openpose.safetensors")
//!     .run()?;
//! println!("{} tensors written", summary.report.total());
//! ```

#![warn(missing_docs)]

mod config;
mod error;
mod keys;
mod loader;
mod merge;
pub mod methods;
mod store;

pub use config::*;
pub use error::*;
pub use keys::*;
pub use loader::*;
pub use merge::*;
pub use store::*;

/// Re-export merge rules for convenience
pub use methods::{plan_key, MergeRule};

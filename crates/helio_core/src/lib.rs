//! Helio Core - sampling, configuration and output building blocks.
//!
//! This crate provides the parts of the renderer that don't depend on the
//! scene:
//!
//! - **QMC sampling**: scrambled Halton sequences and lattices ([`qmc`])
//! - **Options**: typed, string keyed render settings with defaults
//! - **Plugins**: name to factory registries for pluggable strategies
//! - **Task monitor**: progress and cooperative cancellation
//! - **Displays**, **filters** and **bucket orders** used by the bucket renderer
//! - **Mesh**: indexed triangle data
//!
//! # Example
//!
//! ```ignore
//! use helio_core::{qmc, Options};
//!
//! let options = Options::from_json(r#"{"aa.min": 0, "aa.max": 2}"#)?;
//! let jitter = qmc::halton(0, 3); // 0.75
//! ```

pub mod bucket_order;
pub mod display;
pub mod filter;
pub mod mesh;
pub mod options;
pub mod plugin;
pub mod qmc;
pub mod task;

// Re-export commonly used types
pub use bucket_order::{bucket_order_registry, create_bucket_order, BucketOrder};
pub use display::{Display, DisplayError, ImageBuffer, ImageDisplay};
pub use filter::{filter_registry, Filter};
pub use mesh::Mesh;
pub use options::{OptionValue, Options, OptionsError};
pub use plugin::{Factory, PluginRegistry};
pub use task::TaskMonitor;

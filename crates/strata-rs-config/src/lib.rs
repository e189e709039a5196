//! Hierarchical configuration loading with includes and layered overrides.
//!
//! This crate owns the config tree model, the `include`-aware document
//! loader, the deep-merge rules, and the override layering that persists
//! audit snapshots.

mod error;
pub mod jobs;
mod loader;
mod overrides;
pub mod paths;
pub mod storage;
mod value;

/// Public error type returned by loading and override APIs.
pub use error::ConfigError;
/// Worker-count derivation.
pub use jobs::{CpuTopology, FixedTopology, HostTopology, derive_jobs};
/// Document loader and the shared deep-merge primitive.
pub use loader::merge::merge;
pub use loader::{ConfigLoader, DEFAULT_INCLUDE_KEY, LoaderOptions};
/// Override layering and snapshot persistence.
pub use overrides::{
    ConfigMerger, DEFAULT_SNAPSHOT_DIR, EFFECTIVE_SNAPSHOT_FILE, MergerOptions,
    OVERRIDE_SNAPSHOT_FILE, OverrideSpec, Resolution,
};
/// Reference helpers and collaborators.
pub use paths::{CwdResolver, PathResolver, is_uri, to_absolute_path};
pub use storage::{ConfigStorage, FileStorage, MemoryStorage};
/// Config tree values.
pub use value::{ConfigValue, Mapping, Scalar};

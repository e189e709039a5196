//! Public surface for Strata.
//!
//! This crate re-exports the config library and provides the helpers the
//! `strata` binary uses, so embedders resolve configs the same way.

/// Re-export for convenience.
pub use strata_rs_config as config;

use anyhow::{Context, Result};
use strata_rs_config::{ConfigMerger, Mapping, OverrideSpec, Resolution};

#[inline]
/// Initialize logging using env_logger if the "logging" feature is enabled.
///
/// This is a no-op if the feature is not enabled. Binaries are still expected
/// to call this early in startup to ensure log output is wired up.
pub fn init_logging() {
    #[cfg(feature = "logging")]
    {
        let _ = env_logger::builder()
            .format_timestamp_millis()
            .parse_default_env()
            .try_init();
    }
}

/// Everything an embedding caller supplies for one resolution.
#[derive(Debug, Clone, Default)]
pub struct ResolveRequest {
    /// Base document; an empty mapping is used when unset.
    pub base: Option<String>,
    /// Optional user document layered over the base.
    pub user_conf: Option<String>,
    /// Explicit `key=value` overrides.
    pub assignments: Vec<String>,
    /// Directory receiving snapshots.
    pub output_dir: String,
}

/// Load the base document, then layer the requested overrides over it.
pub fn resolve(merger: &ConfigMerger, request: &ResolveRequest) -> Result<Resolution> {
    let base = match request.base.as_deref() {
        Some(path) => merger
            .loader()
            .load(path, None)
            .with_context(|| format!("failed to load base config {path}"))?,
        None => Mapping::new(),
    };
    let mut spec =
        OverrideSpec::from_assignments(&request.assignments).context("invalid override")?;
    if let Some(path) = request.user_conf.as_deref() {
        spec = spec.with_user_conf(path);
    }
    merger
        .resolve(&base, &spec, &request.output_dir)
        .context("failed to resolve config")
}

/// Render a resolved config as YAML.
pub fn render(config: &Mapping) -> Result<String> {
    serde_yaml::to_string(config).context("failed to render config")
}

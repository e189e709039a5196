//! Override layering and snapshot persistence.
//!
//! A resolved base config is layered with an optional user document and
//! explicit key overrides. The user document is persisted as loaded, and the
//! final effective config is persisted after merging and worker-count
//! normalization, so a run can be audited and reproduced later.

use crate::jobs::{self, CpuTopology, DEFAULT_JOBS_KEY, HostTopology};
use crate::loader::merge::{merge, merge_into};
use crate::paths::is_uri;
use crate::{ConfigError, ConfigLoader, ConfigValue, Mapping};
use log::{debug, info};
use std::path::Path;
use std::sync::Arc;

/// Directory, under the output dir, receiving snapshots.
pub const DEFAULT_SNAPSHOT_DIR: &str = ".strata";
/// Snapshot of the user document before explicit overrides.
pub const OVERRIDE_SNAPSHOT_FILE: &str = "override_orig.yaml";
/// Snapshot of the final effective config.
pub const EFFECTIVE_SNAPSHOT_FILE: &str = "effective.yaml";

/// Override material supplied by the caller, outranking the base config.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverrideSpec {
    /// Optional user document, loaded with include expansion.
    pub user_conf: Option<String>,
    /// Explicit overrides in nested form; these win over `user_conf`.
    pub overrides: Mapping,
}

impl OverrideSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a spec from `key=value` assignments.
    pub fn from_assignments<I, S>(assignments: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut spec = Self::new();
        for assignment in assignments {
            spec.push_assignment(assignment.as_ref())?;
        }
        Ok(spec)
    }

    pub fn with_user_conf(mut self, path: impl Into<String>) -> Self {
        self.user_conf = Some(path.into());
        self
    }

    /// Set a dotted key such as `d.d2` to `value`.
    pub fn with_override(
        mut self,
        key: &str,
        value: impl Into<ConfigValue>,
    ) -> Result<Self, ConfigError> {
        self.set(key, value.into())?;
        Ok(self)
    }

    /// Deep-merge a nested override mapping into the explicit overrides.
    pub fn with_overrides(mut self, overrides: Mapping) -> Self {
        merge_into(&mut self.overrides, &overrides);
        self
    }

    /// Parse and apply an assignment like `+d.d2=3`.
    ///
    /// A leading `+` or `++` is accepted and ignored. The value is read as a
    /// YAML flow value, so `3` is an integer and `[1, 2]` a sequence; an empty
    /// value is `null`.
    pub fn push_assignment(&mut self, assignment: &str) -> Result<(), ConfigError> {
        let (key, value) = parse_assignment(assignment)?;
        self.set(&key, value)
    }

    pub fn is_empty(&self) -> bool {
        self.user_conf.is_none() && self.overrides.is_empty()
    }

    fn set(&mut self, key: &str, value: ConfigValue) -> Result<(), ConfigError> {
        let nested = dotted_to_mapping(key, value)?;
        merge_into(&mut self.overrides, &nested);
        Ok(())
    }
}

fn parse_assignment(assignment: &str) -> Result<(String, ConfigValue), ConfigError> {
    let trimmed = assignment
        .strip_prefix("++")
        .or_else(|| assignment.strip_prefix('+'))
        .unwrap_or(assignment);
    let (key, raw) = trimmed.split_once('=').ok_or_else(|| {
        ConfigError::Override(format!("expected key=value, got `{assignment}`"))
    })?;
    let value = if raw.trim().is_empty() {
        ConfigValue::null()
    } else {
        serde_yaml::from_str::<ConfigValue>(raw).unwrap_or_else(|_| ConfigValue::from(raw))
    };
    Ok((key.trim().to_string(), value))
}

/// Expand `a.b.c` into `{a: {b: {c: value}}}`.
fn dotted_to_mapping(key: &str, value: ConfigValue) -> Result<Mapping, ConfigError> {
    let segments: Vec<&str> = key.split('.').collect();
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(ConfigError::Override(format!("invalid key `{key}`")));
    }
    let mut current = value;
    for segment in segments.iter().rev() {
        let mut map = Mapping::new();
        map.insert(*segment, current);
        current = ConfigValue::Mapping(map);
    }
    match current {
        ConfigValue::Mapping(map) => Ok(map),
        _ => Err(ConfigError::Override(format!("invalid key `{key}`"))),
    }
}

/// Options controlling snapshot layout and normalization.
#[derive(Debug, Clone)]
pub struct MergerOptions {
    /// Directory under the output dir receiving snapshots.
    pub snapshot_dir: String,
    /// File name of the pre-override user document snapshot.
    pub override_snapshot_name: String,
    /// File name of the effective config snapshot.
    pub effective_snapshot_name: String,
    /// Worker-count key to normalize; `None` disables normalization.
    pub jobs_key: Option<String>,
}

impl Default for MergerOptions {
    fn default() -> Self {
        Self {
            snapshot_dir: DEFAULT_SNAPSHOT_DIR.to_string(),
            override_snapshot_name: OVERRIDE_SNAPSHOT_FILE.to_string(),
            effective_snapshot_name: EFFECTIVE_SNAPSHOT_FILE.to_string(),
            jobs_key: Some(DEFAULT_JOBS_KEY.to_string()),
        }
    }
}

impl MergerOptions {
    pub fn with_snapshot_dir(mut self, dir: impl Into<String>) -> Self {
        self.snapshot_dir = dir.into();
        self
    }

    pub fn with_jobs_key(mut self, key: impl Into<String>) -> Self {
        self.jobs_key = Some(key.into());
        self
    }

    pub fn without_jobs_normalization(mut self) -> Self {
        self.jobs_key = None;
        self
    }
}

/// Outcome of layering overrides over a base config.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Final effective config.
    pub config: Mapping,
    /// User document as loaded, before explicit overrides.
    pub override_snapshot: Option<Mapping>,
    /// Snapshot paths written, in order.
    pub written: Vec<String>,
}

/// Layers override material over resolved configs and persists snapshots.
#[derive(Clone)]
pub struct ConfigMerger {
    loader: ConfigLoader,
    topology: Arc<dyn CpuTopology>,
    options: MergerOptions,
}

impl ConfigMerger {
    pub fn new(loader: ConfigLoader) -> Self {
        Self {
            loader,
            topology: Arc::new(HostTopology),
            options: MergerOptions::default(),
        }
    }

    pub fn with_topology(mut self, topology: Arc<dyn CpuTopology>) -> Self {
        self.topology = topology;
        self
    }

    pub fn with_options(mut self, options: MergerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn loader(&self) -> &ConfigLoader {
        &self.loader
    }

    /// Layer `spec` over `base`, writing snapshots under `output_dir`.
    ///
    /// With an empty spec nothing is written and the base is returned with
    /// only its worker count normalized. Under default options that means a
    /// base without the worker-count key gains one; use
    /// [`MergerOptions::without_jobs_normalization`] to get the base back
    /// untouched.
    pub fn resolve(
        &self,
        base: &Mapping,
        spec: &OverrideSpec,
        output_dir: &str,
    ) -> Result<Resolution, ConfigError> {
        if spec.is_empty() {
            debug!("no overrides supplied; skipping snapshots");
            let mut config = base.clone();
            self.normalize(&mut config);
            return Ok(Resolution {
                config,
                override_snapshot: None,
                written: Vec::new(),
            });
        }

        let mut written = Vec::new();
        let user_conf = match spec.user_conf.as_deref() {
            Some(path) => {
                let user_conf = self.loader.load(path, None)?;
                let target = self.snapshot_path(output_dir, &self.options.override_snapshot_name);
                self.persist(&target, &user_conf)?;
                written.push(target);
                Some(user_conf)
            }
            None => None,
        };

        let mut layered = user_conf.clone().unwrap_or_default();
        merge_into(&mut layered, &spec.overrides);
        let mut config = merge(base, &layered);
        self.normalize(&mut config);

        let target = self.snapshot_path(output_dir, &self.options.effective_snapshot_name);
        self.persist(&target, &config)?;
        written.push(target);

        info!(
            "overrides applied (user_conf_set={}, explicit_keys={}, snapshots={})",
            user_conf.is_some(),
            spec.overrides.len(),
            written.len()
        );
        Ok(Resolution {
            config,
            override_snapshot: user_conf,
            written,
        })
    }

    /// Load a document and normalize it without any overrides.
    pub fn load_normalized(&self, path: &str) -> Result<Mapping, ConfigError> {
        let mut config = self.loader.load(path, None)?;
        self.normalize(&mut config);
        Ok(config)
    }

    fn normalize(&self, config: &mut Mapping) {
        if let Some(key) = self.options.jobs_key.as_deref() {
            jobs::normalize_jobs(config, key, self.topology.as_ref());
        }
    }

    fn snapshot_path(&self, output_dir: &str, name: &str) -> String {
        if is_uri(output_dir) {
            let dir = output_dir.trim_end_matches('/');
            return format!("{dir}/{}/{name}", self.options.snapshot_dir);
        }
        Path::new(output_dir)
            .join(&self.options.snapshot_dir)
            .join(name)
            .to_string_lossy()
            .into_owned()
    }

    fn persist(&self, target: &str, config: &Mapping) -> Result<(), ConfigError> {
        let rendered =
            serde_yaml::to_string(config).map_err(|err| ConfigError::Serialize(err.to_string()))?;
        self.loader.storage().write(target, rendered.as_bytes())?;
        info!("snapshot written: {}", target);
        Ok(())
    }
}

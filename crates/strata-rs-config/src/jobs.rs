//! Worker-count derivation for the parallelism setting.

use crate::{ConfigValue, Mapping, Scalar};
use log::{debug, warn};

/// Key normalized after all merging unless configured otherwise.
pub const DEFAULT_JOBS_KEY: &str = "n_jobs";

/// Source of CPU counts used to derive worker counts.
pub trait CpuTopology: Send + Sync {
    fn physical_cores(&self) -> usize;
    fn logical_cores(&self) -> usize;
}

/// CPU counts of the machine the process runs on.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostTopology;

impl CpuTopology for HostTopology {
    fn physical_cores(&self) -> usize {
        num_cpus::get_physical()
    }

    fn logical_cores(&self) -> usize {
        num_cpus::get()
    }
}

/// Fixed CPU counts, for reproducible resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedTopology {
    pub physical: usize,
    pub logical: usize,
}

impl CpuTopology for FixedTopology {
    fn physical_cores(&self) -> usize {
        self.physical
    }

    fn logical_cores(&self) -> usize {
        self.logical
    }
}

/// Derive the effective worker count from a raw setting.
///
/// `None` uses every physical core, a negative `n` uses
/// `logical + 1 + n` cores (so `-1` is every logical core), `0` runs
/// serially, and a positive count is kept. The result is never below 1.
pub fn derive_jobs(raw: Option<i64>, topology: &dyn CpuTopology) -> usize {
    match raw {
        None => topology.physical_cores().max(1),
        Some(n) if n < 0 => {
            let logical = i64::try_from(topology.logical_cores()).unwrap_or(i64::MAX);
            usize::try_from(logical.saturating_add(1).saturating_add(n).max(1)).unwrap_or(1)
        }
        Some(0) => 1,
        Some(n) => usize::try_from(n).unwrap_or(usize::MAX),
    }
}

/// Replace `key` in `config` with its derived worker count.
///
/// An absent key or `null` counts as unset. Non-integer values are left as
/// they are.
pub fn normalize_jobs(config: &mut Mapping, key: &str, topology: &dyn CpuTopology) {
    let raw = match config.get(key) {
        None | Some(ConfigValue::Scalar(Scalar::Null)) => None,
        Some(ConfigValue::Scalar(Scalar::Integer(n))) => Some(*n),
        Some(other) => {
            warn!(
                "leaving non-integer worker count untouched (key={}, kind={})",
                key,
                other.kind()
            );
            return;
        }
    };
    let jobs = derive_jobs(raw, topology);
    debug!("derived worker count (key={}, raw={:?}, jobs={})", key, raw, jobs);
    config.insert(key, ConfigValue::from(i64::try_from(jobs).unwrap_or(i64::MAX)));
}

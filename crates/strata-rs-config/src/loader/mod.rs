//! Document loader with recursive `include` expansion.
//!
//! A document is read through a [`ConfigStorage`], parsed into top-level
//! entries, and walked in declaration order. Plain keys accumulate into a
//! pending block; every `include` entry first flushes that block, then merges
//! each referenced document on top. Anything textually later therefore wins
//! over anything textually earlier, whether it came from a plain key or an
//! include.

mod layer_io;
pub(crate) mod merge;
mod utils;


use crate::paths::{CwdResolver, PathResolver};
use crate::storage::{ConfigStorage, FileStorage};
use crate::{ConfigError, ConfigValue, Mapping, Scalar};
use log::{debug, info};
use std::sync::Arc;

/// Reserved key holding the list of documents to include.
pub const DEFAULT_INCLUDE_KEY: &str = "include";

/// Options controlling how documents are expanded.
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    /// Reserved key treated as an include directive.
    pub include_key: String,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            include_key: DEFAULT_INCLUDE_KEY.to_string(),
        }
    }
}

impl LoaderOptions {
    /// Use a different reserved key for include directives.
    pub fn with_include_key(mut self, key: impl Into<String>) -> Self {
        self.include_key = key.into();
        self
    }
}

/// Loads documents and resolves their includes into a single mapping.
#[derive(Clone)]
pub struct ConfigLoader {
    storage: Arc<dyn ConfigStorage>,
    resolver: Arc<dyn PathResolver>,
    options: LoaderOptions,
}

impl ConfigLoader {
    /// Create a loader over explicit storage and path collaborators.
    pub fn new(storage: Arc<dyn ConfigStorage>, resolver: Arc<dyn PathResolver>) -> Self {
        Self {
            storage,
            resolver,
            options: LoaderOptions::default(),
        }
    }

    /// Loader over the local filesystem, anchored at the current directory.
    pub fn from_current_dir() -> Result<Self, ConfigError> {
        let resolver = CwdResolver::from_current_dir()?;
        debug!("loader anchored at {}", resolver.base().display());
        Ok(Self::new(Arc::new(FileStorage), Arc::new(resolver)))
    }

    pub fn with_options(mut self, options: LoaderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    /// Storage backing this loader; snapshots are written through it too.
    pub fn storage(&self) -> &Arc<dyn ConfigStorage> {
        &self.storage
    }

    pub fn resolver(&self) -> &Arc<dyn PathResolver> {
        &self.resolver
    }

    /// Load `path` and expand all of its includes.
    ///
    /// When `relative_to` is a non-empty reference, a relative `path` is
    /// resolved against the directory containing it.
    pub fn load(&self, path: &str, relative_to: Option<&str>) -> Result<Mapping, ConfigError> {
        info!("loading config from path: {}", path);
        let mut stack = Vec::new();
        let resolved = self.load_nested(path, relative_to, &mut stack)?;
        debug!("config resolved (path={}, keys={})", path, resolved.len());
        Ok(resolved)
    }

    fn load_nested(
        &self,
        path: &str,
        relative_to: Option<&str>,
        stack: &mut Vec<String>,
    ) -> Result<Mapping, ConfigError> {
        let reference = utils::resolve_reference(path, relative_to, self.resolver.as_ref());
        if stack.contains(&reference) {
            let mut chain = stack.clone();
            chain.push(reference);
            return Err(ConfigError::Cycle { chain });
        }
        let document = layer_io::read_document(self.storage.as_ref(), &reference)?;
        stack.push(reference.clone());
        let result = self.expand(document, &reference, stack);
        stack.pop();
        result
    }

    /// Walk top-level entries in order, flushing pending keys at each include.
    fn expand(
        &self,
        document: layer_io::RawDocument,
        reference: &str,
        stack: &mut Vec<String>,
    ) -> Result<Mapping, ConfigError> {
        let entries = fold_repeated_keys(document.entries, &self.options.include_key);

        let mut resolved = Mapping::new();
        let mut pending = Mapping::new();
        for (key, value) in entries {
            if key != self.options.include_key {
                pending.insert(key, value);
                continue;
            }
            resolved = merge::merge(&resolved, &pending);
            pending = Mapping::new();
            for include in include_references(&value, reference, &key)? {
                debug!("including document (from={}, include={})", reference, include);
                let included = self.load_nested(&include, Some(reference), stack)?;
                resolved = merge::merge(&resolved, &included);
            }
        }
        Ok(merge::merge(&resolved, &pending))
    }
}

/// Collapse repeated plain keys to their last value at their first position.
///
/// Include entries are positional directives and are all kept.
fn fold_repeated_keys(
    entries: Vec<(String, ConfigValue)>,
    include_key: &str,
) -> Vec<(String, ConfigValue)> {
    let mut folded: Vec<(String, ConfigValue)> = Vec::with_capacity(entries.len());
    for (key, value) in entries {
        if key != include_key {
            if let Some(slot) = folded.iter_mut().find(|(existing, _)| *existing == key) {
                slot.1 = value;
                continue;
            }
        }
        folded.push((key, value));
    }
    folded
}

/// Read an include value as an ordered list of references.
fn include_references(
    value: &ConfigValue,
    path: &str,
    key: &str,
) -> Result<Vec<String>, ConfigError> {
    let invalid = |found: &str| ConfigError::Format {
        path: path.to_string(),
        message: format!("`{key}` must be a list of document references, found {found}"),
    };
    match value {
        ConfigValue::Scalar(Scalar::Null) => Ok(Vec::new()),
        ConfigValue::Scalar(Scalar::String(reference)) => Ok(vec![reference.clone()]),
        ConfigValue::Sequence(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| invalid(&format!("a {} entry", item.kind())))
            })
            .collect(),
        other => Err(invalid(other.kind())),
    }
}

//! Reference classification and absolutization.

use crate::ConfigError;
use std::path::{Component, Path, PathBuf};

/// Turns a document reference into its canonical absolute form.
pub trait PathResolver: Send + Sync {
    /// Return the absolute form of `path`.
    ///
    /// URI references and empty strings must be returned unchanged.
    fn to_absolute(&self, path: &str) -> String;
}

/// Resolves relative paths against a fixed base directory.
///
/// The base is usually the working directory the caller started in, so
/// relative references stay stable even if the process later changes
/// directory.
#[derive(Debug, Clone)]
pub struct CwdResolver {
    base: PathBuf,
}

impl CwdResolver {
    pub fn new(base: impl AsRef<Path>) -> Self {
        Self {
            base: normalize_lexically(base.as_ref()),
        }
    }

    /// Resolver anchored at the current process working directory.
    pub fn from_current_dir() -> Result<Self, ConfigError> {
        Ok(Self::new(std::env::current_dir()?))
    }

    pub fn base(&self) -> &Path {
        &self.base
    }
}

impl PathResolver for CwdResolver {
    fn to_absolute(&self, path: &str) -> String {
        if path.is_empty() || is_uri(path) {
            return path.to_string();
        }
        let candidate = Path::new(path);
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.base.join(candidate)
        };
        let normalized = normalize_lexically(&joined);
        // Existing documents resolve to their real location; missing ones stay lexical.
        match std::fs::canonicalize(&normalized) {
            Ok(canonical) => canonical.to_string_lossy().into_owned(),
            Err(_) => normalized.to_string_lossy().into_owned(),
        }
    }
}

/// Whether a reference is an opaque URI such as `s3://bucket/a.yaml`.
///
/// A reference is a URI when it contains `:` before its first path separator.
pub fn is_uri(path: &str) -> bool {
    let Some(colon) = path.find(':') else {
        return false;
    };
    match path.find(['/', '\\']) {
        Some(separator) => colon < separator,
        None => true,
    }
}

/// Absolutize a reference against the current working directory.
pub fn to_absolute_path(path: &str) -> Result<String, ConfigError> {
    if path.is_empty() || is_uri(path) {
        return Ok(path.to_string());
    }
    Ok(CwdResolver::from_current_dir()?.to_absolute(path))
}

/// Drop `.` components and fold `..` into their parent without touching disk.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

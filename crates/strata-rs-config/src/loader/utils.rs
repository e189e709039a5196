//! Helper utilities for include reference resolution.

use crate::paths::{PathResolver, is_uri};
use std::path::{Path, PathBuf};

/// Resolve a document reference, sibling-relative to its includer if any.
///
/// URI references are returned verbatim. Relative filesystem references are
/// joined onto the directory containing `relative_to` before absolutization.
pub(super) fn resolve_reference(
    path: &str,
    relative_to: Option<&str>,
    resolver: &dyn PathResolver,
) -> String {
    if is_uri(path) {
        return path.to_string();
    }
    let joined = match relative_to.filter(|base| !base.is_empty()) {
        Some(base) if !Path::new(path).is_absolute() => join_sibling(base, path),
        _ => path.to_string(),
    };
    if is_uri(&joined) {
        joined
    } else {
        resolver.to_absolute(&joined)
    }
}

/// Join `path` onto the parent of `base`.
fn join_sibling(base: &str, path: &str) -> String {
    if is_uri(base) {
        return match base.rfind('/') {
            Some(idx) => format!("{}/{}", &base[..idx], path),
            None => path.to_string(),
        };
    }
    Path::new(base)
        .parent()
        .map(|parent| parent.join(path))
        .unwrap_or_else(|| PathBuf::from(path))
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::CwdResolver;
    use pretty_assertions::assert_eq;

    #[cfg(unix)]
    #[test]
    fn relative_include_is_sibling_of_includer() {
        let resolver = CwdResolver::new("/cwd");
        assert_eq!(
            resolve_reference("base.yaml", Some("/conf/app/main.yaml"), &resolver),
            "/conf/app/base.yaml"
        );
        assert_eq!(
            resolve_reference("../base.yaml", Some("/conf/app/main.yaml"), &resolver),
            "/conf/base.yaml"
        );
    }

    #[cfg(unix)]
    #[test]
    fn top_level_reference_uses_resolver() {
        let resolver = CwdResolver::new("/cwd");
        assert_eq!(resolve_reference("a.yaml", None, &resolver), "/cwd/a.yaml");
        assert_eq!(resolve_reference("a.yaml", Some(""), &resolver), "/cwd/a.yaml");
        assert_eq!(
            resolve_reference("/abs/a.yaml", Some("/conf/main.yaml"), &resolver),
            "/abs/a.yaml"
        );
    }

    #[test]
    fn uri_includer_resolves_by_string_parent() {
        let resolver = CwdResolver::new("/cwd");
        assert_eq!(
            resolve_reference("b.yaml", Some("s3://bucket/conf/a.yaml"), &resolver),
            "s3://bucket/conf/b.yaml"
        );
        assert_eq!(
            resolve_reference("https://x/c.yaml", Some("/conf/a.yaml"), &resolver),
            "https://x/c.yaml"
        );
    }
}

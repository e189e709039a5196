//! IO helpers for reading and parsing a single config document.

use crate::storage::ConfigStorage;
use crate::value::key_to_string;
use crate::{ConfigError, ConfigValue, Mapping};
use log::debug;
use serde::Deserialize;
use serde::de::{self, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use std::fmt;

/// Serialization formats understood by the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum DocumentFormat {
    Yaml,
    Json,
    Json5,
}

impl DocumentFormat {
    /// Pick a format from the reference's extension, defaulting to YAML.
    pub(super) fn from_reference(path: &str) -> Self {
        let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
        let ext = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "json" => Self::Json,
            "json5" => Self::Json5,
            _ => Self::Yaml,
        }
    }
}

/// Top-level entries of a document in declaration order.
///
/// Unlike [`crate::Mapping`], repeated keys are kept so the loader can decide
/// how each occurrence is treated.
#[derive(Debug)]
pub(super) struct RawDocument {
    pub(super) entries: Vec<(String, ConfigValue)>,
}

/// Read a document from storage and parse its top-level entries.
pub(super) fn read_document(
    storage: &dyn ConfigStorage,
    path: &str,
) -> Result<RawDocument, ConfigError> {
    if !storage.exists(path) {
        return Err(ConfigError::NotFound {
            path: path.to_string(),
        });
    }
    let bytes = storage.read(path).map_err(|err| {
        debug!("document unreadable (path={}, error={})", path, err);
        ConfigError::NotFound {
            path: path.to_string(),
        }
    })?;
    let format = DocumentFormat::from_reference(path);
    debug!(
        "parsing document (path={}, format={:?}, bytes={})",
        path,
        format,
        bytes.len()
    );
    parse_document(&bytes, format, path)
}

/// Parse raw bytes into top-level entries, rejecting non-mapping roots.
pub(super) fn parse_document(
    bytes: &[u8],
    format: DocumentFormat,
    path: &str,
) -> Result<RawDocument, ConfigError> {
    let parse_err = |message: String| ConfigError::Parse {
        path: path.to_string(),
        message,
    };
    let text = std::str::from_utf8(bytes).map_err(|err| parse_err(err.to_string()))?;
    let root = if text.trim().is_empty() {
        Root::Other("empty document")
    } else {
        match format {
            DocumentFormat::Yaml => {
                serde_yaml::from_str::<Root>(text).map_err(|err| parse_err(err.to_string()))?
            }
            DocumentFormat::Json => {
                serde_json::from_str::<Root>(text).map_err(|err| parse_err(err.to_string()))?
            }
            DocumentFormat::Json5 => {
                json5::from_str::<Root>(text).map_err(|err| parse_err(err.to_string()))?
            }
        }
    };
    match root {
        Root::Mapping(entries) if format == DocumentFormat::Yaml => {
            let entries = expand_merge_keys(entries).map_err(parse_err)?;
            Ok(RawDocument { entries })
        }
        Root::Mapping(entries) => Ok(RawDocument { entries }),
        Root::Other(kind) => Err(ConfigError::Format {
            path: path.to_string(),
            message: format!("document root must be a mapping, found {kind}"),
        }),
    }
}

/// YAML merge key, as in `<<: *defaults`.
const MERGE_KEY: &str = "<<";

/// Apply YAML merge keys across a document's top-level entries.
///
/// Keys written in a mapping win over merged ones. With a list of merge
/// sources, earlier sources win over later ones.
fn expand_merge_keys(
    entries: Vec<(String, ConfigValue)>,
) -> Result<Vec<(String, ConfigValue)>, String> {
    let mut out = Vec::with_capacity(entries.len());
    let mut sources = Vec::new();
    for (key, mut value) in entries {
        expand_value(&mut value)?;
        if key == MERGE_KEY {
            sources.extend(merge_sources(value)?);
        } else {
            out.push((key, value));
        }
    }
    for source in sources {
        for (key, value) in source {
            if !out.iter().any(|(existing, _)| *existing == key) {
                out.push((key, value));
            }
        }
    }
    Ok(out)
}

fn expand_value(value: &mut ConfigValue) -> Result<(), String> {
    match value {
        ConfigValue::Mapping(map) => {
            let entries = std::mem::take(map);
            let mut sources = Vec::new();
            for (key, mut nested) in entries {
                expand_value(&mut nested)?;
                if key == MERGE_KEY {
                    sources.extend(merge_sources(nested)?);
                } else {
                    map.insert(key, nested);
                }
            }
            for source in sources {
                for (key, nested) in source {
                    if !map.contains_key(&key) {
                        map.insert(key, nested);
                    }
                }
            }
            Ok(())
        }
        ConfigValue::Sequence(items) => items.iter_mut().try_for_each(expand_value),
        ConfigValue::Scalar(_) => Ok(()),
    }
}

/// Mappings named by a merge key, in precedence order.
fn merge_sources(value: ConfigValue) -> Result<Vec<Mapping>, String> {
    let invalid = |found: &str| {
        format!("merge key `{MERGE_KEY}` expects a mapping or a list of mappings, found {found}")
    };
    match value {
        ConfigValue::Mapping(map) => Ok(vec![map]),
        ConfigValue::Sequence(items) => items
            .into_iter()
            .map(|item| match item {
                ConfigValue::Mapping(map) => Ok(map),
                other => Err(invalid(&format!("a {} entry", other.kind()))),
            })
            .collect(),
        other => Err(invalid(other.kind())),
    }
}

/// Document root as seen by the parser.
enum Root {
    Mapping(Vec<(String, ConfigValue)>),
    Other(&'static str),
}

impl<'de> Deserialize<'de> for Root {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(RootVisitor)
    }
}

struct RootVisitor;

impl<'de> Visitor<'de> for RootVisitor {
    type Value = Root;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a configuration document")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Root, A::Error> {
        let mut entries = Vec::new();
        while let Some(key) = access.next_key::<ConfigValue>()? {
            let key = key_to_string::<A::Error>(key)?;
            let value = access.next_value::<ConfigValue>()?;
            entries.push((key, value));
        }
        Ok(Root::Mapping(entries))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Root, A::Error> {
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(Root::Other("sequence"))
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Root, D::Error> {
        Root::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, _: bool) -> Result<Root, E> {
        Ok(Root::Other("bool"))
    }

    fn visit_i64<E: de::Error>(self, _: i64) -> Result<Root, E> {
        Ok(Root::Other("integer"))
    }

    fn visit_u64<E: de::Error>(self, _: u64) -> Result<Root, E> {
        Ok(Root::Other("integer"))
    }

    fn visit_f64<E: de::Error>(self, _: f64) -> Result<Root, E> {
        Ok(Root::Other("float"))
    }

    fn visit_str<E: de::Error>(self, _: &str) -> Result<Root, E> {
        Ok(Root::Other("string"))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Root, E> {
        Ok(Root::Other("null"))
    }

    fn visit_none<E: de::Error>(self) -> Result<Root, E> {
        Ok(Root::Other("null"))
    }
}

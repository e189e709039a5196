//! Deep-merge helpers shared by include expansion and override layering.

use crate::{ConfigValue, Mapping};

/// Merge `overlay` on top of `base`, returning a new mapping.
///
/// Mappings present on both sides merge key-by-key; any other overlay value
/// replaces the base value wholesale, sequences included. Shared and
/// base-only keys keep the base order; overlay-only keys follow.
pub fn merge(base: &Mapping, overlay: &Mapping) -> Mapping {
    let mut merged = base.clone();
    merge_into(&mut merged, overlay);
    merged
}

/// In-place form of [`merge`] for mappings the caller already owns.
pub(crate) fn merge_into(base: &mut Mapping, overlay: &Mapping) {
    for (key, value) in overlay.iter() {
        match base.get_mut(key) {
            Some(existing) => merge_values(existing, value),
            None => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

fn merge_values(base: &mut ConfigValue, overlay: &ConfigValue) {
    match (base, overlay) {
        (ConfigValue::Mapping(base_map), ConfigValue::Mapping(overlay_map)) => {
            merge_into(base_map, overlay_map);
        }
        (base_slot, overlay_value) => {
            *base_slot = overlay_value.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn yaml(contents: &str) -> Mapping {
        serde_yaml::from_str(contents).expect("yaml")
    }

    #[test]
    fn sequences_are_replaced_wholesale() {
        let merged = merge(&yaml("x: [1, 2, 3]"), &yaml("x: [9]"));
        assert_eq!(merged, yaml("x: [9]"));
    }

    #[test]
    fn nested_mappings_merge_recursively() {
        let merged = merge(
            &yaml("d: {d1: 1, d2: 2}"),
            &yaml("d: {d2: 3, d3: 3}"),
        );
        assert_eq!(merged, yaml("d: {d1: 1, d2: 3, d3: 3}"));
    }

    #[test]
    fn mapping_replaces_scalar_and_vice_versa() {
        let merged = merge(&yaml("a: 1\nb: {x: 1}"), &yaml("a: {y: 2}\nb: 3"));
        assert_eq!(merged, yaml("a: {y: 2}\nb: 3"));
    }

    #[test]
    fn explicit_null_overrides() {
        let merged = merge(&yaml("a: 1"), &yaml("a: ~"));
        assert_eq!(merged.get("a"), Some(&ConfigValue::null()));
    }

    #[test]
    fn result_key_order_follows_base_then_overlay() {
        let merged = merge(&yaml("b: 1\na: 1"), &yaml("c: 2\na: 2"));
        assert_eq!(merged.keys().collect::<Vec<_>>(), vec!["b", "a", "c"]);
    }

    #[test]
    fn inputs_are_not_mutated() {
        let base = yaml("d: {d1: 1}");
        let overlay = yaml("d: {d2: 2}");
        let _ = merge(&base, &overlay);
        assert_eq!(base, yaml("d: {d1: 1}"));
        assert_eq!(overlay, yaml("d: {d2: 2}"));
    }
}

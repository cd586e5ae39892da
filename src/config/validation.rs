//! Config validation helpers: provenance key-walking and range checks.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree to record which dotted paths the operator actually set,
//! then proceed with normal serde deserialization. This never rejects a
//! config — it only informs [`super::ConfigProvenance`].

/// Recursively collects every dotted key path present in a parsed TOML
/// document, e.g. `["tiers", "tiers.context_threshold_default", ...]`.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_nested_tables() {
        let doc: toml::Value = toml::from_str(
            r#"
            [tiers]
            context_threshold_default = 0.6

            [footprint_cache]
            ttl_seconds = 3600
            "#,
        )
        .unwrap();
        let keys = walk_toml_keys(&doc, "");
        assert!(keys.contains(&"tiers".to_string()));
        assert!(keys.contains(&"tiers.context_threshold_default".to_string()));
        assert!(keys.contains(&"footprint_cache.ttl_seconds".to_string()));
    }
}

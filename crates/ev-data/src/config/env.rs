//! Environment-variable overrides

use serde_json::{Map, Value};
use tracing::debug;

/// Prefix for configuration variables, e.g. `EVVIEW_BACKENDS__CSV=false`
pub const ENV_PREFIX: &str = "EVVIEW_";

/// Overlay `PREFIX`-ed variables onto `tree`.
///
/// The remainder of the name is split on `__` into a path. Each segment
/// takes the spelling of an existing key that matches it ignoring case, so
/// mixed-case plotter and option names can be overridden; unmatched segments
/// are lowercased. Scalars are coerced; a string assigned over a list is
/// split on whitespace.
pub fn apply_env_overrides<I>(tree: &mut Value, vars: I, prefix: &str)
where
    I: IntoIterator<Item = (String, String)>,
{
    for (name, raw) in vars {
        let Some(rest) = name.strip_prefix(prefix) else {
            continue;
        };
        let path: Vec<&str> = rest.split("__").collect();
        if path.iter().any(|segment| segment.is_empty()) {
            continue;
        }
        debug!("Configuration override from {}", name);
        set_path(tree, &path, &raw);
    }
}

fn set_path(tree: &mut Value, path: &[&str], raw: &str) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut node = tree;
    for segment in parents {
        let map = object(node);
        let key = resolve_key(map, segment);
        node = map
            .entry(key)
            .or_insert_with(|| Value::Object(Map::new()));
    }

    let map = object(node);
    let key = resolve_key(map, last);
    let value = match map.get(&key) {
        Some(Value::Array(_)) => Value::Array(
            raw.split_whitespace()
                .map(|item| Value::String(item.to_string()))
                .collect(),
        ),
        _ => coerce(raw),
    };
    map.insert(key, value);
}

/// Existing key equal to `segment` ignoring ASCII case, else `segment` lowercased
fn resolve_key(map: &Map<String, Value>, segment: &str) -> String {
    map.keys()
        .find(|key| key.eq_ignore_ascii_case(segment))
        .cloned()
        .unwrap_or_else(|| segment.to_lowercase())
}

fn object(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just replaced with an object"),
    }
}

fn coerce(raw: &str) -> Value {
    match raw.to_lowercase().as_str() {
        "true" | "yes" => return Value::Bool(true),
        "false" | "no" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(int) = raw.parse::<i64>() {
        return Value::from(int);
    }
    match raw.parse::<f64>() {
        Ok(float) if float.is_finite() => Value::from(float),
        _ => Value::String(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_coerce() {
        assert_eq!(coerce("Yes"), json!(true));
        assert_eq!(coerce("false"), json!(false));
        assert_eq!(coerce("800"), json!(800));
        assert_eq!(coerce("0.5"), json!(0.5));
        assert_eq!(coerce("rgb(12,51,131)"), json!("rgb(12,51,131)"));
    }

    #[test]
    fn test_nested_override_creates_levels() {
        let mut tree = json!({"plot": {"height": 600}});
        apply_env_overrides(
            &mut tree,
            vec![
                ("APP_PLOT__HEIGHT".to_string(), "800".to_string()),
                ("APP_UI__DEBUG_MODE".to_string(), "true".to_string()),
                ("APP_BAD____KEY".to_string(), "1".to_string()),
                ("OTHER_PLOT__HEIGHT".to_string(), "1".to_string()),
            ],
            "APP_",
        );
        assert_eq!(tree, json!({"plot": {"height": 800}, "ui": {"debug_mode": true}}));
    }

    #[test]
    fn test_override_keeps_mixed_case_keys() {
        let mut tree = json!({"plotters": {"simpleFlashBeam": {"markerSize": 2}}});
        apply_env_overrides(
            &mut tree,
            vec![
                ("APP_PLOTTERS__SIMPLEFLASHBEAM__MARKERSIZE".to_string(), "6".to_string()),
                ("APP_PLOTTERS__SIMPLEFLASHBEAM__COLOR".to_string(), "red".to_string()),
            ],
            "APP_",
        );
        assert_eq!(
            tree,
            json!({"plotters": {"simpleFlashBeam": {"markerSize": 6, "color": "red"}}})
        );
    }
}

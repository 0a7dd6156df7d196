//! Style-expression builders.

use serde_json::{Value, json};

pub fn get(property: &str) -> Value {
    json!(["get", property])
}

/// `["coalesce", ["get", property], fallback]`
pub fn coalesce_get(property: &str, fallback: &str) -> Value {
    json!(["coalesce", get(property), fallback])
}

/// Maps a property through `(label, output)` pairs.
///
/// A `match` needs at least one label, so an empty mapping collapses to the
/// fallback itself.
pub fn match_property<'a>(
    property: &str,
    pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
    fallback: &str,
) -> Value {
    let mut expr = vec![json!("match"), get(property)];
    for (label, output) in pairs {
        expr.push(json!(label));
        expr.push(json!(output));
    }
    if expr.len() == 2 {
        return json!(fallback);
    }
    expr.push(json!(fallback));
    Value::Array(expr)
}

/// Keeps features whose `property` is one of `values`.
pub fn in_literal<'a>(property: &str, values: impl IntoIterator<Item = &'a str>) -> Value {
    let values: Vec<&str> = values.into_iter().collect();
    json!(["in", get(property), ["literal", values]])
}

/// A filter no feature passes.
pub fn match_nothing(property: &str) -> Value {
    in_literal(property, std::iter::empty())
}

/// `if_true` while the boolean feature-state flag `key` is set.
pub fn feature_state_case(key: &str, if_true: Value, if_false: Value) -> Value {
    json!([
        "case",
        ["boolean", ["feature-state", key], false],
        if_true,
        if_false
    ])
}

pub fn visibility(visible: bool) -> &'static str {
    if visible { "visible" } else { "none" }
}

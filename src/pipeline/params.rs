//! Lenient parameter coercion for family routines.
//!
//! Every accessor returns `None` for a missing, `null`, or unparseable value so
//! callers can fall back to the family default instead of rejecting the request.

use serde_json::{Map, Value};

pub type ParamMap = Map<String, Value>;

pub fn param_f64(params: &ParamMap, key: &str) -> Option<f64> {
    let value = match params.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    value.is_finite().then_some(value)
}

pub fn param_i64(params: &ParamMap, key: &str) -> Option<i64> {
    match params.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(truncate_f64)),
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().map(truncate_f64))
        }
        _ => None,
    }
}

/// Strictly positive pixel dimension.
pub fn param_dimension(params: &ParamMap, key: &str) -> Option<u32> {
    param_i64(params, key)
        .and_then(|v| u32::try_from(v).ok())
        .filter(|v| *v > 0)
}

pub fn param_bool(params: &ParamMap, key: &str) -> Option<bool> {
    match params.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|v| v != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

pub fn param_str(params: &ParamMap, key: &str) -> Option<String> {
    match params.get(key)? {
        Value::String(s) => Some(s.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Defaults first, caller values override.
pub fn merge_params(defaults: &ParamMap, overrides: &ParamMap) -> ParamMap {
    let mut merged = defaults.clone();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

fn truncate_f64(value: f64) -> i64 {
    if value.is_finite() {
        value.trunc() as i64
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> ParamMap {
        value.as_object().cloned().expect("test params must be an object")
    }

    #[test]
    fn numeric_accessors_accept_numbers_and_numeric_strings() {
        let p = params(json!({"a": 12, "b": "7.5", "c": " 42 ", "d": 3.9}));
        assert_eq!(param_f64(&p, "a"), Some(12.0));
        assert_eq!(param_f64(&p, "b"), Some(7.5));
        assert_eq!(param_i64(&p, "c"), Some(42));
        assert_eq!(param_i64(&p, "b"), Some(7));
        assert_eq!(param_i64(&p, "d"), Some(3));
    }

    #[test]
    fn unparseable_and_null_values_fall_back_to_none() {
        let p = params(json!({"a": "wide", "b": null, "c": true, "d": [1]}));
        assert_eq!(param_f64(&p, "a"), None);
        assert_eq!(param_i64(&p, "b"), None);
        assert_eq!(param_f64(&p, "c"), None);
        assert_eq!(param_i64(&p, "d"), None);
        assert_eq!(param_f64(&p, "missing"), None);
    }

    #[test]
    fn dimensions_must_be_positive() {
        let p = params(json!({"zero": 0, "neg": -5, "ok": "640"}));
        assert_eq!(param_dimension(&p, "zero"), None);
        assert_eq!(param_dimension(&p, "neg"), None);
        assert_eq!(param_dimension(&p, "ok"), Some(640));
    }

    #[test]
    fn bools_parse_common_spellings() {
        let p = params(json!({"a": false, "b": "yes", "c": "off", "d": 0, "e": "maybe"}));
        assert_eq!(param_bool(&p, "a"), Some(false));
        assert_eq!(param_bool(&p, "b"), Some(true));
        assert_eq!(param_bool(&p, "c"), Some(false));
        assert_eq!(param_bool(&p, "d"), Some(false));
        assert_eq!(param_bool(&p, "e"), None);
    }

    #[test]
    fn strings_are_trimmed_and_blank_is_absent() {
        let p = params(json!({"a": "  red ", "b": "   ", "c": 5}));
        assert_eq!(param_str(&p, "a").as_deref(), Some("red"));
        assert_eq!(param_str(&p, "b"), None);
        assert_eq!(param_str(&p, "c").as_deref(), Some("5"));
    }

    #[test]
    fn merge_lets_caller_values_override_defaults() {
        let defaults = params(json!({"radius": 5, "sigma": 5}));
        let caller = params(json!({"sigma": 2, "extra": "x"}));
        let merged = merge_params(&defaults, &caller);
        assert_eq!(Value::Object(merged), json!({"radius": 5, "sigma": 2, "extra": "x"}));
    }
}

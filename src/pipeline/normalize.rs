use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::pipeline::aliases::{AliasEntry, AliasTable};
use crate::pipeline::error::PipelineError;
use crate::pipeline::params::{merge_params, param_f64, ParamMap};
use crate::pipeline::OperationFamily;

const RETIRED_UMBRELLA_TYPES: [&str; 2] = ["filter", "effects"];
const DEFAULT_FILTER_INTENSITY: f64 = 1.0;

/// Raw `{type, params}` descriptor as supplied by a caller or an operation producer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OperationDescriptor {
    #[serde(rename = "type", default)]
    pub type_name: String,
    #[serde(default, deserialize_with = "null_as_empty_params")]
    pub params: ParamMap,
}

impl OperationDescriptor {
    pub fn new(type_name: impl Into<String>, params: ParamMap) -> Self {
        Self {
            type_name: type_name.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalOperation {
    pub family: OperationFamily,
    pub variant: Option<String>,
    pub params: ParamMap,
}

/// Outcome of normalization. Unrecognized spellings are carried through
/// untouched and rejected at dispatch time, not here.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedOperation {
    Canonical(CanonicalOperation),
    Unrecognized { type_name: String, params: ParamMap },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("operation type '{type_name}' is a retired umbrella type")]
    InvalidOperationType { type_name: String },
}

impl NormalizeError {
    pub fn at_step(self, step: usize) -> PipelineError {
        match self {
            Self::InvalidOperationType { type_name } => {
                PipelineError::InvalidOperationType { step, type_name }
            }
        }
    }
}

pub fn normalize_operation(
    aliases: &AliasTable,
    descriptor: &OperationDescriptor,
) -> Result<NormalizedOperation, NormalizeError> {
    let type_name = descriptor.type_name.as_str();
    let params = &descriptor.params;

    if let Some(family) = OperationFamily::from_base_name(type_name) {
        return Ok(canonical(family, None, params.clone()));
    }

    if RETIRED_UMBRELLA_TYPES.contains(&type_name) {
        return Err(NormalizeError::InvalidOperationType {
            type_name: type_name.to_string(),
        });
    }

    if let Some(variant) = type_name.strip_prefix("filter-") {
        return Ok(filter_operation(descriptor, variant));
    }

    if let Some(variant) = type_name
        .strip_prefix("effects-")
        .or_else(|| type_name.strip_prefix("effect-"))
    {
        return Ok(effect_operation(descriptor, variant));
    }

    if let Some(entry) = aliases.get(type_name) {
        return Ok(from_alias(entry, params));
    }

    if let Some((group, variant)) = type_name.split_once(':') {
        match group {
            "effects" => {
                return Ok(match aliases.get(variant) {
                    Some(entry) => from_alias(entry, params),
                    None => effect_operation(descriptor, variant),
                });
            }
            "filter" => return Ok(filter_operation(descriptor, variant)),
            _ => {}
        }
    }

    Ok(unrecognized(descriptor))
}

fn filter_operation(descriptor: &OperationDescriptor, variant: &str) -> NormalizedOperation {
    if variant.is_empty() {
        return unrecognized(descriptor);
    }
    let mut params = descriptor.params.clone();
    let intensity = param_f64(&params, "intensity").unwrap_or(DEFAULT_FILTER_INTENSITY);
    params.insert(String::from("intensity"), number_value(intensity));
    canonical(OperationFamily::Filter, Some(variant), params)
}

fn effect_operation(descriptor: &OperationDescriptor, variant: &str) -> NormalizedOperation {
    if variant.is_empty() {
        return unrecognized(descriptor);
    }
    canonical(
        OperationFamily::Effect,
        Some(variant),
        descriptor.params.clone(),
    )
}

fn from_alias(entry: &AliasEntry, params: &ParamMap) -> NormalizedOperation {
    canonical(
        entry.family,
        Some(entry.variant.as_str()),
        merge_params(&entry.defaults, params),
    )
}

fn canonical(
    family: OperationFamily,
    variant: Option<&str>,
    params: ParamMap,
) -> NormalizedOperation {
    NormalizedOperation::Canonical(CanonicalOperation {
        family,
        variant: variant.map(str::to_string),
        params,
    })
}

fn unrecognized(descriptor: &OperationDescriptor) -> NormalizedOperation {
    NormalizedOperation::Unrecognized {
        type_name: descriptor.type_name.clone(),
        params: descriptor.params.clone(),
    }
}

/// Whole numbers stay integers so `1` and `1.0` compare equal to caller JSON.
fn number_value(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        Value::from(value as i64)
    } else {
        Value::from(value)
    }
}

fn null_as_empty_params<'de, D>(deserializer: D) -> Result<ParamMap, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<ParamMap>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn descriptor(type_name: &str, params: Value) -> OperationDescriptor {
        OperationDescriptor::new(
            type_name,
            params.as_object().cloned().unwrap_or_default(),
        )
    }

    fn canonical_of(result: NormalizedOperation) -> CanonicalOperation {
        match result {
            NormalizedOperation::Canonical(op) => op,
            other => panic!("expected canonical operation, got {other:?}"),
        }
    }

    #[test]
    fn base_families_pass_through_unchanged() {
        let aliases = AliasTable::builtin();
        let op = canonical_of(
            normalize_operation(
                &aliases,
                &descriptor("resize", json!({"width": 100, "height": "80"})),
            )
            .expect("resize should normalize"),
        );
        assert_eq!(op.family, OperationFamily::Resize);
        assert_eq!(op.variant, None);
        assert_eq!(Value::Object(op.params), json!({"width": 100, "height": "80"}));

        let op = canonical_of(
            normalize_operation(&aliases, &descriptor("shapeCrop", json!({})))
                .expect("shapeCrop should normalize"),
        );
        assert_eq!(op.family, OperationFamily::ShapeCrop);
    }

    #[test]
    fn bare_umbrella_types_are_rejected_regardless_of_params() {
        let aliases = AliasTable::builtin();
        for type_name in ["filter", "effects"] {
            for params in [
                json!({}),
                json!({"filterType": "blur"}),
                json!({"effectType": "grayscale", "intensity": 100}),
            ] {
                let err = normalize_operation(&aliases, &descriptor(type_name, params))
                    .expect_err("umbrella type must be rejected");
                assert_eq!(
                    err,
                    NormalizeError::InvalidOperationType {
                        type_name: type_name.to_string()
                    }
                );
            }
        }
    }

    #[test]
    fn every_alias_with_empty_params_yields_exactly_its_defaults() {
        let aliases = AliasTable::builtin();
        for (name, entry) in aliases.iter() {
            let op = canonical_of(
                normalize_operation(&aliases, &descriptor(name, json!({})))
                    .expect("alias should normalize"),
            );
            assert_eq!(op.family, entry.family, "family of {name}");
            assert_eq!(op.variant.as_deref(), Some(entry.variant.as_str()));
            assert_eq!(op.params, entry.defaults, "defaults of {name}");
        }
    }

    #[test]
    fn alias_defaults_are_overridden_by_caller_params() {
        let aliases = AliasTable::builtin();
        let op = canonical_of(
            normalize_operation(&aliases, &descriptor("blur", json!({"sigma": 2})))
                .expect("blur should normalize"),
        );
        assert_eq!(op.family, OperationFamily::Effect);
        assert_eq!(Value::Object(op.params), json!({"radius": 5, "sigma": 2}));
    }

    #[test]
    fn effects_prefix_keeps_caller_intensity() {
        let aliases = AliasTable::builtin();
        let op = canonical_of(
            normalize_operation(
                &aliases,
                &descriptor("effects-grayscale", json!({"intensity": 50})),
            )
            .expect("effects-grayscale should normalize"),
        );
        assert_eq!(op.family, OperationFamily::Effect);
        assert_eq!(op.variant.as_deref(), Some("grayscale"));
        assert_eq!(op.params.get("intensity"), Some(&json!(50)));
    }

    #[test]
    fn singular_effect_prefix_is_accepted() {
        let aliases = AliasTable::builtin();
        let op = canonical_of(
            normalize_operation(&aliases, &descriptor("effect-swirl", json!({"degrees": 45})))
                .expect("effect-swirl should normalize"),
        );
        assert_eq!(op.family, OperationFamily::Effect);
        assert_eq!(op.variant.as_deref(), Some("swirl"));
        assert_eq!(Value::Object(op.params), json!({"degrees": 45}));
    }

    #[test]
    fn filter_prefix_coerces_intensity_with_default() {
        let aliases = AliasTable::builtin();
        let op = canonical_of(
            normalize_operation(&aliases, &descriptor("filter-blur", json!({})))
                .expect("filter-blur should normalize"),
        );
        assert_eq!(op.family, OperationFamily::Filter);
        assert_eq!(op.variant.as_deref(), Some("blur"));
        assert_eq!(op.params.get("intensity"), Some(&json!(1)));

        let op = canonical_of(
            normalize_operation(
                &aliases,
                &descriptor("filter-sepia", json!({"intensity": "2.5", "extra": true})),
            )
            .expect("filter-sepia should normalize"),
        );
        assert_eq!(op.params.get("intensity"), Some(&json!(2.5)));
        assert_eq!(op.params.get("extra"), Some(&json!(true)));

        let op = canonical_of(
            normalize_operation(&aliases, &descriptor("filter-edge", json!({"intensity": "x"})))
                .expect("filter-edge should normalize"),
        );
        assert_eq!(op.params.get("intensity"), Some(&json!(1)));
    }

    #[test]
    fn colon_forms_route_to_effects_and_filters() {
        let aliases = AliasTable::builtin();

        let op = canonical_of(
            normalize_operation(&aliases, &descriptor("effects:sepia", json!({})))
                .expect("effects:sepia should normalize"),
        );
        assert_eq!(op.family, OperationFamily::Effect);
        assert_eq!(op.variant.as_deref(), Some("sepia"));
        assert_eq!(Value::Object(op.params), json!({"intensity": 80}));

        let op = canonical_of(
            normalize_operation(&aliases, &descriptor("effects:glow", json!({"x": 1})))
                .expect("effects:glow should normalize"),
        );
        assert_eq!(op.family, OperationFamily::Effect);
        assert_eq!(op.variant.as_deref(), Some("glow"));
        assert_eq!(Value::Object(op.params), json!({"x": 1}));

        let op = canonical_of(
            normalize_operation(&aliases, &descriptor("filter:emboss", json!({})))
                .expect("filter:emboss should normalize"),
        );
        assert_eq!(op.family, OperationFamily::Filter);
        assert_eq!(op.variant.as_deref(), Some("emboss"));
        assert_eq!(op.params.get("intensity"), Some(&json!(1)));

        // Only the plural `effects` group takes the colon form.
        let result = normalize_operation(&aliases, &descriptor("effect:sepia", json!({})))
            .expect("effect:sepia is not rejected");
        assert!(matches!(
            result,
            NormalizedOperation::Unrecognized { ref type_name, .. } if type_name == "effect:sepia"
        ));
    }

    #[test]
    fn unknown_spellings_pass_through_unrecognized() {
        let aliases = AliasTable::builtin();
        for type_name in ["sparkle", "other:thing", "filter-", "Resize"] {
            let result = normalize_operation(&aliases, &descriptor(type_name, json!({"a": 1})))
                .expect("unknown spelling is not a normalization error");
            assert_eq!(
                result,
                NormalizedOperation::Unrecognized {
                    type_name: type_name.to_string(),
                    params: json!({"a": 1}).as_object().cloned().unwrap_or_default(),
                }
            );
        }
    }

    #[test]
    fn descriptor_deserializes_null_params_as_empty() {
        let parsed: OperationDescriptor =
            serde_json::from_value(json!({"type": "flip", "params": null}))
                .expect("descriptor should parse");
        assert_eq!(parsed.type_name, "flip");
        assert!(parsed.params.is_empty());

        let parsed: OperationDescriptor =
            serde_json::from_value(json!({"type": "flop"})).expect("descriptor should parse");
        assert!(parsed.params.is_empty());
    }
}

//! Historical flat operation names and the canonical `(family, variant, defaults)`
//! they stand for. Built once at startup and shared read-only.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use crate::pipeline::params::ParamMap;
use crate::pipeline::OperationFamily;

#[derive(Debug, Clone, PartialEq)]
pub struct AliasEntry {
    pub family: OperationFamily,
    pub variant: String,
    pub defaults: ParamMap,
}

#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    entries: BTreeMap<String, AliasEntry>,
}

impl AliasTable {
    pub fn builtin() -> Self {
        let mut table = Self::default();

        table.effect("grayscale", json!({"intensity": 100}));
        table.effect("sepia", json!({"intensity": 80}));
        table.effect("negate", json!({}));
        table.effect("blur", json!({"radius": 5, "sigma": 5}));
        table.effect("gaussian-blur", json!({"radius": 5}));
        table.effect("motion-blur", json!({"radius": 10, "angle": 0}));
        table.effect("sharpen", json!({"radius": 1, "amount": 1}));
        table.effect(
            "unsharp",
            json!({"radius": 1, "sigma": 1, "amount": 1, "threshold": 0.05}),
        );
        table.effect("charcoal", json!({"radius": 1, "sigma": 0.5}));
        table.effect("oil-painting", json!({"radius": 3}));
        table.effect("sketch", json!({"radius": 1, "sigma": 0.5}));
        table.effect("emboss", json!({"radius": 1, "sigma": 0.5}));
        table.effect("edge", json!({"radius": 1}));
        table.effect("posterize", json!({"levels": 4}));
        table.effect("pixelate", json!({"size": 10}));
        table.effect("mosaic", json!({"size": 10}));
        table.effect("brightness", json!({"value": 0}));
        table.effect("contrast", json!({"value": 0}));
        table.effect("saturation", json!({"value": 0}));
        table.effect("hue", json!({"value": 0}));
        table.effect("colorize", json!({"color": "#FF0000", "intensity": 50}));
        table.effect("tint", json!({"color": "#FFD700", "intensity": 50}));
        table.effect("noise", json!({"noiseType": "Uniform"}));
        table.effect("despeckle", json!({}));
        table.effect("texture", json!({"intensity": 30}));
        table.effect("vignette", json!({"radius": 100, "sigma": 50}));
        table.effect("solarize", json!({"threshold": 50}));
        table.effect("swirl", json!({"degrees": 90}));
        table.effect("wave", json!({"amplitude": 25, "wavelength": 150}));
        table.effect("implode", json!({"amount": 0.5}));
        table.effect("explode", json!({"amount": 0.5}));
        table.effect("spread", json!({"radius": 3}));
        table.effect("normalize", json!({}));
        table.effect("equalize", json!({}));
        table.effect("gamma", json!({"value": 1.0}));
        table.effect("threshold", json!({"value": 50}));
        table.effect("quantize", json!({"colors": 256}));
        table.effect("adaptive-blur", json!({"radius": 5, "sigma": 3}));
        table.effect("adaptive-sharpen", json!({"radius": 5, "sigma": 3}));
        table.effect(
            "morphology",
            json!({"method": "Open", "kernel": "Disk", "iterations": 1}),
        );
        table.effect("colorspace", json!({"colorspace": "Gray"}));
        table.effect("auto-level", json!({}));
        table.effect("auto-gamma", json!({}));
        table.effect("auto-contrast", json!({}));
        table.effect("color-matrix", json!({"matrix": "1 0 0 0 1 0 0 0 1"}));
        table.effect("distort", json!({"method": "SRT", "args": "0"}));
        table.effect("fx", json!({"expression": "u"}));

        table.filter("filter_blur", "blur", json!({"intensity": 1}));
        table.filter("filter_sharpen", "sharpen", json!({"intensity": 1}));
        table.filter("filter_grayscale", "grayscale", json!({"intensity": 1}));
        table.filter("filter_sepia", "sepia", json!({"intensity": 80}));
        table.filter("filter_negate", "negate", json!({"intensity": 1}));

        table
    }

    pub fn get(&self, name: &str) -> Option<&AliasEntry> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AliasEntry)> {
        self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    fn effect(&mut self, name: &str, defaults: Value) {
        self.insert(name, OperationFamily::Effect, name, defaults);
    }

    fn filter(&mut self, name: &str, variant: &str, defaults: Value) {
        self.insert(name, OperationFamily::Filter, variant, defaults);
    }

    fn insert(&mut self, name: &str, family: OperationFamily, variant: &str, defaults: Value) {
        let defaults = match defaults {
            Value::Object(map) => map,
            _ => ParamMap::new(),
        };
        self.entries.insert(
            name.to_string(),
            AliasEntry {
                family,
                variant: variant.to_string(),
                defaults,
            },
        );
    }
}

//! ImageMagick operator sequences for the `filter` and `effect` families.

use crate::pipeline::params::{param_f64, param_i64, param_str, ParamMap};

use super::{EffectSpec, EngineError, FilterOptions};

pub const FILTER_VARIANTS: [&str; 9] = [
    "blur",
    "sharpen",
    "emboss",
    "edge",
    "charcoal",
    "oil-painting",
    "sepia",
    "grayscale",
    "negate",
];

const NOISE_TYPES: [&str; 7] = [
    "Uniform",
    "Gaussian",
    "Multiplicative",
    "Impulse",
    "Laplacian",
    "Poisson",
    "Random",
];

pub(super) fn filter_args(options: &FilterOptions) -> Result<Vec<String>, EngineError> {
    let i = options.intensity;
    let args = match options.filter_type.as_str() {
        "blur" => vec![op("-blur"), format!("0x{i}")],
        "sharpen" => vec![op("-sharpen"), format!("0x{i}")],
        "emboss" => vec![op("-emboss"), i.to_string()],
        "edge" => vec![op("-edge"), i.to_string()],
        "charcoal" => vec![op("-charcoal"), i.to_string()],
        "oil-painting" => vec![op("-paint"), i.to_string()],
        "sepia" => vec![op("-sepia-tone"), format!("{}%", i.clamp(0.0, 100.0))],
        "grayscale" => vec![op("-colorspace"), op("Gray")],
        "negate" => vec![op("-negate")],
        other => {
            return Err(EngineError::InvalidOptions(format!(
                "unsupported filter '{other}'"
            )))
        }
    };
    Ok(args)
}

pub(super) fn effect_args(effect: &EffectSpec) -> Result<Vec<String>, EngineError> {
    let p = &effect.params;
    let num = |key: &str, default: f64| param_f64(p, key).unwrap_or(default);
    let text = |key: &str, default: &str| param_str(p, key).unwrap_or_else(|| default.to_string());

    let args = match effect.effect_type.as_str() {
        "grayscale" => grayscale(p),
        "sepia" => vec![
            op("-sepia-tone"),
            format!("{}%", num("intensity", 80.0).clamp(0.0, 100.0)),
        ],
        "negate" => vec![op("-negate")],
        "blur" => vec![op("-blur"), format!("{}x{}", num("radius", 5.0), num("sigma", 5.0))],
        "gaussian-blur" => vec![op("-gaussian-blur"), format!("0x{}", num("radius", 5.0))],
        "motion-blur" => vec![
            op("-motion-blur"),
            format!("0x{}+{}", num("radius", 10.0), num("angle", 0.0)),
        ],
        "sharpen" => vec![
            op("-sharpen"),
            format!("{}x{}", num("radius", 1.0), num("amount", 1.0)),
        ],
        "unsharp" => vec![
            op("-unsharp"),
            format!(
                "{}x{}+{}+{}",
                num("radius", 1.0),
                num("sigma", 1.0),
                num("amount", 1.0),
                num("threshold", 0.05)
            ),
        ],
        "charcoal" => vec![
            op("-charcoal"),
            format!("{}x{}", num("radius", 1.0), num("sigma", 0.5)),
        ],
        "oil-painting" => vec![op("-paint"), num("radius", 3.0).to_string()],
        "sketch" => vec![
            op("-sketch"),
            format!(
                "{}x{}+{}",
                num("radius", 1.0),
                num("sigma", 0.5),
                num("angle", 45.0)
            ),
        ],
        "emboss" => vec![
            op("-emboss"),
            format!("{}x{}", num("radius", 1.0), num("sigma", 0.5)),
        ],
        "edge" => vec![op("-edge"), num("radius", 1.0).to_string()],
        "posterize" => vec![
            op("-posterize"),
            param_i64(p, "levels").unwrap_or(4).max(2).to_string(),
        ],
        "pixelate" | "mosaic" => {
            let size = param_i64(p, "size").unwrap_or(10).max(1) as f64;
            vec![
                op("-sample"),
                format!("{}%", 100.0 / size),
                op("-sample"),
                format!("{}%", 100.0 * size),
            ]
        }
        "brightness" => vec![op("-brightness-contrast"), format!("{}x0", num("value", 0.0))],
        "contrast" => vec![op("-brightness-contrast"), format!("0x{}", num("value", 0.0))],
        "saturation" => vec![op("-modulate"), format!("100,{}", 100.0 + num("value", 0.0))],
        "hue" => vec![
            op("-modulate"),
            format!("100,100,{}", 100.0 + num("value", 0.0)),
        ],
        "colorize" => vec![
            op("-fill"),
            text("color", "#FF0000"),
            op("-colorize"),
            format!("{}%", num("intensity", 50.0).clamp(0.0, 100.0)),
        ],
        "tint" => vec![
            op("-fill"),
            text("color", "#FFD700"),
            op("-tint"),
            num("intensity", 50.0).clamp(0.0, 100.0).to_string(),
        ],
        "noise" => {
            let requested = text("noiseType", "Uniform");
            let noise = NOISE_TYPES
                .into_iter()
                .find(|t| t.eq_ignore_ascii_case(&requested))
                .ok_or_else(|| {
                    EngineError::InvalidOptions(format!("unsupported noise type '{requested}'"))
                })?;
            vec![op("+noise"), op(noise)]
        }
        "despeckle" => vec![op("-despeckle")],
        "texture" => blend_overlay(
            &["+noise", "Random", "-colorspace", "Gray", "-blur", "0x1"],
            num("intensity", 30.0),
        ),
        "vignette" => vec![
            op("-background"),
            op("black"),
            op("-vignette"),
            format!("{}x{}", num("radius", 100.0), num("sigma", 50.0)),
        ],
        "solarize" => vec![
            op("-solarize"),
            format!("{}%", num("threshold", 50.0).clamp(0.0, 100.0)),
        ],
        "swirl" => vec![op("-swirl"), num("degrees", 90.0).to_string()],
        "wave" => vec![
            op("-wave"),
            format!("{}x{}", num("amplitude", 25.0), num("wavelength", 150.0)),
        ],
        "implode" => vec![op("-implode"), num("amount", 0.5).to_string()],
        "explode" => vec![op("-implode"), (-num("amount", 0.5)).to_string()],
        "spread" => vec![op("-spread"), num("radius", 3.0).to_string()],
        "normalize" => vec![op("-normalize")],
        "equalize" => vec![op("-equalize")],
        "gamma" => {
            let value = num("value", 1.0);
            if value <= 0.0 {
                return Err(EngineError::InvalidOptions(format!(
                    "gamma must be positive, got {value}"
                )));
            }
            vec![op("-gamma"), value.to_string()]
        }
        "threshold" => vec![
            op("-threshold"),
            format!("{}%", num("value", 50.0).clamp(0.0, 100.0)),
        ],
        "quantize" => vec![
            op("-colors"),
            param_i64(p, "colors").unwrap_or(256).max(2).to_string(),
        ],
        "adaptive-blur" => vec![
            op("-adaptive-blur"),
            format!("{}x{}", num("radius", 5.0), num("sigma", 3.0)),
        ],
        "adaptive-sharpen" => vec![
            op("-adaptive-sharpen"),
            format!("{}x{}", num("radius", 5.0), num("sigma", 3.0)),
        ],
        "morphology" => vec![
            op("-morphology"),
            format!(
                "{}:{}",
                text("method", "Open"),
                param_i64(p, "iterations").unwrap_or(1).max(1)
            ),
            text("kernel", "Disk"),
        ],
        "colorspace" => vec![op("-colorspace"), text("colorspace", "Gray")],
        "auto-level" => vec![op("-auto-level")],
        "auto-gamma" => vec![op("-auto-gamma")],
        "auto-contrast" => vec![op("-contrast-stretch"), op("2%x1%")],
        "color-matrix" => vec![op("-color-matrix"), text("matrix", "1 0 0 0 1 0 0 0 1")],
        "distort" => vec![op("-distort"), text("method", "SRT"), text("args", "0")],
        "fx" => vec![op("-fx"), text("expression", "u")],
        other => {
            return Err(EngineError::InvalidOptions(format!(
                "unsupported effect '{other}'"
            )))
        }
    };
    Ok(args)
}

fn grayscale(params: &ParamMap) -> Vec<String> {
    let method = match param_str(params, "method").as_deref() {
        Some(m) if m.eq_ignore_ascii_case("Rec601") => "Rec601Luma",
        Some(m) if m.eq_ignore_ascii_case("Average") => "Average",
        Some(m) if m.eq_ignore_ascii_case("Brightness") => "Brightness",
        Some(m) if m.eq_ignore_ascii_case("Lightness") => "Lightness",
        Some(m) if m.eq_ignore_ascii_case("Luminance") => "Rec709Luminance",
        _ => "Rec709Luma",
    };
    let intensity = param_f64(params, "intensity")
        .unwrap_or(100.0)
        .clamp(0.0, 100.0);
    if intensity >= 100.0 {
        return vec![op("-grayscale"), op(method)];
    }
    blend_overlay(&["-grayscale", method], intensity)
}

/// Blends a processed clone over the current image at `percent` strength.
fn blend_overlay(clone_ops: &[&str], percent: f64) -> Vec<String> {
    let mut args = vec![op("("), op("+clone")];
    args.extend(clone_ops.iter().map(|v| op(v)));
    args.push(op(")"));
    args.push(op("-compose"));
    args.push(op("blend"));
    args.push(op("-define"));
    args.push(format!("compose:args={}", percent.clamp(0.0, 100.0)));
    args.push(op("-composite"));
    args.push(op("-compose"));
    args.push(op("Over"));
    args
}

fn op(value: &str) -> String {
    value.to_string()
}

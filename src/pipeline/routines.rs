//! Per-family request shaping: coerce params, apply defaults, validate required
//! fields, then make exactly one engine call.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::pipeline::engine::{
    AdjustOptions, ConvertOptions, CropOptions, CropShape, EffectSpec, EngineError,
    ExtentOptions, FilterOptions, ResizeOptions, RotateOptions, ShapeCropOptions,
    TransformEngine, TrimOptions, WatermarkContent, WatermarkOptions, WatermarkPosition,
};
use crate::pipeline::error::PipelineError;
use crate::pipeline::normalize::{CanonicalOperation, NormalizedOperation};
use crate::pipeline::params::{
    param_bool, param_dimension, param_f64, param_i64, param_str, ParamMap,
};
use crate::pipeline::OperationFamily;

const GRAVITIES: [&str; 9] = [
    "NorthWest",
    "North",
    "NorthEast",
    "West",
    "Center",
    "East",
    "SouthWest",
    "South",
    "SouthEast",
];

#[derive(Debug, Clone)]
pub struct RoutineContext {
    pub step: usize,
    pub uploads_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub command: String,
    pub output_path: PathBuf,
}

/// The path a step will actually write. `shapeCrop` always emits PNG and
/// `convert` emits its target format; every other family keeps `proposed`.
pub fn output_path_for(operation: &NormalizedOperation, proposed: &Path) -> PathBuf {
    match operation {
        NormalizedOperation::Canonical(op) if op.family == OperationFamily::ShapeCrop => {
            proposed.with_extension("png")
        }
        NormalizedOperation::Canonical(op) if op.family == OperationFamily::Convert => {
            proposed.with_extension(convert_format(&op.params))
        }
        _ => proposed.to_path_buf(),
    }
}

pub fn dispatch(
    engine: &dyn TransformEngine,
    ctx: &RoutineContext,
    operation: &NormalizedOperation,
    input: &Path,
    proposed_output: &Path,
) -> Result<StepOutcome, PipelineError> {
    let op = match operation {
        NormalizedOperation::Canonical(op) => op,
        NormalizedOperation::Unrecognized { type_name, .. } => {
            return Err(PipelineError::UnsupportedOperationType {
                step: ctx.step,
                family: type_name.clone(),
            })
        }
    };
    let routine = Routine {
        engine,
        ctx,
        op,
        input,
    };
    let p = &op.params;
    let proposed_output = &output_path_for(operation, proposed_output);
    match op.family {
        OperationFamily::Resize => routine.resize(p, proposed_output),
        OperationFamily::Crop => routine.crop(p, proposed_output),
        OperationFamily::ShapeCrop => routine.shape_crop(p, proposed_output),
        OperationFamily::Rotate => routine.rotate(p, proposed_output),
        OperationFamily::Convert => routine.convert(p, proposed_output),
        OperationFamily::Watermark => routine.watermark(p, proposed_output),
        OperationFamily::Adjust => routine.adjust(p, proposed_output),
        OperationFamily::Trim => routine.trim(p, proposed_output),
        OperationFamily::Extent => routine.extent(p, proposed_output),
        OperationFamily::Flip => routine.finish(proposed_output, engine.flip(input, proposed_output)),
        OperationFamily::Flop => routine.finish(proposed_output, engine.flop(input, proposed_output)),
        OperationFamily::Transpose => {
            routine.finish(proposed_output, engine.transpose(input, proposed_output))
        }
        OperationFamily::Transverse => {
            routine.finish(proposed_output, engine.transverse(input, proposed_output))
        }
        OperationFamily::Filter => routine.filter(p, proposed_output),
        OperationFamily::Effect => routine.effect(p, proposed_output),
    }
}

struct Routine<'a> {
    engine: &'a dyn TransformEngine,
    ctx: &'a RoutineContext,
    op: &'a CanonicalOperation,
    input: &'a Path,
}

impl Routine<'_> {
    fn resize(&self, p: &ParamMap, output: &Path) -> Result<StepOutcome, PipelineError> {
        let width = param_dimension(p, "width");
        let height = param_dimension(p, "height");
        if width.is_none() && height.is_none() {
            return Err(self.missing("width"));
        }
        let options = ResizeOptions {
            width,
            height,
            quality: quality(p),
            maintain_aspect_ratio: param_bool(p, "maintainAspectRatio").unwrap_or(true),
        };
        self.finish(output, self.engine.resize(self.input, output, &options))
    }

    fn crop(&self, p: &ParamMap, output: &Path) -> Result<StepOutcome, PipelineError> {
        let options = CropOptions {
            x: param_i64(p, "x").unwrap_or(0),
            y: param_i64(p, "y").unwrap_or(0),
            width: param_dimension(p, "width").ok_or_else(|| self.missing("width"))?,
            height: param_dimension(p, "height").ok_or_else(|| self.missing("height"))?,
        };
        self.finish(output, self.engine.crop(self.input, output, &options))
    }

    fn shape_crop(&self, p: &ParamMap, output: &Path) -> Result<StepOutcome, PipelineError> {
        let shape = param_str(p, "shape")
            .and_then(|s| CropShape::parse(&s))
            .ok_or_else(|| self.missing("shape"))?;
        let options = ShapeCropOptions {
            shape,
            center_x: param_i64(p, "x"),
            center_y: param_i64(p, "y"),
            width: param_dimension(p, "width").unwrap_or(200),
            height: param_dimension(p, "height").unwrap_or(200),
            background_color: param_str(p, "backgroundColor")
                .unwrap_or_else(|| String::from("transparent")),
        };
        self.finish(output, self.engine.shape_crop(self.input, output, &options))
    }

    fn rotate(&self, p: &ParamMap, output: &Path) -> Result<StepOutcome, PipelineError> {
        let options = RotateOptions {
            degrees: param_f64(p, "degrees").unwrap_or(0.0),
            background_color: param_str(p, "backgroundColor")
                .unwrap_or_else(|| String::from("#000000")),
        };
        self.finish(output, self.engine.rotate(self.input, output, &options))
    }

    fn convert(&self, p: &ParamMap, output: &Path) -> Result<StepOutcome, PipelineError> {
        let options = ConvertOptions {
            format: convert_format(p),
            quality: quality(p),
        };
        self.finish(output, self.engine.convert(self.input, output, &options))
    }

    fn watermark(&self, p: &ParamMap, output: &Path) -> Result<StepOutcome, PipelineError> {
        let kind = param_str(p, "type").unwrap_or_else(|| String::from("text"));
        let content = if kind.eq_ignore_ascii_case("image") {
            let name = param_str(p, "watermarkImageFilename")
                .ok_or_else(|| self.missing("watermarkImageFilename"))?;
            WatermarkContent::Image {
                path: self.upload_path(&name)?,
                scale: param_f64(p, "watermarkScale")
                    .filter(|v| *v > 0.0)
                    .unwrap_or(1.0),
            }
        } else {
            WatermarkContent::Text {
                text: param_str(p, "text").ok_or_else(|| self.missing("text"))?,
                font_size: param_dimension(p, "fontSize").unwrap_or(24),
                font_family: param_str(p, "fontFamily")
                    .unwrap_or_else(|| String::from("DejaVu-Sans")),
                color: param_str(p, "color").unwrap_or_else(|| String::from("#FFFFFF")),
                stroke_color: param_str(p, "strokeColor"),
                stroke_width: param_dimension(p, "strokeWidth").unwrap_or(0),
            }
        };
        let options = WatermarkOptions {
            content,
            position: param_str(p, "position")
                .and_then(|v| WatermarkPosition::parse(&v))
                .unwrap_or(WatermarkPosition::BottomRight),
            x: param_i64(p, "x"),
            y: param_i64(p, "y"),
            opacity: param_f64(p, "opacity")
                .map(|v| v.clamp(0.0, 1.0))
                .unwrap_or(0.5),
        };
        self.finish(output, self.engine.watermark(self.input, output, &options))
    }

    fn adjust(&self, p: &ParamMap, output: &Path) -> Result<StepOutcome, PipelineError> {
        let options = AdjustOptions {
            brightness: param_f64(p, "brightness").unwrap_or(0.0),
            contrast: param_f64(p, "contrast").unwrap_or(0.0),
            saturation: param_f64(p, "saturation").unwrap_or(0.0),
        };
        self.finish(output, self.engine.adjust(self.input, output, &options))
    }

    fn trim(&self, p: &ParamMap, output: &Path) -> Result<StepOutcome, PipelineError> {
        let options = TrimOptions {
            fuzz_percent: param_f64(p, "fuzz")
                .map(|v| v.clamp(0.0, 100.0))
                .unwrap_or(0.0),
        };
        self.finish(output, self.engine.trim(self.input, output, &options))
    }

    fn extent(&self, p: &ParamMap, output: &Path) -> Result<StepOutcome, PipelineError> {
        let options = ExtentOptions {
            width: param_dimension(p, "width").ok_or_else(|| self.missing("width"))?,
            height: param_dimension(p, "height").ok_or_else(|| self.missing("height"))?,
            gravity: param_str(p, "gravity")
                .and_then(|g| gravity(&g))
                .unwrap_or("Center")
                .to_string(),
            background_color: param_str(p, "backgroundColor")
                .unwrap_or_else(|| String::from("white")),
        };
        self.finish(output, self.engine.extent(self.input, output, &options))
    }

    fn filter(&self, p: &ParamMap, output: &Path) -> Result<StepOutcome, PipelineError> {
        let filter_type = self
            .op
            .variant
            .clone()
            .or_else(|| param_str(p, "filterType"))
            .ok_or_else(|| self.missing("filterType"))?;
        let options = FilterOptions {
            filter_type,
            intensity: param_f64(p, "intensity").unwrap_or(1.0),
        };
        self.finish(output, self.engine.apply_filter(self.input, output, &options))
    }

    fn effect(&self, p: &ParamMap, output: &Path) -> Result<StepOutcome, PipelineError> {
        let effects = match p.get("effects") {
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| self.effect_from_item(item))
                .collect::<Result<Vec<_>, _>>()?,
            _ => {
                let effect_type = self
                    .op
                    .variant
                    .clone()
                    .or_else(|| param_str(p, "effectType"))
                    .ok_or_else(|| self.missing("effectType"))?;
                let mut params = p.clone();
                params.remove("effectType");
                vec![EffectSpec {
                    effect_type,
                    params,
                }]
            }
        };
        if effects.is_empty() {
            return Err(self.missing("effects"));
        }
        self.finish(output, self.engine.apply_effects(self.input, output, &effects))
    }

    fn effect_from_item(&self, item: &Value) -> Result<EffectSpec, PipelineError> {
        let mut params = item
            .as_object()
            .cloned()
            .ok_or_else(|| self.missing("effects"))?;
        let effect_type = param_str(&params, "type")
            .or_else(|| param_str(&params, "effectType"))
            .ok_or_else(|| self.missing("type"))?;
        params.remove("type");
        params.remove("effectType");
        Ok(EffectSpec {
            effect_type,
            params,
        })
    }

    fn upload_path(&self, name: &str) -> Result<PathBuf, PipelineError> {
        let unsafe_name = name.contains("..") || name.contains('/') || name.contains('\\');
        let path = self.ctx.uploads_dir.join(name);
        if unsafe_name || !path.is_file() {
            return Err(PipelineError::FileNotFound(name.to_string()));
        }
        Ok(path)
    }

    fn finish(
        &self,
        output: &Path,
        result: Result<String, EngineError>,
    ) -> Result<StepOutcome, PipelineError> {
        let command = result.map_err(|source| PipelineError::EngineInvocationFailed {
            step: self.ctx.step,
            family: self.op.family,
            source,
        })?;
        Ok(StepOutcome {
            command,
            output_path: output.to_path_buf(),
        })
    }

    fn missing(&self, parameter: &'static str) -> PipelineError {
        PipelineError::MissingRequiredParameter {
            step: self.ctx.step,
            family: self.op.family,
            parameter,
        }
    }
}

/// Requested output format, lowercased and without a leading dot.
pub fn target_format(params: &ParamMap) -> Option<String> {
    param_str(params, "format")
        .map(|f| f.trim_start_matches('.').to_ascii_lowercase())
        .filter(|f| !f.is_empty() && f.chars().all(|c| c.is_ascii_alphanumeric()))
}

fn convert_format(params: &ParamMap) -> String {
    target_format(params).unwrap_or_else(|| String::from("jpg"))
}

fn quality(params: &ParamMap) -> u32 {
    param_i64(params, "quality")
        .and_then(|q| u32::try_from(q.clamp(1, 100)).ok())
        .unwrap_or(90)
}

fn gravity(value: &str) -> Option<&'static str> {
    let wanted: String = value
        .chars()
        .filter(|c| *c != '-' && *c != '_')
        .collect();
    GRAVITIES
        .into_iter()
        .find(|g| g.eq_ignore_ascii_case(&wanted))
}

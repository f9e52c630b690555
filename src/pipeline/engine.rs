use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::pipeline::params::ParamMap;
use crate::pipeline::runtime::{
    CommandSpec, PipelineCommandRunner, PipelineRuntimeError, StdPipelineCommandRunner,
};

mod operators;
mod shapes;

pub use operators::FILTER_VARIANTS;
pub use shapes::CropShape;

#[derive(Debug, Clone, PartialEq)]
pub struct ResizeOptions {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub quality: u32,
    pub maintain_aspect_ratio: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CropOptions {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShapeCropOptions {
    pub shape: CropShape,
    pub center_x: Option<i64>,
    pub center_y: Option<i64>,
    pub width: u32,
    pub height: u32,
    pub background_color: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RotateOptions {
    pub degrees: f64,
    pub background_color: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConvertOptions {
    pub format: String,
    pub quality: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatermarkPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Center,
}

impl WatermarkPosition {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "top-left" => Some(Self::TopLeft),
            "top-right" => Some(Self::TopRight),
            "bottom-left" => Some(Self::BottomLeft),
            "bottom-right" => Some(Self::BottomRight),
            "center" => Some(Self::Center),
            _ => None,
        }
    }

    fn gravity(self) -> &'static str {
        match self {
            Self::TopLeft => "NorthWest",
            Self::TopRight => "NorthEast",
            Self::BottomLeft => "SouthWest",
            Self::BottomRight => "SouthEast",
            Self::Center => "Center",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WatermarkContent {
    Text {
        text: String,
        font_size: u32,
        font_family: String,
        color: String,
        stroke_color: Option<String>,
        stroke_width: u32,
    },
    Image {
        path: PathBuf,
        scale: f64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct WatermarkOptions {
    pub content: WatermarkContent,
    pub position: WatermarkPosition,
    pub x: Option<i64>,
    pub y: Option<i64>,
    pub opacity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdjustOptions {
    pub brightness: f64,
    pub contrast: f64,
    pub saturation: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrimOptions {
    pub fuzz_percent: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtentOptions {
    pub width: u32,
    pub height: u32,
    pub gravity: String,
    pub background_color: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterOptions {
    pub filter_type: String,
    pub intensity: f64,
}

/// One visual effect inside a chained effects invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectSpec {
    pub effect_type: String,
    pub params: ParamMap,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    pub installed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Pixel-transformation collaborator. Every call performs one blocking
/// transformation and returns a description of the command it ran.
pub trait TransformEngine: Send + Sync + 'static {
    fn resize(&self, input: &Path, output: &Path, options: &ResizeOptions)
        -> Result<String, EngineError>;
    fn crop(&self, input: &Path, output: &Path, options: &CropOptions)
        -> Result<String, EngineError>;
    fn shape_crop(
        &self,
        input: &Path,
        output: &Path,
        options: &ShapeCropOptions,
    ) -> Result<String, EngineError>;
    fn rotate(&self, input: &Path, output: &Path, options: &RotateOptions)
        -> Result<String, EngineError>;
    fn convert(
        &self,
        input: &Path,
        output: &Path,
        options: &ConvertOptions,
    ) -> Result<String, EngineError>;
    fn watermark(
        &self,
        input: &Path,
        output: &Path,
        options: &WatermarkOptions,
    ) -> Result<String, EngineError>;
    fn adjust(&self, input: &Path, output: &Path, options: &AdjustOptions)
        -> Result<String, EngineError>;
    fn trim(&self, input: &Path, output: &Path, options: &TrimOptions)
        -> Result<String, EngineError>;
    fn extent(&self, input: &Path, output: &Path, options: &ExtentOptions)
        -> Result<String, EngineError>;
    fn flip(&self, input: &Path, output: &Path) -> Result<String, EngineError>;
    fn flop(&self, input: &Path, output: &Path) -> Result<String, EngineError>;
    fn transpose(&self, input: &Path, output: &Path) -> Result<String, EngineError>;
    fn transverse(&self, input: &Path, output: &Path) -> Result<String, EngineError>;
    fn apply_filter(
        &self,
        input: &Path,
        output: &Path,
        options: &FilterOptions,
    ) -> Result<String, EngineError>;
    fn apply_effects(
        &self,
        input: &Path,
        output: &Path,
        effects: &[EffectSpec],
    ) -> Result<String, EngineError>;
    fn check_installation(&self) -> EngineStatus;
}

pub type SharedTransformEngine = Arc<dyn TransformEngine>;

/// ImageMagick-backed engine: one `magick` process per call.
#[derive(Debug, Clone)]
pub struct MagickEngine<R> {
    runner: R,
    binary: String,
}

impl<R> MagickEngine<R>
where
    R: PipelineCommandRunner,
{
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            binary: String::from("magick"),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn build_resize_command(
        &self,
        input: &Path,
        output: &Path,
        options: &ResizeOptions,
    ) -> CommandSpec {
        let mut geometry = format!(
            "{}x{}",
            options.width.map(|v| v.to_string()).unwrap_or_default(),
            options.height.map(|v| v.to_string()).unwrap_or_default()
        );
        if !options.maintain_aspect_ratio && options.width.is_some() && options.height.is_some() {
            geometry.push('!');
        }
        self.command(
            input,
            vec![
                String::from("-resize"),
                geometry,
                String::from("-quality"),
                options.quality.to_string(),
            ],
            output,
        )
    }

    pub fn build_crop_command(
        &self,
        input: &Path,
        output: &Path,
        options: &CropOptions,
    ) -> CommandSpec {
        self.command(
            input,
            vec![
                String::from("-crop"),
                format!(
                    "{}x{}{:+}{:+}",
                    options.width, options.height, options.x, options.y
                ),
                String::from("+repage"),
            ],
            output,
        )
    }

    pub fn build_shape_crop_command(
        &self,
        input: &Path,
        output: &Path,
        options: &ShapeCropOptions,
    ) -> CommandSpec {
        let (w, h) = (options.width, options.height);
        let mut args = Vec::new();
        match (options.center_x, options.center_y) {
            (Some(cx), Some(cy)) => {
                args.push(String::from("-crop"));
                args.push(format!(
                    "{w}x{h}{:+}{:+}",
                    cx - i64::from(w / 2),
                    cy - i64::from(h / 2)
                ));
            }
            _ => {
                args.extend(
                    ["-gravity", "center", "-crop"]
                        .into_iter()
                        .map(String::from),
                );
                args.push(format!("{w}x{h}+0+0"));
                args.push(String::from("+gravity"));
            }
        }
        args.push(String::from("+repage"));
        args.push(String::from("-alpha"));
        args.push(String::from("set"));
        args.push(String::from("("));
        args.push(String::from("-size"));
        args.push(format!("{w}x{h}"));
        args.push(String::from("xc:none"));
        args.push(String::from("-fill"));
        args.push(String::from("white"));
        args.push(String::from("-draw"));
        args.push(options.shape.draw_primitive(w, h));
        args.push(String::from(")"));
        args.push(String::from("-compose"));
        args.push(String::from("DstIn"));
        args.push(String::from("-composite"));
        if !options.background_color.eq_ignore_ascii_case("transparent")
            && !options.background_color.eq_ignore_ascii_case("none")
        {
            args.push(String::from("-background"));
            args.push(options.background_color.clone());
            args.push(String::from("-flatten"));
        }
        self.command(input, args, output)
    }

    pub fn build_rotate_command(
        &self,
        input: &Path,
        output: &Path,
        options: &RotateOptions,
    ) -> CommandSpec {
        self.command(
            input,
            vec![
                String::from("-background"),
                options.background_color.clone(),
                String::from("-rotate"),
                options.degrees.to_string(),
            ],
            output,
        )
    }

    pub fn build_convert_command(
        &self,
        input: &Path,
        output: &Path,
        options: &ConvertOptions,
    ) -> CommandSpec {
        self.command(
            input,
            vec![String::from("-quality"), options.quality.to_string()],
            output,
        )
    }

    pub fn build_watermark_command(
        &self,
        input: &Path,
        output: &Path,
        options: &WatermarkOptions,
    ) -> CommandSpec {
        let mut args = vec![String::from("(")];
        match &options.content {
            WatermarkContent::Text {
                text,
                font_size,
                font_family,
                color,
                stroke_color,
                stroke_width,
            } => {
                args.extend(
                    [
                        "-background",
                        "none",
                        "-fill",
                        color.as_str(),
                        "-font",
                        font_family.as_str(),
                        "-pointsize",
                    ]
                    .into_iter()
                    .map(String::from),
                );
                args.push(font_size.to_string());
                if let Some(stroke) = stroke_color.as_ref().filter(|_| *stroke_width > 0) {
                    args.push(String::from("-stroke"));
                    args.push(stroke.clone());
                    args.push(String::from("-strokewidth"));
                    args.push(stroke_width.to_string());
                }
                args.push(format!("label:{}", escape_label_text(text)));
            }
            WatermarkContent::Image { path, scale } => {
                args.push(path_arg(path.as_path()));
                args.push(String::from("-resize"));
                args.push(format!("{}%", scale * 100.0));
            }
        }
        args.extend(
            ["-alpha", "set", "-channel", "A", "-evaluate", "multiply"]
                .into_iter()
                .map(String::from),
        );
        args.push(options.opacity.to_string());
        args.push(String::from("+channel"));
        args.push(String::from(")"));

        let (gravity, geometry) = match (options.x, options.y) {
            (Some(x), Some(y)) => ("NorthWest", format!("{x:+}{y:+}")),
            _ if options.position == WatermarkPosition::Center => {
                (options.position.gravity(), String::from("+0+0"))
            }
            _ => (options.position.gravity(), String::from("+10+10")),
        };
        args.push(String::from("-gravity"));
        args.push(gravity.to_string());
        args.push(String::from("-geometry"));
        args.push(geometry);
        args.push(String::from("-composite"));
        self.command(input, args, output)
    }

    pub fn build_adjust_command(
        &self,
        input: &Path,
        output: &Path,
        options: &AdjustOptions,
    ) -> CommandSpec {
        self.command(
            input,
            vec![
                String::from("-brightness-contrast"),
                format!("{}x{}", options.brightness, options.contrast),
                String::from("-modulate"),
                format!("100,{}", 100.0 + options.saturation),
            ],
            output,
        )
    }

    pub fn build_trim_command(
        &self,
        input: &Path,
        output: &Path,
        options: &TrimOptions,
    ) -> CommandSpec {
        let mut args = Vec::new();
        if options.fuzz_percent > 0.0 {
            args.push(String::from("-fuzz"));
            args.push(format!("{}%", options.fuzz_percent));
        }
        args.push(String::from("-trim"));
        args.push(String::from("+repage"));
        self.command(input, args, output)
    }

    pub fn build_extent_command(
        &self,
        input: &Path,
        output: &Path,
        options: &ExtentOptions,
    ) -> CommandSpec {
        self.command(
            input,
            vec![
                String::from("-background"),
                options.background_color.clone(),
                String::from("-gravity"),
                options.gravity.clone(),
                String::from("-extent"),
                format!("{}x{}", options.width, options.height),
            ],
            output,
        )
    }

    pub fn build_orientation_command(
        &self,
        input: &Path,
        output: &Path,
        operator: &str,
    ) -> CommandSpec {
        self.command(input, vec![format!("-{operator}")], output)
    }

    pub fn build_filter_command(
        &self,
        input: &Path,
        output: &Path,
        options: &FilterOptions,
    ) -> Result<CommandSpec, EngineError> {
        Ok(self.command(input, operators::filter_args(options)?, output))
    }

    pub fn build_effects_command(
        &self,
        input: &Path,
        output: &Path,
        effects: &[EffectSpec],
    ) -> Result<CommandSpec, EngineError> {
        if effects.is_empty() {
            return Err(EngineError::InvalidOptions(String::from(
                "effects list must not be empty",
            )));
        }
        let mut args = Vec::new();
        for effect in effects {
            args.extend(operators::effect_args(effect)?);
        }
        Ok(self.command(input, args, output))
    }

    fn command(&self, input: &Path, operators: Vec<String>, output: &Path) -> CommandSpec {
        let mut args = Vec::with_capacity(operators.len() + 2);
        args.push(path_arg(input));
        args.extend(operators);
        args.push(path_arg(output));
        CommandSpec::new(self.binary.clone(), args)
    }

    fn run(&self, spec: CommandSpec) -> Result<String, EngineError> {
        let output = self.runner.run(&spec).map_err(EngineError::CommandRunner)?;
        if output.status_code != 0 {
            return Err(EngineError::CommandFailed {
                program: spec.program,
                status_code: output.status_code,
                stderr: output.stderr,
            });
        }
        Ok(spec.describe())
    }
}

impl<R> TransformEngine for MagickEngine<R>
where
    R: PipelineCommandRunner,
{
    fn resize(
        &self,
        input: &Path,
        output: &Path,
        options: &ResizeOptions,
    ) -> Result<String, EngineError> {
        self.run(self.build_resize_command(input, output, options))
    }

    fn crop(&self, input: &Path, output: &Path, options: &CropOptions) -> Result<String, EngineError> {
        self.run(self.build_crop_command(input, output, options))
    }

    fn shape_crop(
        &self,
        input: &Path,
        output: &Path,
        options: &ShapeCropOptions,
    ) -> Result<String, EngineError> {
        self.run(self.build_shape_crop_command(input, output, options))
    }

    fn rotate(
        &self,
        input: &Path,
        output: &Path,
        options: &RotateOptions,
    ) -> Result<String, EngineError> {
        self.run(self.build_rotate_command(input, output, options))
    }

    fn convert(
        &self,
        input: &Path,
        output: &Path,
        options: &ConvertOptions,
    ) -> Result<String, EngineError> {
        self.run(self.build_convert_command(input, output, options))
    }

    fn watermark(
        &self,
        input: &Path,
        output: &Path,
        options: &WatermarkOptions,
    ) -> Result<String, EngineError> {
        self.run(self.build_watermark_command(input, output, options))
    }

    fn adjust(
        &self,
        input: &Path,
        output: &Path,
        options: &AdjustOptions,
    ) -> Result<String, EngineError> {
        self.run(self.build_adjust_command(input, output, options))
    }

    fn trim(&self, input: &Path, output: &Path, options: &TrimOptions) -> Result<String, EngineError> {
        self.run(self.build_trim_command(input, output, options))
    }

    fn extent(
        &self,
        input: &Path,
        output: &Path,
        options: &ExtentOptions,
    ) -> Result<String, EngineError> {
        self.run(self.build_extent_command(input, output, options))
    }

    fn flip(&self, input: &Path, output: &Path) -> Result<String, EngineError> {
        self.run(self.build_orientation_command(input, output, "flip"))
    }

    fn flop(&self, input: &Path, output: &Path) -> Result<String, EngineError> {
        self.run(self.build_orientation_command(input, output, "flop"))
    }

    fn transpose(&self, input: &Path, output: &Path) -> Result<String, EngineError> {
        self.run(self.build_orientation_command(input, output, "transpose"))
    }

    fn transverse(&self, input: &Path, output: &Path) -> Result<String, EngineError> {
        self.run(self.build_orientation_command(input, output, "transverse"))
    }

    fn apply_filter(
        &self,
        input: &Path,
        output: &Path,
        options: &FilterOptions,
    ) -> Result<String, EngineError> {
        self.run(self.build_filter_command(input, output, options)?)
    }

    fn apply_effects(
        &self,
        input: &Path,
        output: &Path,
        effects: &[EffectSpec],
    ) -> Result<String, EngineError> {
        self.run(self.build_effects_command(input, output, effects)?)
    }

    fn check_installation(&self) -> EngineStatus {
        let spec = CommandSpec::new(self.binary.clone(), vec![String::from("-version")]);
        match self.runner.run(&spec) {
            Ok(output) if output.status_code == 0 => EngineStatus {
                installed: true,
                version: output
                    .stdout
                    .lines()
                    .next()
                    .map(|line| line.trim().to_string())
                    .filter(|line| !line.is_empty()),
                error: None,
            },
            Ok(output) => EngineStatus {
                installed: false,
                version: None,
                error: Some(format!(
                    "{} -version exited with {}: {}",
                    spec.program,
                    output.status_code,
                    output.stderr.trim()
                )),
            },
            Err(err) => EngineStatus {
                installed: false,
                version: None,
                error: Some(err.to_string()),
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine command runner error: {0}")]
    CommandRunner(#[source] PipelineRuntimeError),
    #[error("engine command failed ({program}) with exit code {status_code}: {stderr}")]
    CommandFailed {
        program: String,
        status_code: i32,
        stderr: String,
    },
    #[error("invalid engine options: {0}")]
    InvalidOptions(String),
    #[error("engine task did not complete: {0}")]
    Interrupted(String),
}

pub fn default_magick_engine(binary: &str) -> MagickEngine<StdPipelineCommandRunner> {
    MagickEngine::new(StdPipelineCommandRunner).with_binary(binary)
}

/// `label:@file` makes ImageMagick read the label from disk; a leading `@`
/// must be escaped so caller text is always rendered literally.
fn escape_label_text(text: &str) -> String {
    match text.strip_prefix('@') {
        Some(rest) => format!("\\@{rest}"),
        None => text.to_string(),
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

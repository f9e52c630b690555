#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use image::{DynamicImage, ImageBuffer, Rgb};
use url::Url;
use uuid::Uuid;

use image_chain_backend::pipeline::acquire::{
    FetchError, FetchedResource, RemoteFetcher, ResourceResolver,
};
use image_chain_backend::pipeline::aliases::AliasTable;
use image_chain_backend::pipeline::engine::{
    AdjustOptions, ConvertOptions, CropOptions, EffectSpec, EngineError, EngineStatus,
    ExtentOptions, FilterOptions, ResizeOptions, RotateOptions, ShapeCropOptions,
    TransformEngine, TrimOptions, WatermarkOptions,
};
use image_chain_backend::pipeline::service::ImageProcessService;
use image_chain_backend::storage::StorageLayout;

/// Engine double that performs real pixel work with the `image` crate.
#[derive(Clone)]
pub struct ImageEngine {
    outputs: Arc<Mutex<Vec<PathBuf>>>,
    calls: Arc<AtomicUsize>,
    fail_on: Option<usize>,
    installed: bool,
}

impl ImageEngine {
    pub fn new() -> Self {
        Self {
            outputs: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(AtomicUsize::new(0)),
            fail_on: None,
            installed: true,
        }
    }

    pub fn failing_on(call: usize) -> Self {
        Self {
            fail_on: Some(call),
            ..Self::new()
        }
    }

    pub fn not_installed() -> Self {
        Self {
            installed: false,
            ..Self::new()
        }
    }

    pub fn outputs(&self) -> Vec<PathBuf> {
        self.outputs.lock().expect("engine mutex poisoned").clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn apply(
        &self,
        name: &str,
        input: &Path,
        output: &Path,
        transform: impl FnOnce(DynamicImage) -> DynamicImage,
    ) -> Result<String, EngineError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.outputs
            .lock()
            .expect("engine mutex poisoned")
            .push(output.to_path_buf());
        let img = image::open(input).map_err(|e| EngineError::InvalidOptions(e.to_string()))?;
        save(transform(img), output)?;
        if self.fail_on == Some(call) {
            return Err(EngineError::CommandFailed {
                program: String::from("magick"),
                status_code: 1,
                stderr: String::from("simulated failure"),
            });
        }
        Ok(format!("{name} {} {}", input.display(), output.display()))
    }
}

impl TransformEngine for ImageEngine {
    fn resize(&self, i: &Path, o: &Path, opts: &ResizeOptions) -> Result<String, EngineError> {
        let opts = opts.clone();
        self.apply("resize", i, o, move |img| {
            let w = opts.width.unwrap_or(u32::MAX);
            let h = opts.height.unwrap_or(u32::MAX);
            if opts.maintain_aspect_ratio || opts.width.is_none() || opts.height.is_none() {
                img.resize(w, h, image::imageops::FilterType::Triangle)
            } else {
                img.resize_exact(w, h, image::imageops::FilterType::Triangle)
            }
        })
    }

    fn crop(&self, i: &Path, o: &Path, opts: &CropOptions) -> Result<String, EngineError> {
        let opts = opts.clone();
        self.apply("crop", i, o, move |img| {
            img.crop_imm(opts.x.max(0) as u32, opts.y.max(0) as u32, opts.width, opts.height)
        })
    }

    fn shape_crop(&self, i: &Path, o: &Path, opts: &ShapeCropOptions) -> Result<String, EngineError> {
        let (w, h) = (opts.width, opts.height);
        self.apply("shapeCrop", i, o, move |img| {
            let x = img.width().saturating_sub(w) / 2;
            let y = img.height().saturating_sub(h) / 2;
            DynamicImage::ImageRgba8(img.crop_imm(x, y, w, h).to_rgba8())
        })
    }

    fn rotate(&self, i: &Path, o: &Path, opts: &RotateOptions) -> Result<String, EngineError> {
        let degrees = opts.degrees.rem_euclid(360.0) as u32;
        self.apply("rotate", i, o, move |img| match degrees {
            90 => img.rotate90(),
            180 => img.rotate180(),
            270 => img.rotate270(),
            _ => img,
        })
    }

    fn convert(&self, i: &Path, o: &Path, _: &ConvertOptions) -> Result<String, EngineError> {
        self.apply("convert", i, o, |img| img)
    }

    fn watermark(&self, i: &Path, o: &Path, _: &WatermarkOptions) -> Result<String, EngineError> {
        self.apply("watermark", i, o, |img| img)
    }

    fn adjust(&self, i: &Path, o: &Path, opts: &AdjustOptions) -> Result<String, EngineError> {
        let brightness = opts.brightness as i32;
        self.apply("adjust", i, o, move |img| img.brighten(brightness))
    }

    fn trim(&self, i: &Path, o: &Path, _: &TrimOptions) -> Result<String, EngineError> {
        self.apply("trim", i, o, |img| img)
    }

    fn extent(&self, i: &Path, o: &Path, opts: &ExtentOptions) -> Result<String, EngineError> {
        let (w, h) = (opts.width, opts.height);
        self.apply("extent", i, o, move |img| {
            let mut canvas = DynamicImage::new_rgba8(w, h);
            image::imageops::overlay(&mut canvas, &img, 0, 0);
            canvas
        })
    }

    fn flip(&self, i: &Path, o: &Path) -> Result<String, EngineError> {
        self.apply("flip", i, o, |img| img.flipv())
    }

    fn flop(&self, i: &Path, o: &Path) -> Result<String, EngineError> {
        self.apply("flop", i, o, |img| img.fliph())
    }

    fn transpose(&self, i: &Path, o: &Path) -> Result<String, EngineError> {
        self.apply("transpose", i, o, |img| img.rotate90().fliph())
    }

    fn transverse(&self, i: &Path, o: &Path) -> Result<String, EngineError> {
        self.apply("transverse", i, o, |img| img.rotate270().fliph())
    }

    fn apply_filter(&self, i: &Path, o: &Path, opts: &FilterOptions) -> Result<String, EngineError> {
        let spec = EffectSpec {
            effect_type: opts.filter_type.clone(),
            params: Default::default(),
        };
        self.apply_effects(i, o, &[spec])
    }

    fn apply_effects(&self, i: &Path, o: &Path, effects: &[EffectSpec]) -> Result<String, EngineError> {
        for effect in effects {
            if !matches!(effect.effect_type.as_str(), "grayscale" | "negate" | "blur") {
                return Err(EngineError::InvalidOptions(format!(
                    "unsupported effect '{}'",
                    effect.effect_type
                )));
            }
        }
        let names: Vec<String> = effects.iter().map(|e| e.effect_type.clone()).collect();
        self.apply("effects", i, o, move |mut img| {
            for name in &names {
                img = match name.as_str() {
                    "grayscale" => DynamicImage::ImageLuma8(img.to_luma8()),
                    "negate" => {
                        img.invert();
                        img
                    }
                    _ => img.blur(2.0),
                };
            }
            img
        })
    }

    fn check_installation(&self) -> EngineStatus {
        EngineStatus {
            installed: self.installed,
            version: self.installed.then(|| String::from("image-crate double")),
            error: (!self.installed).then(|| String::from("magick not found")),
        }
    }
}

fn save(img: DynamicImage, output: &Path) -> Result<(), EngineError> {
    let is_jpeg = output
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"));
    let img = if is_jpeg && img.color().has_alpha() {
        DynamicImage::ImageRgb8(img.to_rgb8())
    } else {
        img
    };
    img.save(output)
        .map_err(|e| EngineError::InvalidOptions(e.to_string()))
}

/// Serves canned bytes for any URL, or a fixed failure.
pub struct StubFetcher {
    result: Result<FetchedResource, FetchError>,
}

impl StubFetcher {
    pub fn serving(bytes: Vec<u8>, content_type: &str) -> Arc<Self> {
        Arc::new(Self {
            result: Ok(FetchedResource {
                bytes,
                content_type: Some(content_type.to_string()),
            }),
        })
    }

    pub fn failing(err: FetchError) -> Arc<Self> {
        Arc::new(Self { result: Err(err) })
    }
}

impl RemoteFetcher for StubFetcher {
    fn fetch(&self, _url: &Url) -> Result<FetchedResource, FetchError> {
        self.result.clone()
    }
}

pub struct Workspace {
    pub root: PathBuf,
    pub layout: StorageLayout,
}

impl Workspace {
    pub fn new(label: &str) -> Self {
        let root = std::env::temp_dir().join(format!("image_chain_{label}_{}", Uuid::new_v4()));
        let layout = StorageLayout::new(root.join("uploads"), root.join("output"));
        layout.ensure_dirs().expect("workspace dirs must be creatable");
        Self { root, layout }
    }

    /// Writes a `width`x`height` colour gradient into the uploads area.
    pub fn seed_image(&self, name: &str, width: u32, height: u32) -> PathBuf {
        let path = self.layout.uploads_dir.join(name);
        gradient(width, height)
            .save(&path)
            .expect("seed image must be writable");
        path
    }

    pub fn output_files(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(&self.layout.output_dir)
            .expect("output dir must be readable")
            .filter_map(Result::ok)
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    pub fn service(&self, engine: ImageEngine, fetcher: Arc<dyn RemoteFetcher>) -> ImageProcessService {
        ImageProcessService::new(
            ResourceResolver::new(self.layout.uploads_dir.clone(), fetcher),
            Arc::new(engine),
            Arc::new(AliasTable::builtin()),
            self.layout.output_dir.clone(),
            "processed_",
        )
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
    }
}

pub fn gradient(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 180])
    }))
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut out = std::io::Cursor::new(Vec::new());
    gradient(width, height)
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("png encoding must succeed");
    out.into_inner()
}

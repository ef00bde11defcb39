//! Classifier adapter.
//!
//! Built exactly once at startup from an ordered list of runtime probes and
//! then only read. Whatever happens during loading, the outcome is one
//! [`ClassifierState`] variant for the rest of the process: either a loaded
//! model, or a permanent reason why the heuristic path is the only path.

pub mod runtime;

use std::fmt;
use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::decoder::{bt601_gray, DecodedImage};
use crate::error::{AnalysisError, ModelLoadError};

pub use runtime::compiled_runtimes;

// ==========================================
// Model description
// ==========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    /// Normalised floats in [0, 1].
    F32,
    /// Raw 8-bit intensities.
    U8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Nhwc,
    Nchw,
}

/// Spatial input the model expects for one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputShape {
    pub height: u32,
    pub width: u32,
    pub channels: u32,
    pub layout: Layout,
}

impl InputShape {
    /// Read a rank-4 image input. Channels-last is assumed unless only the
    /// second dimension looks like a channel count.
    pub fn from_dims(dims: &[usize]) -> Option<Self> {
        let &[_, d1, d2, d3] = dims else {
            return None;
        };
        let is_channels = |d: usize| d == 1 || d == 3;

        let (height, width, channels, layout) = if is_channels(d3) {
            (d1, d2, d3, Layout::Nhwc)
        } else if is_channels(d1) {
            (d2, d3, d1, Layout::Nchw)
        } else {
            return None;
        };

        if height == 0 || width == 0 {
            return None;
        }

        Some(Self {
            height: u32::try_from(height).ok()?,
            width: u32::try_from(width).ok()?,
            channels: channels as u32,
            layout,
        })
    }

    /// Batch-of-one tensor dimensions in this shape's layout.
    pub fn tensor_dims(&self) -> Vec<usize> {
        let (h, w, c) = (self.height as usize, self.width as usize, self.channels as usize);
        match self.layout {
            Layout::Nhwc => vec![1, h, w, c],
            Layout::Nchw => vec![1, c, h, w],
        }
    }
}

/// What a loaded model declares about its tensors. `input` is `None` when
/// the declared input shape could not be read; such a model never runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub input: Option<InputShape>,
    pub input_type: ElementType,
    pub output_shape: Option<Vec<usize>>,
}

// ==========================================
// Tensors and the backend seam
// ==========================================

#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    F32(Vec<f32>),
    U8(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    pub dims: Vec<usize>,
    pub data: TensorData,
}

/// One forward pass over a prepared tensor, returning the first scalar of
/// the first output. Implementations must be shareable across request threads.
pub trait InferenceBackend: Send + Sync {
    fn forward(&self, input: InputTensor) -> Result<f32, AnalysisError>;
}

pub struct LoadedClassifier {
    runtime: &'static str,
    spec: ModelSpec,
    backend: Box<dyn InferenceBackend>,
}

impl LoadedClassifier {
    pub fn new(runtime: &'static str, spec: ModelSpec, backend: Box<dyn InferenceBackend>) -> Self {
        Self { runtime, spec, backend }
    }

    pub fn runtime(&self) -> &'static str {
        self.runtime
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }
}

impl fmt::Debug for LoadedClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedClassifier")
            .field("runtime", &self.runtime)
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

// ==========================================
// Startup probing
// ==========================================

/// An inference runtime compiled into this build.
#[derive(Clone, Copy)]
pub struct RuntimeProbe {
    pub name: &'static str,
    pub load: fn(&Path) -> Result<LoadedClassifier, ModelLoadError>,
}

impl fmt::Debug for RuntimeProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeProbe").field("name", &self.name).finish()
    }
}

#[derive(Debug)]
pub enum ClassifierState {
    Loaded(LoadedClassifier),
    /// No inference runtime compiled in.
    RuntimeMissing,
    /// No path configured, or nothing at the configured path.
    ArtifactMissing { path: Option<PathBuf> },
    /// Every runtime rejected the artifact.
    LoadFailed { reason: String },
}

impl ClassifierState {
    /// Evaluate the probes in order against the artifact. Called once; the
    /// result is never revisited for the lifetime of the process.
    pub fn initialize(model_path: Option<&Path>, probes: &[RuntimeProbe]) -> Self {
        if probes.is_empty() {
            info!("no inference runtime compiled in, classifier disabled");
            return Self::RuntimeMissing;
        }

        let Some(path) = model_path.filter(|p| p.exists()) else {
            info!(path = ?model_path, "no model artifact found, classifier disabled");
            return Self::ArtifactMissing {
                path: model_path.map(Path::to_path_buf),
            };
        };

        let mut last_failure = None;
        for probe in probes {
            match (probe.load)(path) {
                Ok(loaded) => {
                    info!(
                        runtime = probe.name,
                        path = %path.display(),
                        spec = ?loaded.spec,
                        "classifier loaded"
                    );
                    return Self::Loaded(loaded);
                }
                Err(e) => {
                    warn!(runtime = probe.name, path = %path.display(), error = %e, "runtime rejected model");
                    last_failure = Some(e);
                }
            }
        }

        Self::LoadFailed {
            reason: last_failure.map(|e| e.to_string()).unwrap_or_default(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }

    pub fn runtime(&self) -> Option<&'static str> {
        match self {
            Self::Loaded(model) => Some(model.runtime),
            _ => None,
        }
    }

    pub fn status_label(&self) -> &'static str {
        match self {
            Self::Loaded(_) => "loaded",
            Self::RuntimeMissing => "runtime_missing",
            Self::ArtifactMissing { .. } => "artifact_missing",
            Self::LoadFailed { .. } => "load_failed",
        }
    }

    /// Run the classifier on one image.
    ///
    /// `Ok(None)` means "use the heuristic": the classifier is not loaded or
    /// its input shape is unreadable. Errors are inference failures for this
    /// request only.
    pub fn preprocess_and_infer(&self, image: &DecodedImage) -> Result<Option<f64>, AnalysisError> {
        let Self::Loaded(model) = self else {
            return Ok(None);
        };

        let Some(input) = preprocess(image, &model.spec) else {
            debug!(runtime = model.runtime, "model input shape unreadable, falling back");
            return Ok(None);
        };

        let raw = model.backend.forward(input)?;
        if raw.is_nan() {
            return Err(AnalysisError::Inference("classifier returned NaN".to_string()));
        }
        if !(0.0..=1.0).contains(&raw) {
            warn!(raw, runtime = model.runtime, "classifier output outside [0, 1], clamping");
        }

        Ok(Some(f64::from(raw.clamp(0.0, 1.0))))
    }
}

/// Resize to the model's input, optionally collapse to grayscale, normalise
/// to [0, 1] and lay the values out for the model.
///
/// Three-channel models receive blue, green, red per pixel.
pub fn preprocess(image: &DecodedImage, spec: &ModelSpec) -> Option<InputTensor> {
    let shape = spec.input?;

    let resized = imageops::resize(image.color(), shape.width, shape.height, FilterType::Triangle);
    let interleaved: Vec<f32> = match shape.channels {
        1 => bt601_gray(&resized)
            .into_raw()
            .into_iter()
            .map(|v| f32::from(v) / 255.0)
            .collect(),
        3 => resized
            .pixels()
            .flat_map(|p| {
                let [r, g, b] = p.0;
                [b, g, r]
            })
            .map(|v| f32::from(v) / 255.0)
            .collect(),
        _ => return None,
    };

    let ordered = match shape.layout {
        Layout::Nhwc => interleaved,
        Layout::Nchw => to_planar(&interleaved, shape.channels as usize),
    };

    let data = match spec.input_type {
        ElementType::F32 => TensorData::F32(ordered),
        // Back to 0..=255 and truncated, the same way the float path was derived.
        ElementType::U8 => TensorData::U8(ordered.into_iter().map(|v| (v * 255.0) as u8).collect()),
    };

    Some(InputTensor {
        dims: shape.tensor_dims(),
        data,
    })
}

fn to_planar(interleaved: &[f32], channels: usize) -> Vec<f32> {
    let pixels = interleaved.len() / channels;
    let mut planar = Vec::with_capacity(interleaved.len());
    for c in 0..channels {
        planar.extend((0..pixels).map(|p| interleaved[p * channels + c]));
    }
    planar
}


#[cfg(test)]
mod tests {
    use super::stub::*;
    use super::*;
    use crate::test_images;

    fn image() -> DecodedImage {
        DecodedImage::from_rgb(test_images::textured(50, 30))
    }

    #[test]
    fn reads_channels_last_shape() {
        let shape = InputShape::from_dims(&[1, 224, 160, 3]).unwrap();
        assert_eq!((shape.height, shape.width, shape.channels), (224, 160, 3));
        assert_eq!(shape.layout, Layout::Nhwc);
        assert_eq!(shape.tensor_dims(), vec![1, 224, 160, 3]);
    }

    #[test]
    fn reads_channels_first_shape() {
        let shape = InputShape::from_dims(&[1, 1, 64, 48]).unwrap();
        assert_eq!((shape.height, shape.width, shape.channels), (64, 48, 1));
        assert_eq!(shape.layout, Layout::Nchw);
        assert_eq!(shape.tensor_dims(), vec![1, 1, 64, 48]);
    }

    #[test]
    fn rejects_unreadable_shapes() {
        assert!(InputShape::from_dims(&[1, 224, 224]).is_none());
        assert!(InputShape::from_dims(&[1, 224, 224, 4]).is_none());
        assert!(InputShape::from_dims(&[1, 0, 224, 3]).is_none());
    }

    #[test]
    fn preprocess_float_rgb() {
        let spec = spec(&[1, 16, 8, 3], ElementType::F32);
        let tensor = preprocess(&image(), &spec).unwrap();

        assert_eq!(tensor.dims, vec![1, 16, 8, 3]);
        let TensorData::F32(values) = tensor.data else {
            panic!("expected f32 tensor");
        };
        assert_eq!(values.len(), 16 * 8 * 3);
        assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn preprocess_u8_grayscale() {
        let white = DecodedImage::from_rgb(test_images::uniform(20, 20, [255, 255, 255]));
        let spec = spec(&[1, 10, 10, 1], ElementType::U8);
        let tensor = preprocess(&white, &spec).unwrap();

        assert_eq!(tensor.dims, vec![1, 10, 10, 1]);
        assert_eq!(tensor.data, TensorData::U8(vec![255; 100]));
    }

    #[test]
    fn preprocess_channels_first_is_planar() {
        let red = DecodedImage::from_rgb(test_images::uniform(6, 6, [255, 0, 0]));
        let spec = spec(&[1, 3, 2, 2], ElementType::F32);
        let tensor = preprocess(&red, &spec).unwrap();

        assert_eq!(
            tensor.data,
            TensorData::F32(vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0])
        );
    }

    #[test]
    fn preprocess_colour_is_blue_green_red() {
        let red = DecodedImage::from_rgb(test_images::uniform(4, 4, [255, 0, 0]));
        let tensor = preprocess(&red, &spec(&[1, 2, 2, 3], ElementType::F32)).unwrap();

        let TensorData::F32(values) = tensor.data else {
            panic!("expected f32 tensor");
        };
        assert_eq!(&values[..3], &[0.0, 0.0, 1.0]);
        assert!(values.chunks(3).all(|px| px == [0.0, 0.0, 1.0]));
    }

    #[test]
    fn preprocess_single_channel_uses_bt601_luma() {
        let red = DecodedImage::from_rgb(test_images::uniform(4, 4, [255, 0, 0]));
        let tensor = preprocess(&red, &spec(&[1, 2, 2, 1], ElementType::F32)).unwrap();
        assert_eq!(tensor.data, TensorData::F32(vec![76.0 / 255.0; 4]));
    }

    #[test]
    fn unreadable_shape_falls_through() {
        let state = ClassifierState::Loaded(LoadedClassifier::new(
            "stub",
            spec(&[1, 7, 7, 5], ElementType::F32),
            Box::new(FixedBackend(0.9)),
        ));
        assert_eq!(state.preprocess_and_infer(&image()), Ok(None));
    }

    #[test]
    fn absent_classifier_yields_none() {
        let state = ClassifierState::RuntimeMissing;
        assert_eq!(state.preprocess_and_infer(&image()), Ok(None));
    }

    #[test]
    fn loaded_classifier_reports_confidence() {
        let confidence = loaded(0.73).preprocess_and_infer(&image()).unwrap().unwrap();
        assert!((confidence - 0.73).abs() < 1e-6);
    }

    #[test]
    fn out_of_range_output_is_clamped() {
        assert_eq!(loaded(1.7).preprocess_and_infer(&image()), Ok(Some(1.0)));
        assert_eq!(loaded(-0.2).preprocess_and_infer(&image()), Ok(Some(0.0)));
    }

    #[test]
    fn nan_output_is_an_error() {
        assert!(loaded(f32::NAN).preprocess_and_infer(&image()).is_err());
    }

    #[test]
    fn backend_failure_is_an_error() {
        let state = ClassifierState::Loaded(LoadedClassifier::new(
            "stub",
            spec(&[1, 8, 8, 3], ElementType::F32),
            Box::new(FailingBackend),
        ));
        assert!(matches!(
            state.preprocess_and_infer(&image()),
            Err(AnalysisError::Inference(_))
        ));
    }

    // ---- initialisation ----

    fn load_ok(_: &Path) -> Result<LoadedClassifier, ModelLoadError> {
        Ok(LoadedClassifier::new(
            "ok-runtime",
            spec(&[1, 8, 8, 3], ElementType::F32),
            Box::new(FixedBackend(0.5)),
        ))
    }

    fn load_err(_: &Path) -> Result<LoadedClassifier, ModelLoadError> {
        Err(ModelLoadError::Load {
            runtime: "bad-runtime",
            message: "not a model".to_string(),
        })
    }

    fn existing_file() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("Cargo.toml")
    }

    #[test]
    fn no_runtime_means_runtime_missing() {
        let state = ClassifierState::initialize(Some(&existing_file()), &[]);
        assert!(matches!(state, ClassifierState::RuntimeMissing));
    }

    #[test]
    fn missing_path_means_artifact_missing() {
        let probes = [RuntimeProbe { name: "ok", load: load_ok }];

        let state = ClassifierState::initialize(None, &probes);
        assert!(matches!(state, ClassifierState::ArtifactMissing { path: None }));

        let nowhere = Path::new("/definitely/not/here/forgery_model.tflite");
        let state = ClassifierState::initialize(Some(nowhere), &probes);
        assert_eq!(state.status_label(), "artifact_missing");
    }

    #[test]
    fn probes_are_tried_in_order() {
        let probes = [
            RuntimeProbe { name: "bad", load: load_err },
            RuntimeProbe { name: "ok", load: load_ok },
        ];
        let state = ClassifierState::initialize(Some(&existing_file()), &probes);
        assert_eq!(state.runtime(), Some("ok-runtime"));
    }

    #[test]
    fn all_probes_failing_means_load_failed() {
        let probes = [RuntimeProbe { name: "bad", load: load_err }];
        let state = ClassifierState::initialize(Some(&existing_file()), &probes);

        let ClassifierState::LoadFailed { reason } = state else {
            panic!("expected LoadFailed");
        };
        assert!(reason.contains("not a model"));
    }
}

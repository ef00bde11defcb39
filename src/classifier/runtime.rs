//! Concrete inference runtimes, each behind its own cargo feature.
//!
//! Order matters: the embedded tflite runtime is probed first, the general
//! onnx runtime second. A build with neither feature has no runtime at all.

use super::RuntimeProbe;

#[cfg(any(feature = "tflite", feature = "onnx"))]
use std::{fmt::Display, path::Path};

#[cfg(any(feature = "tflite", feature = "onnx"))]
use tract_core::prelude::*;

#[cfg(any(feature = "tflite", feature = "onnx"))]
use super::{ElementType, InferenceBackend, InputShape, InputTensor, LoadedClassifier, ModelSpec, TensorData};
#[cfg(any(feature = "tflite", feature = "onnx"))]
use crate::error::{AnalysisError, ModelLoadError};

#[cfg(feature = "tflite")]
const TFLITE: &str = "tract-tflite";
#[cfg(feature = "onnx")]
const ONNX: &str = "tract-onnx";

/// Runtimes compiled into this build, in probing order.
pub fn compiled_runtimes() -> Vec<RuntimeProbe> {
    [tflite_runtime(), onnx_runtime()].into_iter().flatten().collect()
}

#[cfg(feature = "tflite")]
fn tflite_runtime() -> Option<RuntimeProbe> {
    Some(RuntimeProbe {
        name: TFLITE,
        load: load_tflite,
    })
}

#[cfg(not(feature = "tflite"))]
fn tflite_runtime() -> Option<RuntimeProbe> {
    None
}

#[cfg(feature = "onnx")]
fn onnx_runtime() -> Option<RuntimeProbe> {
    Some(RuntimeProbe {
        name: ONNX,
        load: load_onnx,
    })
}

#[cfg(not(feature = "onnx"))]
fn onnx_runtime() -> Option<RuntimeProbe> {
    None
}

#[cfg(feature = "tflite")]
fn load_tflite(path: &Path) -> Result<LoadedClassifier, ModelLoadError> {
    let model = tract_tflite::tflite()
        .model_for_path(path)
        .map_err(|e| load_error(TFLITE, e))?;
    finish(TFLITE, model)
}

#[cfg(feature = "onnx")]
fn load_onnx(path: &Path) -> Result<LoadedClassifier, ModelLoadError> {
    use tract_onnx::prelude::InferenceModelExt;

    let model = tract_onnx::onnx()
        .model_for_path(path)
        .and_then(|m| m.into_typed())
        .map_err(|e| load_error(ONNX, e))?;
    finish(ONNX, model)
}

#[cfg(any(feature = "tflite", feature = "onnx"))]
fn load_error(runtime: &'static str, e: impl Display) -> ModelLoadError {
    ModelLoadError::Load {
        runtime,
        message: e.to_string(),
    }
}

/// Read the tensor facts, then optimise the graph into a runnable plan.
#[cfg(any(feature = "tflite", feature = "onnx"))]
fn finish(runtime: &'static str, model: TypedModel) -> Result<LoadedClassifier, ModelLoadError> {
    let input_fact = model.input_fact(0).map_err(|e| load_error(runtime, e))?.clone();

    let input_type = match input_fact.datum_type {
        DatumType::F32 => ElementType::F32,
        DatumType::U8 => ElementType::U8,
        other => return Err(ModelLoadError::UnsupportedInputType(format!("{other:?}"))),
    };
    let input = input_fact.shape.as_concrete().and_then(InputShape::from_dims);
    let output_shape = model
        .output_fact(0)
        .ok()
        .and_then(|f| f.shape.as_concrete().map(|s| s.to_vec()));

    let plan = model
        .into_optimized()
        .and_then(|m| m.into_runnable())
        .map_err(|e| load_error(runtime, e))?;

    let spec = ModelSpec {
        input,
        input_type,
        output_shape,
    };
    Ok(LoadedClassifier::new(runtime, spec, Box::new(TractBackend { plan })))
}

#[cfg(any(feature = "tflite", feature = "onnx"))]
struct TractBackend {
    plan: TypedRunnableModel<TypedModel>,
}

#[cfg(any(feature = "tflite", feature = "onnx"))]
impl InferenceBackend for TractBackend {
    fn forward(&self, input: InputTensor) -> Result<f32, AnalysisError> {
        let tensor = match &input.data {
            TensorData::F32(values) => Tensor::from_shape(&input.dims, values.as_slice()),
            TensorData::U8(values) => Tensor::from_shape(&input.dims, values.as_slice()),
        }
        .map_err(inference_error)?;

        let outputs = self.plan.run(tvec!(tensor.into())).map_err(inference_error)?;
        let first = outputs
            .first()
            .ok_or_else(|| AnalysisError::Inference("model produced no outputs".to_string()))?;

        // Raw 8-bit scores are read on the same [0, 1] scale as float ones.
        let scale = if first.datum_type() == DatumType::U8 { 1.0 / 255.0 } else { 1.0 };
        let as_float = first.cast_to::<f32>().map_err(inference_error)?;
        let value = as_float
            .as_slice::<f32>()
            .map_err(inference_error)?
            .first()
            .copied()
            .ok_or_else(|| AnalysisError::Inference("model output is empty".to_string()))?;

        Ok(value * scale)
    }
}

#[cfg(any(feature = "tflite", feature = "onnx"))]
fn inference_error(e: impl Display) -> AnalysisError {
    AnalysisError::Inference(e.to_string())
}

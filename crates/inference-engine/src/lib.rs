//! ONNX Inference Engine
//!
//! Classifies cabin camera frames into driver states using tract-onnx.

mod engine;

pub use engine::{ClassifierConfig, ClassifierEngine};

use dms::DmsError;
use thiserror::Error;

/// Errors during inference
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Model load failed: {0}")]
    ModelLoadError(String),
    #[error("Inference failed: {0}")]
    InferenceFailed(String),
    #[error("Invalid output shape: expected {expected}, got {actual}")]
    InvalidOutputShape { expected: String, actual: String },
    #[error("Preprocessing failed: {0}")]
    Preprocessing(String),
}

impl From<InferenceError> for DmsError {
    fn from(err: InferenceError) -> Self {
        match err {
            InferenceError::ModelLoadError(msg) => DmsError::ModelLoad(msg),
            InferenceError::Preprocessing(msg) => DmsError::ImageProcessing(msg),
            other => DmsError::Inference(other.to_string()),
        }
    }
}

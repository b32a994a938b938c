//! Inference Engine Implementation

use std::path::PathBuf;

use camera_capture::frame::VideoFrame;
use dms::{Classification, DmsError, FrameClassifier};
use image::imageops::{self, FilterType};
use serde::{Deserialize, Serialize};
use tract_onnx::prelude::*;
use tracing::{debug, info, warn};

use crate::InferenceError;

type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Number of classes the drowsiness model emits (absent, awake, drowsy)
const CLASS_COUNT: usize = 3;

/// Classifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// ONNX model path; mock mode when unset
    pub model_path: Option<PathBuf>,
    /// Square input edge in pixels
    pub input_size: u32,
    /// Mock mode: frames darker than this read as an absent driver
    pub dark_frame_luminance: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            input_size: 224,
            dark_frame_luminance: 20.0,
        }
    }
}

/// Frame classifier backed by an ONNX model
pub struct ClassifierEngine {
    config: ClassifierConfig,
    plan: Option<OnnxPlan>,
    inferences: u64,
}

impl ClassifierEngine {
    /// Create the engine, loading the model if one is configured
    pub fn new(config: ClassifierConfig) -> Result<Self, InferenceError> {
        let plan = match &config.model_path {
            Some(path) => {
                info!("Loading drowsiness model from {}", path.display());
                Some(load_plan(path, config.input_size)?)
            }
            None => {
                warn!("No model path configured. Using mock classifier.");
                None
            }
        };

        Ok(Self {
            config,
            plan,
            inferences: 0,
        })
    }

    /// Create a mock engine for testing
    pub fn mock() -> Self {
        info!("Creating mock classifier engine");
        Self {
            config: ClassifierConfig::default(),
            plan: None,
            inferences: 0,
        }
    }

    pub fn is_mock(&self) -> bool {
        self.plan.is_none()
    }

    pub fn inference_count(&self) -> u64 {
        self.inferences
    }

    /// Classify a frame, returning the top-1 class
    pub fn predict(&mut self, frame: &VideoFrame) -> Result<Classification, InferenceError> {
        let start = std::time::Instant::now();

        let classification = match &self.plan {
            Some(plan) => {
                let input = preprocess(frame, self.config.input_size)?;
                let outputs = plan
                    .run(tvec!(input.into()))
                    .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?;
                let view = outputs[0]
                    .to_array_view::<f32>()
                    .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?;
                let scores: Vec<f32> = view.iter().copied().collect();
                top1(&scores)?
            }
            None => self.mock_predict(frame),
        };

        self.inferences += 1;
        debug!("Inference completed in {}ms", start.elapsed().as_millis());
        Ok(classification)
    }

    /// Brightness heuristic: a covered or unlit cabin reads as absent
    fn mock_predict(&self, frame: &VideoFrame) -> Classification {
        if frame.mean_luminance() < self.config.dark_frame_luminance {
            Classification::new(0, 0.6)
        } else {
            Classification::new(1, 0.95)
        }
    }
}

impl FrameClassifier for ClassifierEngine {
    fn classify(&mut self, frame: &VideoFrame) -> Result<Classification, DmsError> {
        Ok(self.predict(frame)?)
    }

    fn name(&self) -> &str {
        if self.is_mock() {
            "mock"
        } else {
            "onnx"
        }
    }
}

fn load_plan(path: &std::path::Path, input_size: u32) -> Result<OnnxPlan, InferenceError> {
    let size = input_size as usize;
    tract_onnx::onnx()
        .model_for_path(path)
        .and_then(|model| model.with_input_fact(0, f32::fact([1, 3, size, size]).into()))
        .and_then(|model| model.into_optimized())
        .and_then(|model| model.into_runnable())
        .map_err(|e| InferenceError::ModelLoadError(format!("{}: {}", path.display(), e)))
}

/// Resize, collapse to grayscale and replicate into three channels (1x3xSxS, 0..1)
fn preprocess(frame: &VideoFrame, input_size: u32) -> Result<Tensor, InferenceError> {
    let image = frame
        .to_rgb_image()
        .map_err(|e| InferenceError::Preprocessing(e.to_string()))?;
    let resized = imageops::resize(&image, input_size, input_size, FilterType::Triangle);

    let size = input_size as usize;
    let input = tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, _, y, x)| {
        let p = resized.get_pixel(x as u32, y as u32);
        (p[0] as f32 * 0.299 + p[1] as f32 * 0.587 + p[2] as f32 * 0.114) / 255.0
    });

    Ok(input.into())
}

/// Pick the best class; raw logits are normalised with a softmax
fn top1(scores: &[f32]) -> Result<Classification, InferenceError> {
    if scores.len() < CLASS_COUNT {
        return Err(InferenceError::InvalidOutputShape {
            expected: format!("at least {} scores", CLASS_COUNT),
            actual: scores.len().to_string(),
        });
    }

    if let Some(bad) = scores.iter().find(|s| !s.is_finite()) {
        return Err(InferenceError::InferenceFailed(format!(
            "model produced non-finite score {}",
            bad
        )));
    }

    let sum: f32 = scores.iter().sum();
    let is_distribution =
        scores.iter().all(|&s| (0.0..=1.0).contains(&s)) && (sum - 1.0).abs() < 1e-3;
    let probs: Vec<f32> = if is_distribution {
        scores.to_vec()
    } else {
        softmax(scores)
    };

    let (index, confidence) = probs
        .iter()
        .copied()
        .enumerate()
        .fold((0, f32::MIN), |best, (i, p)| if p > best.1 { (i, p) } else { best });

    Ok(Classification::new(index, confidence))
}

fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::MIN, f32::max);
    let exps: Vec<f32> = scores.iter().map(|&s| (s - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    exps.iter().map(|&e| e / total).collect()
}

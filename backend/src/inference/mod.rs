pub mod engine;
pub mod mock;
pub mod preprocess;
#[cfg(feature = "torch")]
pub mod torch_model;

use ndarray::Array4;
use std::sync::{Arc, OnceLock};

pub use engine::ClassificationEngine;
pub use mock::MockClassifier;
pub use preprocess::Preprocessor;
#[cfg(feature = "torch")]
pub use torch_model::TorchModel;

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("image could not be decoded: {0}")]
    Decode(String),
    #[error("model not loaded")]
    ModelNotLoaded,
    #[error("preprocessing error: {0}")]
    Preprocessing(String),
    #[error("model error: {0}")]
    Model(String),
    #[error("invalid model output: {0}")]
    InvalidOutput(String),
}

/// Label and optional confidence (percentage, two decimals) produced by one
/// classification strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub label: String,
    pub confidence: Option<f64>,
}

/// A per-crop classification strategy.
pub trait Classifier: Send + Sync {
    /// Short strategy name, e.g. `model` or `mock`.
    fn strategy(&self) -> &'static str;

    /// Human-readable description recorded alongside every result.
    fn method(&self) -> &str;

    /// Whether `classify` looks at the pixels. Strategies that do not are
    /// handed an empty slice.
    fn requires_image(&self) -> bool {
        true
    }

    fn classify(&self, image: &[u8]) -> Result<Classification, InferenceError>;
}

/// Forward pass of a trained network: preprocessed batch in, probability
/// vector out.
pub trait InferenceModel: Send + Sync {
    fn predict(&self, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError>;
}

/// Load-once holder for the process-wide model. Empty until startup installs
/// the loaded network; never replaced afterwards.
#[derive(Clone, Default)]
pub struct ModelSlot {
    inner: Arc<OnceLock<Arc<dyn InferenceModel>>>,
}

impl ModelSlot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn loaded(model: Arc<dyn InferenceModel>) -> Self {
        let slot = Self::empty();
        slot.install(model);
        slot
    }

    /// Returns false if a model was already installed.
    pub fn install(&self, model: Arc<dyn InferenceModel>) -> bool {
        self.inner.set(model).is_ok()
    }

    pub fn get(&self) -> Option<&Arc<dyn InferenceModel>> {
        self.inner.get()
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Constant(Vec<f32>);

    impl InferenceModel for Constant {
        fn predict(&self, _input: &Array4<f32>) -> Result<Vec<f32>, InferenceError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn model_slot_installs_once() {
        let slot = ModelSlot::empty();
        assert!(!slot.is_loaded());

        assert!(slot.install(Arc::new(Constant(vec![1.0]))));
        assert!(!slot.install(Arc::new(Constant(vec![0.0]))));

        let shared = slot.clone();
        let input = Array4::zeros((1, 1, 1, 3));
        assert_eq!(shared.get().unwrap().predict(&input).unwrap(), vec![1.0]);
    }
}

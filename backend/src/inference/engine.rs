use super::{Classification, Classifier, InferenceError, ModelSlot, Preprocessor};

/// Model-backed strategy: preprocess, run the network, take the argmax.
pub struct ClassificationEngine {
    model: ModelSlot,
    preprocessor: Preprocessor,
    classes: Vec<String>,
    method: String,
}

impl ClassificationEngine {
    pub fn new(
        model: ModelSlot,
        preprocessor: Preprocessor,
        classes: Vec<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            model,
            preprocessor,
            classes,
            method: method.into(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.model.is_loaded()
    }

    /// Picks the most probable class. Ties go to the class declared first.
    pub fn decide(&self, probabilities: &[f32]) -> Result<Classification, InferenceError> {
        if probabilities.len() != self.classes.len() {
            return Err(InferenceError::InvalidOutput(format!(
                "model produced {} scores for {} classes",
                probabilities.len(),
                self.classes.len()
            )));
        }
        if let Some(bad) = probabilities
            .iter()
            .find(|p| !p.is_finite() || **p < 0.0 || **p > 1.0)
        {
            return Err(InferenceError::InvalidOutput(format!(
                "score {} is not a probability",
                bad
            )));
        }

        let mut best = 0;
        for (idx, &p) in probabilities.iter().enumerate().skip(1) {
            if p > probabilities[best] {
                best = idx;
            }
        }

        Ok(Classification {
            label: self.classes[best].clone(),
            confidence: Some(to_percentage(probabilities[best])),
        })
    }
}

impl Classifier for ClassificationEngine {
    fn strategy(&self) -> &'static str {
        "model"
    }

    fn method(&self) -> &str {
        &self.method
    }

    fn classify(&self, image: &[u8]) -> Result<Classification, InferenceError> {
        let model = self.model.get().ok_or(InferenceError::ModelNotLoaded)?;
        let tensor = self.preprocessor.preprocess(image)?;
        let probabilities = model.predict(&tensor)?;
        log::debug!("Model scores: {:?}", probabilities);
        self.decide(&probabilities)
    }
}

/// Probability in [0, 1] to a percentage rounded to two decimals.
pub fn to_percentage(probability: f32) -> f64 {
    (f64::from(probability) * 100.0 * 100.0).round() / 100.0
}

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use std::sync::Mutex;

use super::{Classification, Classifier, InferenceError};

/// Placeholder strategy for crops without a trained model: draws a label
/// uniformly from a fixed set and never reports a confidence.
pub struct MockClassifier {
    labels: Vec<String>,
    method: String,
    rng: Mutex<StdRng>,
}

impl MockClassifier {
    pub fn new(labels: Vec<String>, method: impl Into<String>, rng: StdRng) -> Self {
        Self {
            labels,
            method: method.into(),
            rng: Mutex::new(rng),
        }
    }

    pub fn seeded(labels: Vec<String>, method: impl Into<String>, seed: u64) -> Self {
        Self::new(labels, method, StdRng::seed_from_u64(seed))
    }

    pub fn from_os_rng(labels: Vec<String>, method: impl Into<String>) -> Self {
        Self::new(labels, method, StdRng::from_os_rng())
    }
}

impl Classifier for MockClassifier {
    fn strategy(&self) -> &'static str {
        "mock"
    }

    fn method(&self) -> &str {
        &self.method
    }

    fn requires_image(&self) -> bool {
        false
    }

    fn classify(&self, _image: &[u8]) -> Result<Classification, InferenceError> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| InferenceError::Model("mock generator lock poisoned".into()))?;
        let label = self
            .labels
            .choose(&mut *rng)
            .ok_or_else(|| InferenceError::InvalidOutput("mock label set is empty".into()))?;

        Ok(Classification {
            label: label.clone(),
            confidence: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rice_labels() -> Vec<String> {
        vec!["Brown Spot".into(), "Leaf Blast".into(), "Healthy".into()]
    }

    fn draw(classifier: &MockClassifier, n: usize) -> Vec<String> {
        (0..n)
            .map(|_| classifier.classify(&[]).unwrap().label)
            .collect()
    }

    #[test]
    fn same_seed_reproduces_the_same_sequence() {
        let a = MockClassifier::seeded(rice_labels(), "m", 1234);
        let b = MockClassifier::seeded(rice_labels(), "m", 1234);
        assert_eq!(draw(&a, 1000), draw(&b, 1000));
    }

    #[test]
    fn draws_stay_within_label_set_without_confidence() {
        let classifier = MockClassifier::seeded(rice_labels(), "m", 99);
        let labels = rice_labels();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..300 {
            let result = classifier.classify(&[]).unwrap();
            assert!(result.confidence.is_none());
            assert!(labels.contains(&result.label));
            seen.insert(result.label);
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn empty_label_set_is_an_error() {
        let classifier = MockClassifier::seeded(Vec::new(), "m", 1);
        assert!(classifier.classify(&[]).is_err());
    }
}

use std::collections::BTreeMap;
use std::sync::Arc;

use shared::{CropStrategy, CropsResponse};

use crate::config::{ClassifierConfig, FallbackPolicy};
use crate::error::PredictionError;
use crate::inference::{Classifier, MockClassifier};
use crate::ingest::StoredImage;
use crate::storage::BlobStore;

#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub label: String,
    pub confidence: Option<f64>,
    pub method: String,
    pub strategy: &'static str,
}

/// Crop identifier to classification strategy. Lookups are exact string
/// matches; crops without an entry use the fallback if one was set.
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    strategies: BTreeMap<String, Arc<dyn Classifier>>,
    fallback: Option<Arc<dyn Classifier>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, crop: impl Into<String>, classifier: Arc<dyn Classifier>) -> Self {
        self.strategies.insert(crop.into(), classifier);
        self
    }

    pub fn with_fallback(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.fallback = Some(classifier);
        self
    }

    /// Builds the registry described by the classifier policy: every mock crop
    /// gets its own generator, listed model crops and (unless rejected) all
    /// other crops go to `model`.
    pub fn from_config(config: &ClassifierConfig, model: Arc<dyn Classifier>) -> Self {
        let mut registry = Self::new();
        for (offset, (crop, spec)) in config.mock_crops.iter().enumerate() {
            let mock = match config.mock_seed {
                Some(seed) => MockClassifier::seeded(
                    spec.labels.clone(),
                    spec.method.clone(),
                    seed.wrapping_add(offset as u64),
                ),
                None => MockClassifier::from_os_rng(spec.labels.clone(), spec.method.clone()),
            };
            registry = registry.register(crop.clone(), Arc::new(mock));
        }
        for crop in &config.model_crops {
            registry = registry.register(crop.clone(), model.clone());
        }
        if config.fallback == FallbackPolicy::Model {
            registry = registry.with_fallback(model);
        }
        registry
    }

    pub fn resolve(&self, crop: &str) -> Result<&Arc<dyn Classifier>, PredictionError> {
        self.strategies
            .get(crop)
            .or(self.fallback.as_ref())
            .ok_or_else(|| PredictionError::UnsupportedCrop(crop.to_string()))
    }

    pub fn describe(&self) -> CropsResponse {
        let describe = |crop: &str, classifier: &Arc<dyn Classifier>| CropStrategy {
            crop: crop.to_string(),
            strategy: classifier.strategy().to_string(),
            method: classifier.method().to_string(),
        };
        CropsResponse {
            crops: self
                .strategies
                .iter()
                .map(|(crop, classifier)| describe(crop, classifier))
                .collect(),
            fallback: self.fallback.as_ref().map(|c| describe("*", c)),
        }
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<StrategyRegistry>,
    blobs: Arc<dyn BlobStore>,
}

impl Dispatcher {
    pub fn new(registry: StrategyRegistry, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            registry: Arc::new(registry),
            blobs,
        }
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    /// Classifies an already stored image with the strategy registered for
    /// `crop`. Pixels are read back from blob storage only when the strategy
    /// needs them; the classifier itself runs on the blocking pool.
    pub async fn dispatch(
        &self,
        crop: &str,
        image: &StoredImage,
    ) -> Result<ClassificationResult, PredictionError> {
        let classifier = Arc::clone(self.registry.resolve(crop)?);
        let method = classifier.method().to_string();
        let strategy = classifier.strategy();

        let bytes = if classifier.requires_image() {
            self.blobs.read(image.filename()).await?
        } else {
            Vec::new()
        };

        let classification = tokio::task::spawn_blocking(move || classifier.classify(&bytes))
            .await
            .map_err(|e| {
                PredictionError::InferenceFailed(format!("classifier task failed: {}", e))
            })??;

        log::info!(
            "Classified {} for crop '{}' with {} strategy: {} ({:?})",
            image.filename(),
            crop,
            strategy,
            classification.label,
            classification.confidence
        );

        Ok(ClassificationResult {
            label: classification.label,
            confidence: classification.confidence,
            method,
            strategy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_METHOD;
    use crate::inference::{Classification, InferenceError};
    use crate::ingest::ImageIngestor;
    use crate::storage::LocalDirStore;

    struct FixedModel;

    impl Classifier for FixedModel {
        fn strategy(&self) -> &'static str {
            "model"
        }

        fn method(&self) -> &str {
            DEFAULT_METHOD
        }

        fn classify(&self, image: &[u8]) -> Result<Classification, InferenceError> {
            assert!(!image.is_empty());
            Ok(Classification {
                label: "Early Blight".into(),
                confidence: Some(64.5),
            })
        }
    }

    fn seeded_config(seed: u64) -> ClassifierConfig {
        ClassifierConfig {
            mock_seed: Some(seed),
            ..ClassifierConfig::default()
        }
    }

    async fn stored(ingestor: &ImageIngestor) -> StoredImage {
        ingestor.store(Some("leaf.jpg"), b"jpeg bytes").await.unwrap()
    }

    fn setup(
        config: &ClassifierConfig,
        dir: &std::path::Path,
    ) -> (Dispatcher, ImageIngestor) {
        let blobs: Arc<dyn BlobStore> = Arc::new(LocalDirStore::new(dir, "/uploads"));
        let registry = StrategyRegistry::from_config(config, Arc::new(FixedModel));
        (
            Dispatcher::new(registry, blobs.clone()),
            ImageIngestor::new(blobs, 1024),
        )
    }

    #[actix_web::test]
    async fn rice_uses_mock_without_confidence() {
        let dir = tempfile::tempdir().unwrap();
        let (dispatcher, ingestor) = setup(&seeded_config(5), dir.path());
        let image = stored(&ingestor).await;

        for _ in 0..50 {
            let result = dispatcher.dispatch("Rice", &image).await.unwrap();
            assert_eq!(result.strategy, "mock");
            assert!(result.confidence.is_none());
            assert!(["Brown Spot", "Leaf Blast", "Healthy"].contains(&result.label.as_str()));
            assert_eq!(result.method, DEFAULT_METHOD);
        }
    }

    #[actix_web::test]
    async fn seeded_rice_sequences_repeat() {
        let dir = tempfile::tempdir().unwrap();
        let (first, ingestor) = setup(&seeded_config(42), dir.path());
        let (second, _) = setup(&seeded_config(42), dir.path());
        let image = stored(&ingestor).await;

        for _ in 0..1000 {
            let a = first.dispatch("Rice", &image).await.unwrap();
            let b = second.dispatch("Rice", &image).await.unwrap();
            assert_eq!(a.label, b.label);
        }
    }

    #[actix_web::test]
    async fn other_crops_fall_back_to_the_model() {
        let dir = tempfile::tempdir().unwrap();
        let (dispatcher, ingestor) = setup(&seeded_config(1), dir.path());
        let image = stored(&ingestor).await;

        for crop in ["Tomato", "Potato", "rice", ""] {
            let result = dispatcher.dispatch(crop, &image).await.unwrap();
            assert_eq!(result.strategy, "model");
            assert_eq!(result.label, "Early Blight");
            assert_eq!(result.confidence, Some(64.5));
            assert_eq!(result.method, DEFAULT_METHOD);
        }
    }

    #[actix_web::test]
    async fn reject_policy_refuses_unregistered_crops() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClassifierConfig {
            fallback: FallbackPolicy::Reject,
            model_crops: vec!["Tomato".into()],
            ..seeded_config(3)
        };
        let (dispatcher, ingestor) = setup(&config, dir.path());
        let image = stored(&ingestor).await;

        assert!(dispatcher.dispatch("Tomato", &image).await.is_ok());
        assert!(dispatcher.dispatch("Rice", &image).await.is_ok());
        let err = dispatcher.dispatch("Cassava", &image).await.unwrap_err();
        assert!(matches!(err, PredictionError::UnsupportedCrop(crop) if crop == "Cassava"));
    }

    #[test]
    fn registry_description_lists_strategies() {
        let registry = StrategyRegistry::from_config(&seeded_config(1), Arc::new(FixedModel));
        let described = registry.describe();
        assert_eq!(described.crops.len(), 1);
        assert_eq!(described.crops[0].crop, "Rice");
        assert_eq!(described.crops[0].strategy, "mock");
        assert_eq!(described.fallback.unwrap().strategy, "model");
    }
}

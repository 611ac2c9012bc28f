use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

pub const DEFAULT_METHOD: &str = "Pretrained AI (PlantVillage)";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
    #[error("Failed to read classifier config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse classifier config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobBackend {
    Local,
    S3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordBackend {
    Memory,
    DynamoDb,
    Supabase,
}

#[derive(Debug, Clone)]
pub struct S3Settings {
    pub bucket: String,
    pub key_prefix: String,
}

#[derive(Debug, Clone)]
pub struct DynamoDbSettings {
    pub table: String,
    pub user_index: String,
}

#[derive(Debug, Clone)]
pub struct SupabaseSettings {
    pub url: String,
    pub key: String,
    pub table: String,
}

/// Process settings read from the environment once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub upload_dir: PathBuf,
    pub public_upload_prefix: String,
    pub max_upload_bytes: usize,
    pub model_path: PathBuf,
    pub classifier_config: PathBuf,
    pub jwt_secret: String,
    pub jwt_audience: Option<String>,
    pub blob_backend: BlobBackend,
    pub s3: Option<S3Settings>,
    pub record_backend: RecordBackend,
    pub dynamodb: Option<DynamoDbSettings>,
    pub supabase: Option<SupabaseSettings>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let require = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let port = match get("PORT") {
            Some(value) => value
                .parse::<u16>()
                .map_err(|_| ConfigError::Invalid { name: "PORT", value })?,
            None => 8081,
        };

        let max_upload_bytes = match get("MAX_UPLOAD_BYTES") {
            Some(value) => value.parse::<usize>().map_err(|_| ConfigError::Invalid {
                name: "MAX_UPLOAD_BYTES",
                value,
            })?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let blob_backend = match get("BLOB_BACKEND").as_deref() {
            None | Some("local") => BlobBackend::Local,
            Some("s3") => BlobBackend::S3,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "BLOB_BACKEND",
                    value: other.to_string(),
                });
            }
        };

        let record_backend = match get("RECORD_BACKEND").as_deref() {
            None | Some("memory") => RecordBackend::Memory,
            Some("dynamodb") => RecordBackend::DynamoDb,
            Some("supabase") => RecordBackend::Supabase,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "RECORD_BACKEND",
                    value: other.to_string(),
                });
            }
        };

        let s3 = match blob_backend {
            BlobBackend::S3 => Some(S3Settings {
                bucket: require("S3_BUCKET_NAME")?,
                key_prefix: get("S3_KEY_PREFIX").unwrap_or_else(|| "uploads/".to_string()),
            }),
            BlobBackend::Local => None,
        };

        let dynamodb = match record_backend {
            RecordBackend::DynamoDb => Some(DynamoDbSettings {
                table: require("DYNAMODB_PREDICTIONS_TABLE")?,
                user_index: get("DYNAMODB_USER_INDEX")
                    .unwrap_or_else(|| "user_id-created_at-index".to_string()),
            }),
            _ => None,
        };

        let supabase = match record_backend {
            RecordBackend::Supabase => Some(SupabaseSettings {
                url: require("SUPABASE_URL")?,
                key: require("SUPABASE_KEY")?,
                table: get("SUPABASE_TABLE").unwrap_or_else(|| "prediction_history".to_string()),
            }),
            _ => None,
        };

        Ok(Self {
            port,
            upload_dir: PathBuf::from(get("UPLOAD_DIR").unwrap_or_else(|| "uploads".to_string())),
            public_upload_prefix: get("PUBLIC_UPLOAD_PREFIX")
                .unwrap_or_else(|| "/uploads".to_string()),
            max_upload_bytes,
            model_path: PathBuf::from(
                get("MODEL_PATH").unwrap_or_else(|| "plant_disease_model.pt".to_string()),
            ),
            classifier_config: PathBuf::from(
                get("CLASSIFIER_CONFIG").unwrap_or_else(|| "config/classifier.yaml".to_string()),
            ),
            jwt_secret: require("JWT_SECRET")?,
            jwt_audience: get("JWT_AUDIENCE"),
            blob_backend,
            s3,
            record_backend,
            dynamodb,
            supabase,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub version: f32,
    pub image: ImageConfig,
    pub model: ModelConfig,
    #[serde(default)]
    pub model_crops: Vec<String>,
    #[serde(default)]
    pub mock_crops: BTreeMap<String, MockCropSpec>,
    #[serde(default)]
    pub fallback: FallbackPolicy,
    #[serde(default)]
    pub mock_seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    pub size: Vec<u32>,
    pub channels: u32,
    pub preprocessing: PreprocessingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    pub resize_method: String,
    #[serde(default)]
    pub channels_first: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub classes: Vec<String>,
    #[serde(default)]
    pub apply_softmax: bool,
    pub method: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockCropSpec {
    pub labels: Vec<String>,
    pub method: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackPolicy {
    #[default]
    Model,
    Reject,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        let mut mock_crops = BTreeMap::new();
        mock_crops.insert(
            "Rice".to_string(),
            MockCropSpec {
                labels: vec![
                    "Brown Spot".to_string(),
                    "Leaf Blast".to_string(),
                    "Healthy".to_string(),
                ],
                method: DEFAULT_METHOD.to_string(),
            },
        );

        Self {
            version: 1.0,
            image: ImageConfig {
                size: vec![28, 28],
                channels: 3,
                preprocessing: PreprocessingConfig {
                    resize_method: "nearest".to_string(),
                    channels_first: false,
                },
            },
            model: ModelConfig {
                classes: vec![
                    "Healthy".to_string(),
                    "Early Blight".to_string(),
                    "Late Blight".to_string(),
                ],
                apply_softmax: false,
                method: DEFAULT_METHOD.to_string(),
            },
            model_crops: Vec::new(),
            mock_crops,
            fallback: FallbackPolicy::Model,
            mock_seed: None,
        }
    }
}

impl ClassifierConfig {
    /// Reads the YAML policy file, or falls back to the built-in defaults when
    /// the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::warn!(
                "Classifier config {} not found, using built-in defaults",
                path.display()
            );
            return Ok(Self::default());
        }
        let config_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&config_str)
    }

    pub fn from_yaml(config_str: &str) -> Result<Self, ConfigError> {
        let config: ClassifierConfig = serde_yaml::from_str(config_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.input_size()?;
        if self.image.channels != 3 {
            return Err(ConfigError::Invalid {
                name: "image.channels",
                value: self.image.channels.to_string(),
            });
        }
        if self.model.classes.is_empty() {
            return Err(ConfigError::Invalid {
                name: "model.classes",
                value: "[]".to_string(),
            });
        }
        if let Some((crop, _)) = self.mock_crops.iter().find(|(_, spec)| spec.labels.is_empty()) {
            return Err(ConfigError::Invalid {
                name: "mock_crops",
                value: format!("{} has no labels", crop),
            });
        }
        if let Some(crop) = self
            .model_crops
            .iter()
            .find(|crop| self.mock_crops.contains_key(*crop))
        {
            return Err(ConfigError::Invalid {
                name: "model_crops",
                value: format!("{} is also listed under mock_crops", crop),
            });
        }
        self.resize_filter()?;
        Ok(())
    }

    /// `image.size` as `(width, height)`; both must be non-zero.
    pub fn input_size(&self) -> Result<(u32, u32), ConfigError> {
        match self.image.size.as_slice() {
            &[width, height] if width > 0 && height > 0 => Ok((width, height)),
            other => Err(ConfigError::Invalid {
                name: "image.size",
                value: format!("{:?}", other),
            }),
        }
    }

    pub fn resize_filter(&self) -> Result<FilterType, ConfigError> {
        match self.image.preprocessing.resize_method.as_str() {
            "nearest" => Ok(FilterType::Nearest),
            "bilinear" | "triangle" => Ok(FilterType::Triangle),
            "bicubic" | "catmullrom" => Ok(FilterType::CatmullRom),
            "gaussian" => Ok(FilterType::Gaussian),
            "lanczos" | "lanczos3" => Ok(FilterType::Lanczos3),
            other => Err(ConfigError::Invalid {
                name: "image.preprocessing.resize_method",
                value: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn env_defaults_apply_when_only_secret_is_set() {
        let config = AppConfig::from_lookup(lookup(&[("JWT_SECRET", "s3cret")])).unwrap();
        assert_eq!(config.port, 8081);
        assert_eq!(config.upload_dir, PathBuf::from("uploads"));
        assert_eq!(config.blob_backend, BlobBackend::Local);
        assert_eq!(config.record_backend, RecordBackend::Memory);
        assert_eq!(config.max_upload_bytes, 50 * 1024 * 1024);
        assert!(config.jwt_audience.is_none());
    }

    #[test]
    fn missing_secret_is_reported() {
        let err = AppConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("JWT_SECRET")));
    }

    #[test]
    fn supabase_backend_requires_credentials() {
        let err = AppConfig::from_lookup(lookup(&[
            ("JWT_SECRET", "s3cret"),
            ("RECORD_BACKEND", "supabase"),
            ("SUPABASE_URL", "https://example.supabase.co"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("SUPABASE_KEY")));
    }

    #[test]
    fn unknown_backend_is_invalid() {
        let err = AppConfig::from_lookup(lookup(&[
            ("JWT_SECRET", "s3cret"),
            ("BLOB_BACKEND", "ftp"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "BLOB_BACKEND", .. }));
    }

    #[test]
    fn default_classifier_config_matches_plantvillage_model() {
        let config = ClassifierConfig::default();
        assert_eq!(config.input_size().unwrap(), (28, 28));
        assert_eq!(
            config.model.classes,
            vec!["Healthy", "Early Blight", "Late Blight"]
        );
        assert_eq!(config.mock_crops["Rice"].labels.len(), 3);
        assert_eq!(config.fallback, FallbackPolicy::Model);
        assert_eq!(config.resize_filter().unwrap(), FilterType::Nearest);
    }

    #[test]
    fn yaml_config_parses_mock_crops_and_fallback() {
        let yaml = r#"
version: 1.0
image:
  size: [64, 64]
  channels: 3
  preprocessing:
    resize_method: bilinear
    channels_first: true
model:
  classes: [Healthy, Rust]
  apply_softmax: true
  method: Wheat CNN
model_crops: [Wheat]
mock_crops:
  Maize:
    labels: [Common Rust, Healthy]
    method: Placeholder
fallback: reject
mock_seed: 7
"#;
        let config = ClassifierConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.input_size().unwrap(), (64, 64));
        assert!(config.image.preprocessing.channels_first);
        assert!(config.model.apply_softmax);
        assert_eq!(config.fallback, FallbackPolicy::Reject);
        assert_eq!(config.mock_seed, Some(7));
        assert_eq!(config.model_crops, vec!["Wheat"]);
        assert_eq!(config.mock_crops["Maize"].labels, vec!["Common Rust", "Healthy"]);
    }

    #[test]
    fn yaml_config_rejects_empty_mock_labels() {
        let yaml = r#"
version: 1.0
image:
  size: [28, 28]
  channels: 3
  preprocessing:
    resize_method: nearest
model:
  classes: [Healthy]
  method: m
mock_crops:
  Rice:
    labels: []
    method: m
"#;
        assert!(ClassifierConfig::from_yaml(yaml).is_err());
    }
}

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PredictionResponse {
    pub record_id: String,
    pub crop: String,
    pub disease: String,
    pub method: String,
    pub confidence: Option<f64>,
    pub image_filename: String,
    pub image_url: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HistoryEntry {
    pub id: String,
    pub crop: String,
    pub disease: String,
    pub method: String,
    pub confidence: Option<f64>,
    pub image: String,
    pub image_url: String,
    pub created_at: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct HistoryResponse {
    pub records: Vec<HistoryEntry>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CropStrategy {
    pub crop: String,
    pub strategy: String,
    pub method: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CropsResponse {
    pub crops: Vec<CropStrategy>,
    pub fallback: Option<CropStrategy>,
}

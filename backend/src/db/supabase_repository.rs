use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use super::{NewPredictionRecord, PredictionRecord, RecordStore, RepositoryError};

/// Prediction history kept in a Supabase (PostgREST) table. The table assigns
/// `id`; rows use the same column names as the rest of the system.
#[derive(Clone)]
pub struct SupabaseRepository {
    client: Client,
    table_url: Url,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct SupabaseRow {
    id: serde_json::Value,
    user_id: String,
    crop: String,
    disease: String,
    method: String,
    confidence: Option<f64>,
    image: String,
    created_at: DateTime<Utc>,
}

impl SupabaseRow {
    fn into_record(self) -> Result<PredictionRecord, RepositoryError> {
        let id = match self.id {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            other => {
                return Err(RepositoryError::InvalidData(format!(
                    "Invalid id: {}",
                    other
                )));
            }
        };
        Ok(PredictionRecord {
            id,
            user_id: self.user_id,
            crop: self.crop,
            disease: self.disease,
            method: self.method,
            confidence: self.confidence,
            image_filename: self.image,
            created_at: self.created_at,
        })
    }
}

impl SupabaseRepository {
    pub fn new(
        client: Client,
        base_url: &str,
        api_key: String,
        table: &str,
    ) -> Result<Self, RepositoryError> {
        let table_url = Self::table_url(base_url, table)?;
        Ok(Self {
            client,
            table_url,
            api_key,
        })
    }

    fn table_url(base_url: &str, table: &str) -> Result<Url, RepositoryError> {
        let base = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))
            .map_err(|e| RepositoryError::InvalidData(format!("Invalid Supabase URL: {}", e)))?;
        base.join(&format!("rest/v1/{}", table))
            .map_err(|e| RepositoryError::InvalidData(format!("Invalid Supabase table: {}", e)))
    }

    fn history_url(&self, user_id: &str) -> Url {
        let mut url = self.table_url.clone();
        url.query_pairs_mut()
            .append_pair("select", "*")
            .append_pair("user_id", &format!("eq.{}", user_id))
            .append_pair("order", "created_at.desc,id.desc");
        url
    }

    async fn rows(&self, response: reqwest::Response) -> Result<Vec<SupabaseRow>, RepositoryError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!("Supabase request failed with {}: {}", status, body);
            return Err(RepositoryError::Supabase(format!("{}: {}", status, body)));
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| RepositoryError::Unavailable(e.to_string()))?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl RecordStore for SupabaseRepository {
    async fn append(&self, record: NewPredictionRecord) -> Result<String, RepositoryError> {
        let response = self
            .client
            .post(self.table_url.clone())
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Prefer", "return=representation")
            .json(&record)
            .send()
            .await
            .map_err(|e| RepositoryError::Unavailable(e.to_string()))?;

        let row = self
            .rows(response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RepositoryError::InvalidData("insert returned no row".into()))?;
        let stored = row.into_record()?;
        log::debug!("Stored prediction {} in Supabase", stored.id);
        Ok(stored.id)
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<PredictionRecord>, RepositoryError> {
        let response = self
            .client
            .get(self.history_url(user_id))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| RepositoryError::Unavailable(e.to_string()))?;

        let mut records = Vec::new();
        for row in self.rows(response).await? {
            let record = row.into_record()?;
            if record.user_id == user_id {
                records.push(record);
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> SupabaseRepository {
        SupabaseRepository::new(
            Client::new(),
            "https://abc.supabase.co/",
            "anon-key".into(),
            "prediction_history",
        )
        .unwrap()
    }

    #[test]
    fn history_query_filters_by_user_and_orders_newest_first() {
        let url = repo().history_url("d3b0 7&x");
        assert_eq!(url.path(), "/rest/v1/prediction_history");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("user_id".into(), "eq.d3b0 7&x".into())));
        assert!(pairs.contains(&("order".into(), "created_at.desc,id.desc".into())));
    }

    #[test]
    fn rows_accept_numeric_and_uuid_ids() {
        let body = r#"[
            {"id": 12, "user_id": "u1", "crop": "Rice", "disease": "Leaf Blast",
             "method": "Pretrained AI (PlantVillage)", "confidence": null,
             "image": "a.png", "created_at": "2025-03-04T05:06:07.123456+00:00"},
            {"id": "5f8e", "user_id": "u1", "crop": "Tomato", "disease": "Healthy",
             "method": "Pretrained AI (PlantVillage)", "confidence": 99.5,
             "image": "b.jpg", "created_at": "2025-03-04T05:00:00+00:00"}
        ]"#;
        let rows: Vec<SupabaseRow> = serde_json::from_str(body).unwrap();
        let records: Vec<PredictionRecord> = rows
            .into_iter()
            .map(|r| r.into_record().unwrap())
            .collect();
        assert_eq!(records[0].id, "12");
        assert_eq!(records[0].confidence, None);
        assert_eq!(records[1].id, "5f8e");
        assert_eq!(records[1].image_filename, "b.jpg");
        assert!(records[0].created_at > records[1].created_at);
    }

    #[test]
    fn bad_base_url_is_rejected() {
        assert!(SupabaseRepository::new(Client::new(), "not a url", "k".into(), "t").is_err());
    }
}

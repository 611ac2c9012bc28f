use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::types::AttributeValue;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use super::{
    NewPredictionRecord, PredictionRecord, RecordStore, RepositoryError, format_timestamp,
};

/// Prediction history in a DynamoDB table keyed by `id`, with a global
/// secondary index on (`user_id`, `created_at`) for the per-user listing.
#[derive(Clone)]
pub struct DynamoDbRepository {
    client: Client,
    predictions_table: String,
    user_index: String,
}

impl DynamoDbRepository {
    pub fn new(client: Client, predictions_table: String, user_index: String) -> Self {
        Self {
            client,
            predictions_table,
            user_index,
        }
    }

    fn record_to_item(record: &PredictionRecord) -> HashMap<String, AttributeValue> {
        let mut item = HashMap::new();
        item.insert("id".to_string(), AttributeValue::S(record.id.clone()));
        item.insert(
            "user_id".to_string(),
            AttributeValue::S(record.user_id.clone()),
        );
        item.insert("crop".to_string(), AttributeValue::S(record.crop.clone()));
        item.insert(
            "disease".to_string(),
            AttributeValue::S(record.disease.clone()),
        );
        item.insert(
            "method".to_string(),
            AttributeValue::S(record.method.clone()),
        );
        item.insert(
            "confidence".to_string(),
            match record.confidence {
                Some(confidence) => AttributeValue::N(confidence.to_string()),
                None => AttributeValue::Null(true),
            },
        );
        item.insert(
            "image".to_string(),
            AttributeValue::S(record.image_filename.clone()),
        );
        item.insert(
            "created_at".to_string(),
            AttributeValue::S(format_timestamp(&record.created_at)),
        );
        item
    }

    fn parse_record_from_item(
        item: &HashMap<String, AttributeValue>,
    ) -> Result<PredictionRecord, RepositoryError> {
        let string_attr = |name: &str| {
            item.get(name)
                .and_then(|v| v.as_s().ok())
                .cloned()
                .ok_or_else(|| RepositoryError::InvalidData(format!("Invalid {}", name)))
        };

        let confidence = match item.get("confidence") {
            None | Some(AttributeValue::Null(_)) => None,
            Some(value) => Some(
                value
                    .as_n()
                    .ok()
                    .and_then(|s| s.parse::<f64>().ok())
                    .ok_or_else(|| RepositoryError::InvalidData("Invalid confidence".to_string()))?,
            ),
        };

        let created_at = item
            .get("created_at")
            .and_then(|v| v.as_s().ok())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| RepositoryError::InvalidData("Invalid created_at".to_string()))?;

        Ok(PredictionRecord {
            id: string_attr("id")?,
            user_id: string_attr("user_id")?,
            crop: string_attr("crop")?,
            disease: string_attr("disease")?,
            method: string_attr("method")?,
            confidence,
            image_filename: string_attr("image")?,
            created_at,
        })
    }
}

#[async_trait]
impl RecordStore for DynamoDbRepository {
    async fn append(&self, record: NewPredictionRecord) -> Result<String, RepositoryError> {
        let record = record.with_id(Uuid::new_v4().to_string());
        let item = Self::record_to_item(&record);

        self.client
            .put_item()
            .table_name(&self.predictions_table)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(id)")
            .send()
            .await
            .map_err(|e| {
                log::error!(
                    "DynamoDB put_item failed for prediction {}: {:?}",
                    record.id,
                    e
                );
                let error_msg = if let Some(service_err) = e.as_service_error() {
                    format!("Service error: {:?}", service_err)
                } else {
                    format!("SDK error: {}", e)
                };
                RepositoryError::DynamoDb(error_msg)
            })?;

        log::debug!(
            "Stored prediction {} in table '{}'",
            record.id,
            self.predictions_table
        );
        Ok(record.id)
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<PredictionRecord>, RepositoryError> {
        let mut records = Vec::new();
        let mut start_key: Option<HashMap<String, AttributeValue>> = None;

        loop {
            let result = self
                .client
                .query()
                .table_name(&self.predictions_table)
                .index_name(&self.user_index)
                .key_condition_expression("user_id = :user_id")
                .expression_attribute_values(":user_id", AttributeValue::S(user_id.to_string()))
                .scan_index_forward(false)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| RepositoryError::DynamoDb(e.to_string()))?;

            for item in result.items() {
                let record = Self::parse_record_from_item(item)?;
                if record.user_id == user_id {
                    records.push(record);
                }
            }

            match result.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }

        log::debug!("Loaded {} predictions for user {}", records.len(), user_id);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(confidence: Option<f64>) -> PredictionRecord {
        PredictionRecord {
            id: "7a1e".into(),
            user_id: "user-1".into(),
            crop: "Potato".into(),
            disease: "Early Blight".into(),
            method: "Pretrained AI (PlantVillage)".into(),
            confidence,
            image_filename: "7a1e.jpg".into(),
            created_at: Utc.with_ymd_and_hms(2025, 6, 1, 8, 30, 0).unwrap(),
        }
    }

    #[test]
    fn item_uses_history_column_names() {
        let item = DynamoDbRepository::record_to_item(&record(Some(73.12)));
        assert_eq!(item["image"], AttributeValue::S("7a1e.jpg".into()));
        assert_eq!(item["confidence"], AttributeValue::N("73.12".into()));
        assert_eq!(
            item["created_at"],
            AttributeValue::S("2025-06-01T08:30:00.000000Z".into())
        );
        let parsed = DynamoDbRepository::parse_record_from_item(&item).unwrap();
        assert_eq!(parsed, record(Some(73.12)));
    }

    #[test]
    fn absent_confidence_is_stored_as_null() {
        let item = DynamoDbRepository::record_to_item(&record(None));
        assert_eq!(item["confidence"], AttributeValue::Null(true));
        let parsed = DynamoDbRepository::parse_record_from_item(&item).unwrap();
        assert_eq!(parsed.confidence, None);
    }

    #[test]
    fn malformed_items_are_invalid_data() {
        let mut item = DynamoDbRepository::record_to_item(&record(None));
        item.remove("disease");
        assert!(matches!(
            DynamoDbRepository::parse_record_from_item(&item),
            Err(RepositoryError::InvalidData(_))
        ));
    }
}

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use aws_types::SdkConfig;
use std::collections::HashMap;
use tracing::{debug, info, instrument};

/// Primary key attribute of the results table
pub const IMAGE_NAME_ATTRIBUTE: &str = "Image_Name";
/// Attribute holding the body part entries
pub const BODY_ATTRIBUTE: &str = "Body";

/// Body part paired with the equipment found on it
#[derive(Debug, Clone, PartialEq)]
pub struct BodyPartEntry {
    pub body_part: String,
    /// Stringified equipment detections
    pub equipment: String,
}

/// Detection result for one image, keyed by image name
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionRecord {
    pub image_name: String,
    pub body: Vec<BodyPartEntry>,
}

impl DetectionRecord {
    pub fn new(image_name: impl Into<String>) -> Self {
        Self {
            image_name: image_name.into(),
            body: Vec::new(),
        }
    }

    /// Render the record as a DynamoDB item
    pub fn to_item(&self) -> HashMap<String, AttributeValue> {
        let entries = self
            .body
            .iter()
            .map(|entry| {
                AttributeValue::M(HashMap::from([
                    (
                        "Body Part".to_string(),
                        AttributeValue::S(entry.body_part.clone()),
                    ),
                    (
                        "Equipment".to_string(),
                        AttributeValue::S(entry.equipment.clone()),
                    ),
                ]))
            })
            .collect();

        HashMap::from([
            (
                IMAGE_NAME_ATTRIBUTE.to_string(),
                AttributeValue::S(self.image_name.clone()),
            ),
            (BODY_ATTRIBUTE.to_string(), AttributeValue::L(entries)),
        ])
    }
}

/// Persistence seam for detection records
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Unconditionally write a record, replacing any record with the same image name
    async fn put_record(&self, record: &DetectionRecord) -> Result<()>;
}

/// Record store backed by a DynamoDB table
pub struct DynamoRecordStore {
    client: DynamoClient,
    table_name: String,
}

impl DynamoRecordStore {
    /// Create a new store from shared AWS configuration
    pub fn new(aws_config: &SdkConfig, table_name: impl Into<String>) -> Self {
        let table_name = table_name.into();

        info!(table = %table_name, "DynamoDB record store initialized");

        Self {
            client: DynamoClient::new(aws_config),
            table_name,
        }
    }
}

#[async_trait]
impl RecordStore for DynamoRecordStore {
    #[instrument(skip(self, record), fields(table = %self.table_name, image = %record.image_name))]
    async fn put_record(&self, record: &DetectionRecord) -> Result<()> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(record.to_item()))
            .send()
            .await
            .context("Failed to write detection record")?;

        debug!(entries = record.body.len(), "Detection record written");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_item() {
        let mut record = DetectionRecord::new("img 1.jpg");
        record.body.push(BodyPartEntry {
            body_part: "FACE".to_string(),
            equipment: "[]".to_string(),
        });

        let item = record.to_item();

        assert_eq!(
            item.get(IMAGE_NAME_ATTRIBUTE),
            Some(&AttributeValue::S("img 1.jpg".to_string()))
        );

        let entries = item.get(BODY_ATTRIBUTE).unwrap().as_l().unwrap();
        assert_eq!(entries.len(), 1);

        let entry = entries[0].as_m().unwrap();
        assert_eq!(
            entry.get("Body Part"),
            Some(&AttributeValue::S("FACE".to_string()))
        );
        assert_eq!(
            entry.get("Equipment"),
            Some(&AttributeValue::S("[]".to_string()))
        );
    }

    #[test]
    fn test_to_item_empty_body() {
        let item = DetectionRecord::new("empty.jpg").to_item();
        assert!(item.get(BODY_ATTRIBUTE).unwrap().as_l().unwrap().is_empty());
    }
}

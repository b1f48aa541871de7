use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Errors raised while reading an upload notification out of a queue message
#[derive(Error, Debug)]
pub enum EventError {
    #[error("Message has no body")]
    MissingBody,

    #[error("Failed to deserialize upload notification: {0}")]
    MalformedBody(#[from] serde_json::Error),

    #[error("Upload notification has an empty Records list")]
    EmptyRecords,

    #[error("Upload notification Records is not a list")]
    RecordsNotAList,
}

/// One entry of the `Records` list of an S3 event notification
#[derive(Debug, Deserialize)]
pub struct UploadRecord {
    pub s3: S3Entity,
}

#[derive(Debug, Deserialize)]
pub struct S3Entity {
    pub bucket: S3Bucket,
    pub object: S3Object,
}

#[derive(Debug, Deserialize)]
pub struct S3Bucket {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct S3Object {
    pub key: String,
}

/// The object an upload notification points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    pub bucket: String,
    /// Object key with `+` turned back into spaces
    pub image: String,
}

/// Extract the uploaded image from a message body.
///
/// Returns `Ok(None)` when the body carries no `Records` key. Only the first
/// record is read.
pub fn parse_upload(body: Option<&str>) -> Result<Option<UploadedImage>, EventError> {
    let body = body.ok_or(EventError::MissingBody)?;
    let payload: Value = serde_json::from_str(body)?;

    // Absent for non-record payloads such as s3:TestEvent
    let Some(records) = payload.get("Records") else {
        return Ok(None);
    };

    let first = records
        .as_array()
        .ok_or(EventError::RecordsNotAList)?
        .first()
        .ok_or(EventError::EmptyRecords)?;

    // Later records are never decoded
    let record = UploadRecord::deserialize(first)?;

    Ok(Some(UploadedImage {
        bucket: record.s3.bucket.name,
        image: normalize_key(&record.s3.object.key),
    }))
}

/// S3 encodes spaces in keys as `+`. No other decoding is applied.
pub fn normalize_key(key: &str) -> String {
    key.replace('+', " ")
}

//! Nier PPE Notifier
//!
//! Lambda handler for the Nier factory floor analytics platform. It reacts to
//! image uploads announced through SQS, runs protective equipment detection on
//! each uploaded image with Amazon Rekognition, records the per body part results
//! in DynamoDB and sends a notification through SNS.
//!
//! ## Architecture
//!
//! ```text
//! S3 upload ──▶ SQS ──▶ Detection Notifier ──▶ Rekognition (PPE)
//!                              │
//!                              ├──▶ DynamoDB (one item per image)
//!                              │
//!                              └──▶ SNS (image name)
//! ```
//!
//! Messages in a batch are handled strictly in order. The AWS clients are built
//! once per Lambda execution environment and shared by every invocation.

pub mod config;
pub mod detection;
pub mod handler;
pub mod notify;
pub mod store;
pub mod upload_event;

pub use config::{Config, ConfigError, FailureMode, WriteMode};
pub use detection::{
    DetectionRequest, DetectionResponse, EquipmentType, PpeDetector, RekognitionDetector,
};
pub use handler::{handler, BatchReport, DetectionNotifier, MessageOutcome, StatusResponse};
pub use notify::{Destination, Notifier, SnsNotifier};
pub use store::{DetectionRecord, DynamoRecordStore, RecordStore};
pub use upload_event::{parse_upload, EventError, UploadedImage};

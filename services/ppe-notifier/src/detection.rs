use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_rekognition::operation::detect_protective_equipment::DetectProtectiveEquipmentOutput;
use aws_sdk_rekognition::types::{
    Image, ProtectiveEquipmentSummarizationAttributes, ProtectiveEquipmentType, S3Object,
};
use aws_sdk_rekognition::Client as RekognitionClient;
use aws_types::SdkConfig;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Instant;
use tracing::{debug, info, instrument};

/// Protective equipment categories the detection service knows about
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EquipmentType {
    FaceCover,
    HandCover,
    HeadCover,
}

impl EquipmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EquipmentType::FaceCover => "FACE_COVER",
            EquipmentType::HandCover => "HAND_COVER",
            EquipmentType::HeadCover => "HEAD_COVER",
        }
    }
}

impl FromStr for EquipmentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FACE_COVER" => Ok(EquipmentType::FaceCover),
            "HAND_COVER" => Ok(EquipmentType::HandCover),
            "HEAD_COVER" => Ok(EquipmentType::HeadCover),
            other => Err(format!("unknown equipment type: {}", other)),
        }
    }
}

/// A single PPE detection request against an object in S3
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionRequest {
    pub bucket: String,
    pub image: String,
    /// Minimum confidence on a 0-100 scale
    pub min_confidence: f32,
    pub required_equipment_types: Vec<EquipmentType>,
}

/// Everything the detection service found in one image
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DetectionResponse {
    pub persons: Vec<DetectedPerson>,
}

/// A person found in the image
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DetectedPerson {
    pub id: Option<i32>,
    pub body_parts: Vec<BodyPartDetection>,
}

/// A body part of a detected person and the equipment found on it
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BodyPartDetection {
    /// FACE, HEAD, LEFT_HAND or RIGHT_HAND
    pub name: String,
    pub confidence: Option<f32>,
    pub equipment_detections: Vec<EquipmentDetection>,
}

/// One item of protective equipment
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct EquipmentDetection {
    #[serde(rename = "Type")]
    pub equipment_type: String,
    pub confidence: Option<f32>,
    /// Whether the equipment actually covers the body part
    pub covers_body_part: Option<bool>,
    pub covers_body_part_confidence: Option<f32>,
    pub bounding_box: Option<BoundingBox>,
}

/// Ratios of the overall image dimensions
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BoundingBox {
    pub width: Option<f32>,
    pub height: Option<f32>,
    pub left: Option<f32>,
    pub top: Option<f32>,
}

impl BodyPartDetection {
    /// Equipment detections rendered as a single string for storage
    pub fn equipment_summary(&self) -> Result<String> {
        serde_json::to_string(&self.equipment_detections).with_context(|| {
            format!("Failed to serialize equipment detections for {}", self.name)
        })
    }
}

impl DetectionResponse {
    /// Total number of body parts across all persons
    pub fn body_part_count(&self) -> usize {
        self.persons.iter().map(|p| p.body_parts.len()).sum()
    }
}

/// PPE detection seam
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PpeDetector: Send + Sync {
    /// Run PPE detection on a stored image
    async fn detect(&self, request: &DetectionRequest) -> Result<DetectionResponse>;
}

/// PPE detector backed by Amazon Rekognition
pub struct RekognitionDetector {
    client: RekognitionClient,
}

impl RekognitionDetector {
    /// Create a new detector from shared AWS configuration
    pub fn new(aws_config: &SdkConfig) -> Self {
        info!("Rekognition detector initialized");

        Self {
            client: RekognitionClient::new(aws_config),
        }
    }
}

#[async_trait]
impl PpeDetector for RekognitionDetector {
    #[instrument(skip(self, request), fields(bucket = %request.bucket, image = %request.image))]
    async fn detect(&self, request: &DetectionRequest) -> Result<DetectionResponse> {
        let image = Image::builder()
            .s3_object(
                S3Object::builder()
                    .bucket(&request.bucket)
                    .name(&request.image)
                    .build(),
            )
            .build();

        let summarization = ProtectiveEquipmentSummarizationAttributes::builder()
            .min_confidence(request.min_confidence)
            .set_required_equipment_types(Some(
                request
                    .required_equipment_types
                    .iter()
                    .map(|t| ProtectiveEquipmentType::from(t.as_str()))
                    .collect(),
            ))
            .build()
            .context("Failed to build summarization attributes")?;

        let started = Instant::now();

        let output = self
            .client
            .detect_protective_equipment()
            .image(image)
            .summarization_attributes(summarization)
            .send()
            .await
            .context("Failed to detect protective equipment")?;

        metrics::histogram!("ppe.detection.duration_seconds")
            .record(started.elapsed().as_secs_f64());

        let response = DetectionResponse::from(&output);

        debug!(
            persons = response.persons.len(),
            body_parts = response.body_part_count(),
            "Detection completed"
        );

        Ok(response)
    }
}

impl From<&DetectProtectiveEquipmentOutput> for DetectionResponse {
    fn from(output: &DetectProtectiveEquipmentOutput) -> Self {
        let persons = output
            .persons()
            .iter()
            .map(|person| DetectedPerson {
                id: person.id(),
                body_parts: person
                    .body_parts()
                    .iter()
                    .map(|part| BodyPartDetection {
                        name: part
                            .name()
                            .map(|n| n.as_str().to_string())
                            .unwrap_or_default(),
                        confidence: part.confidence(),
                        equipment_detections: part
                            .equipment_detections()
                            .iter()
                            .map(|detection| EquipmentDetection {
                                equipment_type: detection
                                    .r#type()
                                    .map(|t| t.as_str().to_string())
                                    .unwrap_or_default(),
                                confidence: detection.confidence(),
                                covers_body_part: detection
                                    .covers_body_part()
                                    .and_then(|c| Option::from(c.value())),
                                covers_body_part_confidence: detection
                                    .covers_body_part()
                                    .and_then(|c| c.confidence()),
                                bounding_box: detection.bounding_box().map(|b| BoundingBox {
                                    width: b.width(),
                                    height: b.height(),
                                    left: b.left(),
                                    top: b.top(),
                                }),
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect();

        Self { persons }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_rekognition::types::{
        BodyPart, CoversBodyPart, ProtectiveEquipmentBodyPart, ProtectiveEquipmentPerson,
    };

    #[test]
    fn test_equipment_type_serialization() {
        assert_eq!(
            serde_json::to_string(&EquipmentType::FaceCover).unwrap(),
            "\"FACE_COVER\""
        );
        let parsed: EquipmentType = serde_json::from_str("\"HEAD_COVER\"").unwrap();
        assert_eq!(parsed, EquipmentType::HeadCover);
        assert_eq!(EquipmentType::HandCover.as_str(), "HAND_COVER");
        assert_eq!("head_cover".parse(), Ok(EquipmentType::HeadCover));
        assert!("GLOVES".parse::<EquipmentType>().is_err());
    }

    #[test]
    fn test_equipment_summary_uses_service_field_names() {
        let part = BodyPartDetection {
            name: "FACE".to_string(),
            confidence: Some(99.0),
            equipment_detections: vec![EquipmentDetection {
                equipment_type: "FACE_COVER".to_string(),
                confidence: Some(98.5),
                covers_body_part: Some(true),
                covers_body_part_confidence: Some(97.0),
                bounding_box: None,
            }],
        };

        let summary = part.equipment_summary().unwrap();
        assert!(summary.starts_with('['));
        assert!(summary.contains("\"Type\":\"FACE_COVER\""));
        assert!(summary.contains("\"CoversBodyPart\":true"));
    }

    #[test]
    fn test_equipment_summary_empty() {
        let part = BodyPartDetection {
            name: "HEAD".to_string(),
            ..Default::default()
        };
        assert_eq!(part.equipment_summary().unwrap(), "[]");
    }

    #[test]
    fn test_from_sdk_output() {
        let output = DetectProtectiveEquipmentOutput::builder()
            .persons(
                ProtectiveEquipmentPerson::builder()
                    .id(0)
                    .body_parts(
                        ProtectiveEquipmentBodyPart::builder()
                            .name(BodyPart::Face)
                            .confidence(99.1)
                            .equipment_detections(
                                aws_sdk_rekognition::types::EquipmentDetection::builder()
                                    .r#type(ProtectiveEquipmentType::FaceCover)
                                    .confidence(97.2)
                                    .covers_body_part(
                                        CoversBodyPart::builder()
                                            .confidence(96.0)
                                            .value(true)
                                            .build(),
                                    )
                                    .build(),
                            )
                            .build(),
                    )
                    .body_parts(
                        ProtectiveEquipmentBodyPart::builder()
                            .name(BodyPart::Head)
                            .confidence(98.0)
                            .build(),
                    )
                    .build(),
            )
            .build();

        let response = DetectionResponse::from(&output);

        assert_eq!(response.persons.len(), 1);
        assert_eq!(response.body_part_count(), 2);

        let person = &response.persons[0];
        assert_eq!(person.id, Some(0));
        assert_eq!(person.body_parts[0].name, "FACE");
        assert_eq!(person.body_parts[1].name, "HEAD");
        assert!(person.body_parts[1].equipment_detections.is_empty());

        let detection = &person.body_parts[0].equipment_detections[0];
        assert_eq!(detection.equipment_type, "FACE_COVER");
        assert_eq!(detection.covers_body_part, Some(true));
        assert_eq!(detection.covers_body_part_confidence, Some(96.0));
    }
}

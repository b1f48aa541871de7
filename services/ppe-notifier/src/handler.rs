use crate::config::{DetectionConfig, FailureMode, HandlerConfig, WriteMode};
use crate::detection::{DetectionRequest, DetectionResponse, PpeDetector};
use crate::notify::Notifier;
use crate::store::{BodyPartEntry, DetectionRecord, RecordStore};
use crate::upload_event::{parse_upload, UploadedImage};
use anyhow::{Context, Result};
use aws_lambda_events::sqs::{SqsEvent, SqsMessage};
use lambda_runtime::{Error, LambdaEvent};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

/// What happened to a single queue message
#[derive(Debug, Clone, PartialEq)]
pub enum MessageOutcome {
    /// Detection ran; `writes` records were stored and as many notifications sent
    Processed { image: String, writes: usize },
    /// The body carried no upload records
    Skipped,
    /// Processing failed and the batch carried on
    Failed { error: String },
}

/// Outcome of one message in a batch
#[derive(Debug, Clone, PartialEq)]
pub struct MessageReport {
    pub message_id: Option<String>,
    pub outcome: MessageOutcome,
}

/// Outcomes of every message handled in one invocation, in delivery order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub messages: Vec<MessageReport>,
}

impl BatchReport {
    pub fn processed(&self) -> usize {
        self.count(|o| matches!(o, MessageOutcome::Processed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, MessageOutcome::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, MessageOutcome::Failed { .. }))
    }

    /// Ids of failed messages, for SQS partial batch responses
    pub fn failed_message_ids(&self) -> Vec<String> {
        self.messages
            .iter()
            .filter(|m| matches!(m.outcome, MessageOutcome::Failed { .. }))
            .filter_map(|m| m.message_id.clone())
            .collect()
    }

    fn count(&self, predicate: impl Fn(&MessageOutcome) -> bool) -> usize {
        self.messages.iter().filter(|m| predicate(&m.outcome)).count()
    }
}

/// Entry of an SQS partial batch response
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemFailure {
    pub item_identifier: String,
}

/// Value returned to the Lambda runtime
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status_code: u16,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub batch_item_failures: Vec<BatchItemFailure>,
}

impl From<&BatchReport> for StatusResponse {
    fn from(report: &BatchReport) -> Self {
        Self {
            status_code: 200,
            batch_item_failures: report
                .failed_message_ids()
                .into_iter()
                .map(|item_identifier| BatchItemFailure { item_identifier })
                .collect(),
        }
    }
}

/// Runs PPE detection for uploaded images and records and announces the results
pub struct DetectionNotifier {
    detector: Arc<dyn PpeDetector>,
    store: Arc<dyn RecordStore>,
    notifier: Arc<dyn Notifier>,
    detection: DetectionConfig,
    handler: HandlerConfig,
}

impl DetectionNotifier {
    pub fn new(
        detector: Arc<dyn PpeDetector>,
        store: Arc<dyn RecordStore>,
        notifier: Arc<dyn Notifier>,
        detection: DetectionConfig,
        handler: HandlerConfig,
    ) -> Self {
        Self {
            detector,
            store,
            notifier,
            detection,
            handler,
        }
    }

    /// Process a batch of queue messages one after another.
    ///
    /// In fail-fast mode the first failing message aborts the batch and the
    /// error is returned; in isolate mode it is recorded and the batch continues.
    #[instrument(skip(self, event), fields(messages = event.records.len()))]
    pub async fn process(&self, event: SqsEvent) -> Result<BatchReport> {
        let mut report = BatchReport::default();

        for message in &event.records {
            let message_id = message.message_id.clone();

            let outcome = match self.process_message(message).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let error_chain = format!("{:#}", e);
                    error!(
                        error = %error_chain,
                        message_id = ?message_id,
                        "Failed to process message"
                    );
                    metrics::counter!("ppe.messages.failed").increment(1);

                    if self.handler.failure_mode == FailureMode::FailFast {
                        return Err(e.context(format!(
                            "Failed to process message {}",
                            message_id.as_deref().unwrap_or("<unknown>")
                        )));
                    }

                    MessageOutcome::Failed { error: error_chain }
                }
            };

            match &outcome {
                MessageOutcome::Processed { .. } => {
                    metrics::counter!("ppe.messages.processed").increment(1)
                }
                MessageOutcome::Skipped => metrics::counter!("ppe.messages.skipped").increment(1),
                MessageOutcome::Failed { .. } => {}
            }

            report.messages.push(MessageReport {
                message_id,
                outcome,
            });
        }

        info!(
            processed = report.processed(),
            skipped = report.skipped(),
            failed = report.failed(),
            "Batch processed"
        );

        Ok(report)
    }

    /// Process a single queue message
    #[instrument(skip(self, message), fields(message_id = ?message.message_id))]
    async fn process_message(&self, message: &SqsMessage) -> Result<MessageOutcome> {
        let Some(upload) = parse_upload(message.body.as_deref())? else {
            debug!("Message carries no upload records, skipping");
            return Ok(MessageOutcome::Skipped);
        };

        let request = DetectionRequest {
            bucket: upload.bucket.clone(),
            image: upload.image.clone(),
            min_confidence: self.detection.min_confidence,
            required_equipment_types: self.detection.required_equipment_types.clone(),
        };

        let response = self.detector.detect(&request).await.with_context(|| {
            format!("PPE detection failed for s3://{}/{}", upload.bucket, upload.image)
        })?;

        let writes = match self.handler.write_mode {
            WriteMode::PerBodyPart => self.record_per_body_part(&upload, &response).await?,
            WriteMode::Aggregate => self.record_aggregate(&upload, &response).await?,
        };

        info!(
            bucket = %upload.bucket,
            image = %upload.image,
            persons = response.persons.len(),
            writes = writes,
            "Image processed"
        );

        Ok(MessageOutcome::Processed {
            image: upload.image,
            writes,
        })
    }

    /// Write and announce after every body part. The record is rebuilt per person
    /// and every write replaces the previous one for the same image.
    async fn record_per_body_part(
        &self,
        upload: &UploadedImage,
        response: &DetectionResponse,
    ) -> Result<usize> {
        let mut writes = 0;

        for person in &response.persons {
            let mut record = DetectionRecord::new(&upload.image);

            for part in &person.body_parts {
                record.body.push(BodyPartEntry {
                    body_part: part.name.clone(),
                    equipment: part.equipment_summary()?,
                });

                self.write_and_notify(&record).await?;
                writes += 1;
            }
        }

        Ok(writes)
    }

    /// One record listing every body part of every person, one notification
    async fn record_aggregate(
        &self,
        upload: &UploadedImage,
        response: &DetectionResponse,
    ) -> Result<usize> {
        let mut record = DetectionRecord::new(&upload.image);
        record.body = response
            .persons
            .iter()
            .flat_map(|person| &person.body_parts)
            .map(|part| {
                Ok(BodyPartEntry {
                    body_part: part.name.clone(),
                    equipment: part.equipment_summary()?,
                })
            })
            .collect::<Result<_>>()?;

        if record.body.is_empty() {
            debug!(image = %upload.image, "No body parts detected, nothing to record");
            return Ok(0);
        }

        self.write_and_notify(&record).await?;

        Ok(1)
    }

    async fn write_and_notify(&self, record: &DetectionRecord) -> Result<()> {
        self.store
            .put_record(record)
            .await
            .with_context(|| format!("Failed to store record for {}", record.image_name))?;
        metrics::counter!("ppe.records.written").increment(1);

        self.notifier
            .notify(&record.image_name)
            .await
            .with_context(|| format!("Failed to send notification for {}", record.image_name))?;
        metrics::counter!("ppe.notifications.sent").increment(1);

        Ok(())
    }
}

/// Lambda entrypoint for SQS batches
#[instrument(skip_all, fields(request_id = %event.context.request_id))]
pub async fn handler(
    notifier: &DetectionNotifier,
    event: LambdaEvent<SqsEvent>,
) -> Result<StatusResponse, Error> {
    let report = notifier.process(event.payload).await?;

    Ok(StatusResponse::from(&report))
}

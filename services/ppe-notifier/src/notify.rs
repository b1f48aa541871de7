use crate::config::NotificationConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_sns::Client as SnsClient;
use aws_types::SdkConfig;
use std::fmt;
use tracing::{debug, info, instrument};

/// Where notifications are published
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Direct SMS
    PhoneNumber(String),
    /// SNS topic fan-out
    Topic(String),
}

impl Destination {
    /// Pick the destination from configuration, preferring a topic
    pub fn from_config(config: &NotificationConfig) -> Result<Self> {
        match (config.topic_arn.as_deref(), config.phone_number.as_deref()) {
            (Some(topic), _) if !topic.is_empty() => Ok(Destination::Topic(topic.to_string())),
            (_, Some(phone)) if !phone.is_empty() => {
                Ok(Destination::PhoneNumber(phone.to_string()))
            }
            _ => anyhow::bail!("no notification destination configured"),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::PhoneNumber(_) => write!(f, "sms"),
            Destination::Topic(arn) => write!(f, "{}", arn),
        }
    }
}

/// Outbound notification seam
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send a plain text message to the configured destination
    async fn notify(&self, message: &str) -> Result<()>;
}

/// Notifier publishing through Amazon SNS
pub struct SnsNotifier {
    client: SnsClient,
    destination: Destination,
}

impl SnsNotifier {
    /// Create a new notifier from shared AWS configuration
    pub fn new(aws_config: &SdkConfig, destination: Destination) -> Self {
        info!(destination = %destination, "SNS notifier initialized");

        Self {
            client: SnsClient::new(aws_config),
            destination,
        }
    }
}

#[async_trait]
impl Notifier for SnsNotifier {
    #[instrument(skip(self, message), fields(destination = %self.destination))]
    async fn notify(&self, message: &str) -> Result<()> {
        let request = self.client.publish().message(message);

        let request = match &self.destination {
            Destination::PhoneNumber(number) => request.phone_number(number),
            Destination::Topic(arn) => request.topic_arn(arn),
        };

        let output = request.send().await.context("Failed to publish notification")?;

        debug!(message_id = ?output.message_id(), "Notification published");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_defaults_to_phone() {
        let config = NotificationConfig::default();
        assert_eq!(
            Destination::from_config(&config).unwrap(),
            Destination::PhoneNumber("+ZZ- ZZZZZZZ".to_string())
        );
    }

    #[test]
    fn test_destination_prefers_topic() {
        let config = NotificationConfig {
            phone_number: Some("+15550100".to_string()),
            topic_arn: Some("arn:aws:sns:us-east-1:123456789012:ppe".to_string()),
        };
        assert_eq!(
            Destination::from_config(&config).unwrap(),
            Destination::Topic("arn:aws:sns:us-east-1:123456789012:ppe".to_string())
        );
    }

    #[test]
    fn test_destination_missing() {
        let config = NotificationConfig {
            phone_number: Some(String::new()),
            topic_arn: None,
        };
        assert!(Destination::from_config(&config).is_err());
    }

    #[test]
    fn test_phone_number_not_logged() {
        let destination = Destination::PhoneNumber("+15550100".to_string());
        assert_eq!(destination.to_string(), "sms");
    }
}

use crate::detection::EquipmentType;
use serde::{de, Deserialize, Deserializer};
use thiserror::Error;

/// Errors that can occur during configuration validation
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Main configuration for the notifier
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// AWS client configuration
    #[serde(default)]
    pub aws: AwsConfig,
    /// PPE detection configuration
    #[serde(default)]
    pub detection: DetectionConfig,
    /// Record store configuration
    #[serde(default)]
    pub store: StoreConfig,
    /// Outbound notification configuration
    #[serde(default)]
    pub notification: NotificationConfig,
    /// Batch handling configuration
    #[serde(default)]
    pub handler: HandlerConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Shared AWS SDK configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AwsConfig {
    /// AWS region, falls back to the provider chain when absent
    pub region: Option<String>,
    /// Custom endpoint URL (for LocalStack)
    pub endpoint_url: Option<String>,
}

/// Detection request parameters
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    /// Minimum confidence on a 0-100 scale
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
    /// Equipment types every person is summarized against
    #[serde(
        default = "default_required_equipment_types",
        deserialize_with = "deserialize_equipment_types"
    )]
    pub required_equipment_types: Vec<EquipmentType>,
}

/// Record store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// DynamoDB table holding one item per image
    #[serde(default = "default_table_name")]
    pub table_name: String,
}

/// Notification destination configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    /// SMS destination
    #[serde(default = "default_phone_number")]
    pub phone_number: Option<String>,
    /// SNS topic destination, takes precedence over the phone number
    pub topic_arn: Option<String>,
}

/// How detection results are written and announced
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// One write and one notification per detected body part
    #[default]
    PerBodyPart,
    /// One write and one notification per image
    Aggregate,
}

/// What happens to the rest of the batch when a message fails
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// The first failure aborts the invocation
    #[default]
    FailFast,
    /// Failures are recorded per message and the batch continues
    Isolate,
}

/// Batch handling configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HandlerConfig {
    #[serde(default)]
    pub write_mode: WriteMode,
    #[serde(default)]
    pub failure_mode: FailureMode,
}

// Default value functions
fn default_service_name() -> String {
    "ppe-notifier".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_min_confidence() -> f32 {
    75.0
}

fn default_required_equipment_types() -> Vec<EquipmentType> {
    vec![EquipmentType::FaceCover, EquipmentType::HeadCover]
}

fn default_table_name() -> String {
    "dynamodb-cpd-2021".to_string()
}

fn default_phone_number() -> Option<String> {
    Some("+ZZ- ZZZZZZZ".to_string())
}

/// Accept either a list or a comma-separated string (environment variables)
fn deserialize_equipment_types<'de, D>(deserializer: D) -> Result<Vec<EquipmentType>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<EquipmentType>),
        Csv(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::List(types) => Ok(types),
        Raw::Csv(csv) => csv
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.parse().map_err(de::Error::custom))
            .collect(),
    }
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .set_default("service.name", default_service_name())?
            .set_default("service.log_level", default_log_level())?
            // Add config file if present
            .add_source(config::File::with_name("config/ppe-notifier").required(false))
            // Override with environment variables
            // PPE_NOTIFIER__STORE__TABLE_NAME -> store.table_name
            // Values stay strings so phone numbers keep their leading '+'
            .add_source(config::Environment::with_prefix("PPE_NOTIFIER").separator("__"))
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=100.0).contains(&self.detection.min_confidence) {
            return Err(ConfigError::InvalidValue {
                key: "detection.min_confidence".to_string(),
                message: format!("{} is outside 0-100", self.detection.min_confidence),
            });
        }

        if self.detection.required_equipment_types.is_empty() {
            return Err(ConfigError::MissingRequired(
                "detection.required_equipment_types".to_string(),
            ));
        }

        if self.store.table_name.is_empty() {
            return Err(ConfigError::MissingRequired("store.table_name".to_string()));
        }

        let has_phone = self
            .notification
            .phone_number
            .as_deref()
            .is_some_and(|p| !p.is_empty());
        let has_topic = self
            .notification
            .topic_arn
            .as_deref()
            .is_some_and(|t| !t.is_empty());

        if !has_phone && !has_topic {
            return Err(ConfigError::MissingRequired(
                "notification.phone_number or notification.topic_arn".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            required_equipment_types: default_required_equipment_types(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            table_name: default_table_name(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            phone_number: default_phone_number(),
            topic_arn: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            aws: AwsConfig::default(),
            detection: DetectionConfig::default(),
            store: StoreConfig::default(),
            notification: NotificationConfig::default(),
            handler: HandlerConfig::default(),
        }
    }
}

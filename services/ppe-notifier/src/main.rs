use anyhow::Context;
use aws_config::BehaviorVersion;
use aws_lambda_events::sqs::SqsEvent;
use aws_types::SdkConfig;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use ppe_notifier::config::AwsConfig;
use ppe_notifier::{
    handler, Config, Destination, DetectionNotifier, DynamoRecordStore, RekognitionDetector,
    SnsNotifier,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        write_mode = ?config.handler.write_mode,
        failure_mode = ?config.handler.failure_mode,
        "Starting Nier PPE notifier"
    );

    // Clients live for the whole execution environment
    let aws_config = load_aws_config(&config.aws).await;

    let destination = Destination::from_config(&config.notification)
        .context("Failed to resolve notification destination")?;

    let notifier = Arc::new(DetectionNotifier::new(
        Arc::new(RekognitionDetector::new(&aws_config)),
        Arc::new(DynamoRecordStore::new(&aws_config, &config.store.table_name)),
        Arc::new(SnsNotifier::new(&aws_config, destination)),
        config.detection.clone(),
        config.handler.clone(),
    ));

    let func = service_fn(move |event: LambdaEvent<SqsEvent>| {
        let notifier = notifier.clone();
        async move { handler(&notifier, event).await }
    });

    run(func).await
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    // CloudWatch stamps every line already
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json().without_time())
        .init();
}

/// Build the shared AWS SDK configuration
async fn load_aws_config(config: &AwsConfig) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());

    if let Some(ref region) = config.region {
        loader = loader.region(aws_config::Region::new(region.clone()));
    }

    // Custom endpoint for LocalStack
    if let Some(ref endpoint_url) = config.endpoint_url {
        loader = loader.endpoint_url(endpoint_url);
    }

    loader.load().await
}

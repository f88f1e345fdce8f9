#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, sync::Arc};

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use cloudwatch_shipper::config::ShipperConfig;
use cloudwatch_shipper::credentials::ProfileCredentialsResolver;
use cloudwatch_shipper::now_millis;
use cloudwatch_shipper::pipeline::ShipperService;
use cloudwatch_shipper::transport::factory::{AwsTransportFactory, TransportFactory};
use cloudwatch_shipper::validator::{abbreviate, ValidationOutcome, Validator, DISPLAY_MESSAGE_MAX_CHARS};

#[tokio::main]
pub async fn main() {
    let log_level = env::var("CWS_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("hyper=off,aws_config=off,aws_smithy_runtime=off,{log_level}");

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let config = match ShipperConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("Invalid configuration: {err}");
            std::process::exit(2);
        }
    };

    let factory = AwsTransportFactory::new(Arc::new(ProfileCredentialsResolver));

    if env::args().nth(1).as_deref() == Some("validate") {
        run_validate(&config, factory).await;
        return;
    }

    let transport = match factory
        .connect(config.region.as_deref(), config.credentials_id.as_deref())
        .await
    {
        Ok(transport) => transport,
        Err(err) => {
            error!("Unable to build CloudWatch client: {err}");
            std::process::exit(2);
        }
    };

    let (service, handle) = ShipperService::new(&config, transport);
    tokio::spawn(service.run());
    info!(
        "shipping stdin to {}/{}",
        config.log_group_name, config.log_stream_name
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if handle.append(line, now_millis()).is_err() {
                        error!("pipeline stopped unexpectedly");
                        break;
                    }
                }
                Ok(None) => {
                    debug!("stdin closed, shutting down");
                    break;
                }
                Err(err) => {
                    error!("failed to read stdin: {err}");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, shutting down");
                break;
            }
        }
    }

    if let Err(err) = handle.flush().await {
        warn!("final flush failed: {err}");
    }
    match handle.shutdown().await {
        Ok(report) => {
            if report.dropped_events > 0 {
                warn!("{} events were dropped under backpressure", report.dropped_events);
            }
            if report.undelivered_events() > 0 {
                error!("{} events were not delivered", report.undelivered_events());
                std::process::exit(1);
            }
            info!("delivered {} events", report.delivered_events);
        }
        Err(err) => {
            error!("shutdown failed: {err}");
            std::process::exit(1);
        }
    }
}

/// Runs the preflight validator against the configured target and reports
/// the outcome, truncated for display.
async fn run_validate(config: &ShipperConfig, factory: AwsTransportFactory) {
    let validator = Validator::new(Arc::new(factory));
    let outcome = validator
        .validate(
            &config.log_group_name,
            config.region.as_deref(),
            config.credentials_id.as_deref(),
        )
        .await;

    let message = abbreviate(outcome.message(), DISPLAY_MESSAGE_MAX_CHARS);
    match outcome {
        ValidationOutcome::Ok(_) => info!("validation succeeded: {message}"),
        ValidationOutcome::Warning(_) => warn!("validation warning: {message}"),
        ValidationOutcome::Error(_) => {
            error!("validation failed: {message}");
            std::process::exit(1);
        }
    }
}

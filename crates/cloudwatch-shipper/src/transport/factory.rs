//! Client construction for a given region and credentials identifier.
//!
//! The factory is the dependency-injection seam replacing any global
//! "current client" state: the validator and the agent binary take a factory
//! instance and ask it for a transport scoped to the call that needs it.

use std::sync::Arc;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};

use crate::credentials::CredentialsResolver;
use crate::transport::cloudwatch::CloudWatchTransport;
use crate::transport::{LogsTransport, TransportError};

/// Builds an authenticated transport for a region/credentials pair.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// `region: None` falls back to the environment's default region;
    /// `credentials_id: None` falls back to the default provider chain.
    async fn connect(
        &self,
        region: Option<&str>,
        credentials_id: Option<&str>,
    ) -> Result<Arc<dyn LogsTransport>, TransportError>;
}

/// AWS SDK-backed factory.
pub struct AwsTransportFactory {
    resolver: Arc<dyn CredentialsResolver>,
}

impl AwsTransportFactory {
    #[must_use]
    pub fn new(resolver: Arc<dyn CredentialsResolver>) -> Self {
        AwsTransportFactory { resolver }
    }
}

#[async_trait]
impl TransportFactory for AwsTransportFactory {
    async fn connect(
        &self,
        region: Option<&str>,
        credentials_id: Option<&str>,
    ) -> Result<Arc<dyn LogsTransport>, TransportError> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region.to_string()));
        }
        if let Some(credentials_id) = credentials_id {
            loader = loader.credentials_provider(self.resolver.resolve(credentials_id).await?);
        }
        let sdk_config = loader.load().await;
        Ok(Arc::new(CloudWatchTransport::new(&sdk_config)))
    }
}

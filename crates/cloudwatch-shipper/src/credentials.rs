//! Credentials collaborator.
//!
//! The pipeline never stores credentials itself; it resolves an opaque
//! credentials identifier through this seam and hands the result to the AWS
//! config loader. Resolution is deferred until a client is actually built,
//! so a misconfigured identifier surfaces at validate/connect time rather
//! than at startup.

use async_trait::async_trait;
use aws_credential_types::provider::SharedCredentialsProvider;

use crate::transport::TransportError;

/// Resolves an opaque credentials identifier to an AWS credentials provider.
///
/// Implementations are pure lookups; when no identifier is configured the
/// caller skips resolution entirely and the SDK's default provider chain
/// applies.
#[async_trait]
pub trait CredentialsResolver: Send + Sync {
    async fn resolve(
        &self,
        credentials_id: &str,
    ) -> Result<SharedCredentialsProvider, TransportError>;
}

/// Maps a credentials identifier to a named profile in the AWS shared
/// config/credentials files.
///
/// The provider is lazy: a bad profile name fails on first use, which the
/// validator reports as a credentials error.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProfileCredentialsResolver;

#[async_trait]
impl CredentialsResolver for ProfileCredentialsResolver {
    async fn resolve(
        &self,
        credentials_id: &str,
    ) -> Result<SharedCredentialsProvider, TransportError> {
        let provider = aws_config::profile::ProfileFileCredentialsProvider::builder()
            .profile_name(credentials_id)
            .build();
        Ok(SharedCredentialsProvider::new(provider))
    }
}

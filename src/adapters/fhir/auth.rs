//! Credential suppliers for the FHIR client
//!
//! Token acquisition and refresh live outside this crate. The client only asks a
//! [`CredentialProvider`] for the `Authorization` header value before each request.

use crate::config::SecretString;
use crate::domain::ExtractError;
use async_trait::async_trait;
use secrecy::ExposeSecret;

/// Supplier of the `Authorization` header
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Header value to send, or `None` for unauthenticated requests
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Authentication`] if no credential can be produced;
    /// the extraction of the current resource type is then aborted.
    async fn authorization_header(&self) -> Result<Option<String>, ExtractError>;
}

/// Fixed bearer token read from configuration
pub struct StaticBearer {
    token: SecretString,
}

impl StaticBearer {
    /// Wrap a token
    pub fn new(token: SecretString) -> Self {
        Self { token }
    }
}

#[async_trait]
impl CredentialProvider for StaticBearer {
    async fn authorization_header(&self) -> Result<Option<String>, ExtractError> {
        let token: &str = self.token.expose_secret().as_ref();
        if token.is_empty() {
            return Err(ExtractError::Authentication("bearer token is empty".to_string()));
        }
        Ok(Some(format!("Bearer {token}")))
    }
}

impl std::fmt::Debug for StaticBearer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticBearer").finish_non_exhaustive()
    }
}

/// No credentials (open test servers)
#[derive(Debug, Default, Clone, Copy)]
pub struct Anonymous;

#[async_trait]
impl CredentialProvider for Anonymous {
    async fn authorization_header(&self) -> Result<Option<String>, ExtractError> {
        Ok(None)
    }
}

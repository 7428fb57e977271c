//! FHIR REST client
//!
//! Issues single search requests and classifies every failure into an
//! [`ExtractError`]. Retrying is not done here: the extraction coordinator owns
//! the retry state machine so attempt counting stays in one place.

use super::auth::{Anonymous, CredentialProvider, StaticBearer};
use super::rate_limit::RateLimiter;
use crate::config::FhirConfig;
use crate::domain::{ExtractError, ResourceType, Result, StrataError};
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client, ClientBuilder, Response, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const FHIR_JSON: &str = "application/fhir+json";

/// Longest error body kept in an error message
const MAX_ERROR_BODY: usize = 512;

/// HTTP client for a FHIR server's search API
#[derive(Clone)]
pub struct FhirClient {
    http: Client,
    base_url: Url,
    credentials: Arc<dyn CredentialProvider>,
    limiter: RateLimiter,
}

impl FhirClient {
    /// Create a client with an explicit credential supplier
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the base URL is invalid or the HTTP
    /// client cannot be built.
    pub fn new(config: &FhirConfig, credentials: Arc<dyn CredentialProvider>) -> Result<Self> {
        let base_url = Url::parse(config.base_url.trim_end_matches('/')).map_err(|e| {
            StrataError::Configuration(format!("invalid fhir.base_url '{}': {e}", config.base_url))
        })?;

        let http = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(config.timeout_seconds.min(30)))
            .build()
            .map_err(|e| StrataError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url,
            credentials,
            limiter: RateLimiter::new(&config.rate_limit),
        })
    }

    /// Create a client using the configured bearer token, if any
    pub fn from_config(config: &FhirConfig) -> Result<Self> {
        let credentials: Arc<dyn CredentialProvider> = match &config.bearer_token {
            Some(token) => Arc::new(StaticBearer::new(token.clone())),
            None => Arc::new(Anonymous),
        };
        Self::new(config, credentials)
    }

    /// Server base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Search URL for a resource type with query parameters
    pub fn search_url(&self, resource_type: &ResourceType, params: &[(&str, String)]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(resource_type.as_str());
        }
        if !params.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())));
        }
        url
    }

    /// Fetch one page of search results
    ///
    /// Waits for the rate limiter, then performs exactly one GET.
    ///
    /// # Errors
    ///
    /// - `Timeout` / `Connection` for transport failures
    /// - `RateLimited` for 429, `ServerError` for 5xx (both carry `Retry-After`)
    /// - `Authentication` for 401/403, `ClientError` for other 4xx
    /// - `InvalidResponse` when the body is not JSON
    pub async fn fetch_page(&self, url: &Url) -> std::result::Result<Value, ExtractError> {
        self.limiter.wait().await;

        let mut request = self.http.get(url.clone()).header(ACCEPT, FHIR_JSON);
        if let Some(header) = self.credentials.authorization_header().await? {
            request = request.header(AUTHORIZATION, header);
        }

        tracing::debug!(url = %url, "Fetching search page");
        let response = request.send().await.map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(error_for_status(status, response).await);
        }

        let body = response.bytes().await.map_err(map_transport_error)?;
        serde_json::from_slice(&body)
            .map_err(|e| ExtractError::InvalidResponse(format!("body is not JSON: {e}")))
    }
}

impl std::fmt::Debug for FhirClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FhirClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

fn map_transport_error(e: reqwest::Error) -> ExtractError {
    if e.is_timeout() {
        ExtractError::Timeout(e.to_string())
    } else if e.is_connect() || e.is_request() {
        ExtractError::Connection(e.to_string())
    } else if e.is_decode() || e.is_body() {
        ExtractError::InvalidResponse(e.to_string())
    } else {
        ExtractError::Connection(e.to_string())
    }
}

async fn error_for_status(status: StatusCode, response: Response) -> ExtractError {
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| parse_retry_after(v, Utc::now()));
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let cut = (0..=MAX_ERROR_BODY).rev().find(|i| body.is_char_boundary(*i)).unwrap_or(0);
        body.truncate(cut);
    }
    classify_status(status.as_u16(), body, retry_after)
}

/// Map a non-success HTTP status onto the extraction error taxonomy
pub fn classify_status(status: u16, message: String, retry_after: Option<Duration>) -> ExtractError {
    match status {
        401 | 403 => ExtractError::Authentication(format!("HTTP {status}: {message}")),
        429 => ExtractError::RateLimited { retry_after },
        500..=599 => ExtractError::ServerError {
            status,
            message,
            retry_after,
        },
        _ => ExtractError::ClientError { status, message },
    }
}

/// Parse a `Retry-After` value: delay seconds or an HTTP-date
///
/// A date in the past yields a zero delay.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use test_case::test_case;

    fn config(base_url: &str) -> FhirConfig {
        FhirConfig {
            base_url: base_url.to_string(),
            ..FhirConfig::default()
        }
    }

    #[test_case(401, false ; "unauthorized")]
    #[test_case(403, false ; "forbidden")]
    #[test_case(404, false ; "not found")]
    #[test_case(410, false ; "gone")]
    #[test_case(429, true ; "too many requests")]
    #[test_case(500, true ; "internal error")]
    #[test_case(503, true ; "unavailable")]
    fn test_classify_status_transience(status: u16, transient: bool) {
        assert_eq!(classify_status(status, String::new(), None).is_transient(), transient);
    }

    #[test]
    fn test_classify_keeps_retry_after() {
        let err = classify_status(503, "down".to_string(), Some(Duration::from_secs(7)));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
        assert!(matches!(
            classify_status(401, String::new(), None),
            ExtractError::Authentication(_)
        ));
    }

    #[test]
    fn test_parse_retry_after_seconds() {
        assert_eq!(parse_retry_after(" 120 ", Utc::now()), Some(Duration::from_secs(120)));
        assert_eq!(parse_retry_after("soon", Utc::now()), None);
    }

    #[test]
    fn test_parse_retry_after_http_date() {
        let now = Utc.with_ymd_and_hms(2015, 10, 21, 7, 27, 0).unwrap();
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT", now),
            Some(Duration::from_secs(60))
        );
        let later = Utc.with_ymd_and_hms(2015, 10, 21, 8, 0, 0).unwrap();
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT", later),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn test_search_url() {
        let client = FhirClient::from_config(&config("https://fhir.example.com/r4/")).unwrap();
        let rt = ResourceType::new("Observation").unwrap();
        let url = client.search_url(&rt, &[("_count", "50".to_string())]);
        assert_eq!(url.as_str(), "https://fhir.example.com/r4/Observation?_count=50");
    }

    #[test]
    fn test_invalid_base_url() {
        let err = FhirClient::from_config(&config("not a url")).unwrap_err();
        assert!(matches!(err, StrataError::Configuration(_)));
    }
}

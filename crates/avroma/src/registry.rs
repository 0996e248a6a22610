//! Schema registry clients
//!
//! The decode pipeline only needs one operation from a registry: fetch the
//! schema text for an id. [`SchemaFetcher`] is that seam. Implementations:
//!
//! - [`ExternalRegistry`]: Confluent-compatible HTTP registry
//!   (`GET /schemas/ids/{id}`)
//! - [`StaticRegistry`]: schemas held in memory, for tests and offline decoding
//! - [`RetryingFetcher`]: bounded exponential backoff around any fetcher
//!
//! No caching happens here; [`crate::SchemaCache`] owns that.

use crate::config::{RegistryConfig, RetryConfig};
use crate::error::{error_codes, RegistryError, RegistryResult};
use crate::types::{SchemaDefinition, SchemaId};
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const SCHEMA_REGISTRY_MEDIA_TYPE: &str = "application/vnd.schemaregistry.v1+json";

/// Fetch a schema definition by id
#[async_trait]
pub trait SchemaFetcher: Send + Sync {
    async fn fetch_schema(&self, id: SchemaId) -> RegistryResult<SchemaDefinition>;
}

#[async_trait]
impl<T: SchemaFetcher + ?Sized> SchemaFetcher for Arc<T> {
    async fn fetch_schema(&self, id: SchemaId) -> RegistryResult<SchemaDefinition> {
        (**self).fetch_schema(id).await
    }
}

/// Response from getting a schema by ID
#[derive(Debug, Deserialize)]
struct GetSchemaResponse {
    schema: String,
    #[serde(rename = "schemaType", default)]
    schema_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error_code: Option<u32>,
    message: Option<String>,
}

/// Confluent-compatible registry client
pub struct ExternalRegistry {
    client: Client,
    base_url: String,
}

impl ExternalRegistry {
    pub fn new(config: &RegistryConfig) -> RegistryResult<Self> {
        let mut client_builder =
            Client::builder().timeout(Duration::from_secs(config.timeout_secs));

        if let Some((username, password)) = config.credentials() {
            use base64::Engine;
            use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};

            let credentials = format!("{}:{}", username, password.expose_secret());
            let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);

            let mut auth_value = HeaderValue::from_str(&format!("Basic {}", encoded))
                .map_err(|e| RegistryError::Config(e.to_string()))?;
            auth_value.set_sensitive(true);

            let mut headers = HeaderMap::new();
            headers.insert(AUTHORIZATION, auth_value);
            client_builder = client_builder.default_headers(headers);
        }

        let client = client_builder
            .build()
            .map_err(|e| RegistryError::Config(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get schema text by ID
    pub async fn get_by_id(&self, id: SchemaId) -> RegistryResult<SchemaDefinition> {
        let url = format!("{}/schemas/ids/{}", self.base_url, id.0);

        let response = self
            .client
            .get(&url)
            .header("Accept", SCHEMA_REGISTRY_MEDIA_TYPE)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(parse_error(status, &body));
        }

        let result: GetSchemaResponse = response.json().await?;
        if let Some(schema_type) = result.schema_type.as_deref() {
            if !schema_type.eq_ignore_ascii_case("AVRO") {
                warn!(schema_id = %id, schema_type, "Registry returned a non-Avro schema");
            }
        }

        debug!(schema_id = %id, "Fetched schema from registry");
        Ok(SchemaDefinition::from(result.schema))
    }

    /// List all subjects. Used as a connectivity probe at start-up.
    pub async fn list_subjects(&self) -> RegistryResult<Vec<String>> {
        let url = format!("{}/subjects", self.base_url);

        let response = self
            .client
            .get(&url)
            .header("Accept", SCHEMA_REGISTRY_MEDIA_TYPE)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(parse_error(status, &body));
        }

        let subjects: Vec<String> = response.json().await?;
        info!(
            url = %self.base_url,
            subjects = subjects.len(),
            "Connected to schema registry"
        );
        Ok(subjects)
    }
}

#[async_trait]
impl SchemaFetcher for ExternalRegistry {
    async fn fetch_schema(&self, id: SchemaId) -> RegistryResult<SchemaDefinition> {
        self.get_by_id(id).await
    }
}

fn parse_error(status: StatusCode, body: &str) -> RegistryError {
    let parsed = serde_json::from_str::<ErrorResponse>(body).ok();
    let error_code = parsed.as_ref().and_then(|e| e.error_code);
    let msg = parsed
        .and_then(|e| e.message)
        .unwrap_or_else(|| body.to_string());

    match (error_code, status) {
        (Some(error_codes::SCHEMA_NOT_FOUND), _) => RegistryError::SchemaNotFound(msg),
        (Some(error_codes::SUBJECT_NOT_FOUND | error_codes::VERSION_NOT_FOUND), _) => {
            RegistryError::InvalidResponse(msg)
        }
        // Bad credentials will not fix themselves between attempts
        (_, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
            RegistryError::Config(format!("Registry rejected credentials ({}): {}", status, msg))
        }
        (_, StatusCode::NOT_FOUND) => RegistryError::SchemaNotFound(msg),
        _ => RegistryError::Network(format!("{}: {}", status, msg)),
    }
}

/// Retries retryable fetch failures with exponential backoff
pub struct RetryingFetcher<F> {
    inner: F,
    retry: RetryConfig,
}

impl<F: SchemaFetcher> RetryingFetcher<F> {
    pub fn new(inner: F, retry: RetryConfig) -> Self {
        Self { inner, retry }
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }
}

#[async_trait]
impl<F: SchemaFetcher> SchemaFetcher for RetryingFetcher<F> {
    async fn fetch_schema(&self, id: SchemaId) -> RegistryResult<SchemaDefinition> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut backoff_ms = self.retry.initial_ms;
        let mut attempt = 1;

        loop {
            match self.inner.fetch_schema(id).await {
                Ok(definition) => return Ok(definition),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    warn!(
                        schema_id = %id,
                        attempt,
                        max_attempts,
                        backoff_ms,
                        error = %e,
                        "Schema fetch failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms =
                        ((backoff_ms as f64 * self.retry.multiplier) as u64).min(self.retry.max_ms);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// In-memory registry
///
/// Holds schemas registered up-front and counts every fetch, which makes it
/// useful both for decoding with local schema files and for asserting how
/// often the pipeline went to the registry.
#[derive(Debug, Default)]
pub struct StaticRegistry {
    schemas: RwLock<HashMap<SchemaId, SchemaDefinition>>,
    fetches: AtomicU64,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration
    pub fn with_schema(self, id: SchemaId, definition: impl Into<SchemaDefinition>) -> Self {
        self.insert(id, definition);
        self
    }

    pub fn insert(&self, id: SchemaId, definition: impl Into<SchemaDefinition>) {
        self.schemas.write().insert(id, definition.into());
    }

    /// Number of `fetch_schema` calls so far, successful or not
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SchemaFetcher for StaticRegistry {
    async fn fetch_schema(&self, id: SchemaId) -> RegistryResult<SchemaDefinition> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        self.schemas
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| RegistryError::SchemaNotFound(format!("Schema {} not found", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    /// Fails with a network error a fixed number of times, then succeeds
    struct Flaky {
        failures_left: AtomicU32,
        calls: AtomicU32,
    }

    impl Flaky {
        fn new(failures: u32) -> Self {
            Self {
                failures_left: AtomicU32::new(failures),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl SchemaFetcher for Flaky {
        async fn fetch_schema(&self, _id: SchemaId) -> RegistryResult<SchemaDefinition> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(RegistryError::Network("connection reset".into()));
            }
            Ok(SchemaDefinition::from(r#""int""#))
        }
    }

    fn fast_retry(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_ms: 1,
            max_ms: 2,
            multiplier: 2.0,
        }
    }

    #[tokio::test]
    async fn test_static_registry_counts_fetches() {
        let registry = StaticRegistry::new().with_schema(SchemaId(1), r#""string""#);

        assert_eq!(
            registry.fetch_schema(SchemaId(1)).await.unwrap().as_str(),
            r#""string""#
        );
        assert!(matches!(
            registry.fetch_schema(SchemaId(2)).await,
            Err(RegistryError::SchemaNotFound(_))
        ));
        assert_eq!(registry.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failures() {
        let fetcher = RetryingFetcher::new(Flaky::new(2), fast_retry(3));
        assert!(fetcher.fetch_schema(SchemaId(1)).await.is_ok());
        assert_eq!(fetcher.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        let fetcher = RetryingFetcher::new(Flaky::new(10), fast_retry(3));
        assert!(matches!(
            fetcher.fetch_schema(SchemaId(1)).await,
            Err(RegistryError::Network(_))
        ));
        assert_eq!(fetcher.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let fetcher = RetryingFetcher::new(StaticRegistry::new(), fast_retry(5));
        assert!(fetcher.fetch_schema(SchemaId(4)).await.is_err());
        assert_eq!(fetcher.inner().fetch_count(), 1);
    }

    #[test]
    fn test_parse_confluent_errors() {
        let err = parse_error(
            StatusCode::NOT_FOUND,
            r#"{"error_code":40403,"message":"Schema 7 not found"}"#,
        );
        assert!(matches!(err, RegistryError::SchemaNotFound(ref m) if m == "Schema 7 not found"));

        let err = parse_error(StatusCode::INTERNAL_SERVER_ERROR, "upstream down");
        assert!(matches!(err, RegistryError::Network(_)));
        assert!(err.is_retryable());

        let err = parse_error(StatusCode::NOT_FOUND, "<html>nope</html>");
        assert!(matches!(err, RegistryError::SchemaNotFound(_)));
    }

    #[test]
    fn test_auth_failures_are_not_retryable() {
        for status in [StatusCode::UNAUTHORIZED, StatusCode::FORBIDDEN] {
            let err = parse_error(status, r#"{"error_code":40101,"message":"Unauthorized"}"#);
            assert!(matches!(err, RegistryError::Config(_)));
            assert!(!err.is_retryable());
        }
        assert!(matches!(
            parse_error(StatusCode::UNAUTHORIZED, ""),
            RegistryError::Config(_)
        ));
    }

    #[test]
    fn test_external_registry_trims_trailing_slash() {
        let config = RegistryConfig {
            url: "http://registry:8081/".into(),
            ..Default::default()
        };
        let registry = ExternalRegistry::new(&config).unwrap();
        assert_eq!(registry.base_url(), "http://registry:8081");
    }
}

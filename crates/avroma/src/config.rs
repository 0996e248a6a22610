//! Configuration for the avroma consumer
//!
//! Loaded from YAML. `${VAR}` and `${VAR:-default}` references are expanded
//! from the environment before parsing.
//!
//! ```yaml
//! kafka:
//!   brokers: ["localhost:9092"]
//!   topics: ["orders"]
//!   group: order-audit
//!   start_offset: earliest
//! registry:
//!   url: http://localhost:8081
//!   username: ${REGISTRY_USER:-}
//!   password: ${REGISTRY_PASSWORD:-}
//! consumer:
//!   mark_messages: true
//!   on_registry_failure: halt
//! ```

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;
use validator::Validate;

/// Pre-compiled regex for environment variable expansion
/// Pattern: ${VAR} or ${VAR:-default}
static ENV_VAR_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*)(?::-([^}]*))?\}")
        .expect("env var regex pattern is invalid - this is a bug")
});

/// A string that is redacted in `Debug`, `Display` and serialized output
#[derive(Clone)]
pub struct SensitiveString(SecretString);

impl SensitiveString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::new(value.into().into_boxed_str()))
    }

    /// Use only where the real value is required, such as request auth.
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for SensitiveString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl std::fmt::Display for SensitiveString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl From<String> for SensitiveString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SensitiveString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl Serialize for SensitiveString {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("***REDACTED***")
    }
}

impl<'de> Deserialize<'de> for SensitiveString {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Self::new(value))
    }
}

/// Where a partition starts reading when the consumer comes up
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StartOffset {
    #[default]
    Earliest,
    Latest,
}

/// What to do when a schema cannot be fetched from the registry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryFailurePolicy {
    /// Stop every partition and return the error from the run
    #[default]
    Halt,
    /// Log, report and move on to the next message
    Skip,
}

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct AvromaConfig {
    #[serde(default)]
    #[validate(nested)]
    pub kafka: KafkaConfig,

    #[serde(default)]
    #[validate(nested)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub consumer: ConsumerConfig,
}

/// Kafka connection and fetch settings
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct KafkaConfig {
    /// Bootstrap broker addresses
    #[validate(length(min = 1))]
    pub brokers: Vec<String>,

    /// Topics to follow
    #[validate(length(min = 1))]
    pub topics: Vec<String>,

    /// Consumer group name, used as client id and in logs
    #[serde(default = "default_group")]
    #[validate(length(min = 1, max = 249))]
    pub group: String,

    #[serde(default)]
    pub start_offset: StartOffset,

    /// Maximum bytes per fetch request (default: 1 MiB)
    #[serde(default = "default_fetch_max_bytes")]
    #[validate(range(min = 1024, max = 104857600))]
    pub fetch_max_bytes: i32,

    /// Maximum time the broker waits for data (default: 500)
    #[serde(default = "default_fetch_max_wait_ms")]
    #[validate(range(min = 1, max = 60000))]
    pub fetch_max_wait_ms: i32,

    /// Connection timeout in milliseconds (default: 30000 = 30 seconds)
    #[serde(default = "default_connect_timeout")]
    #[validate(range(min = 1000, max = 300000))]
    pub connect_timeout_ms: u64,

    /// Initial retry delay in milliseconds on fetch error (default: 100)
    #[serde(default = "default_retry_initial_ms")]
    #[validate(range(min = 10, max = 60000))]
    pub retry_initial_ms: u64,

    /// Maximum retry delay in milliseconds (default: 10000)
    #[serde(default = "default_retry_max_ms")]
    #[validate(range(min = 100, max = 300000))]
    pub retry_max_ms: u64,

    /// Backoff multiplier for retries (default: 2.0)
    #[serde(default = "default_retry_multiplier")]
    #[validate(range(min = 1.0, max = 10.0))]
    pub retry_multiplier: f64,

    /// Delay on empty poll in milliseconds (default: 50)
    #[serde(default = "default_empty_poll_delay_ms")]
    #[validate(range(min = 1, max = 10000))]
    pub empty_poll_delay_ms: u64,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: Vec::new(),
            topics: Vec::new(),
            group: default_group(),
            start_offset: StartOffset::default(),
            fetch_max_bytes: default_fetch_max_bytes(),
            fetch_max_wait_ms: default_fetch_max_wait_ms(),
            connect_timeout_ms: default_connect_timeout(),
            retry_initial_ms: default_retry_initial_ms(),
            retry_max_ms: default_retry_max_ms(),
            retry_multiplier: default_retry_multiplier(),
            empty_poll_delay_ms: default_empty_poll_delay_ms(),
        }
    }
}

/// Schema registry connection settings
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct RegistryConfig {
    /// Registry base URL
    #[validate(url)]
    #[serde(default = "default_registry_url")]
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<SensitiveString>,

    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_registry_timeout")]
    #[validate(range(min = 1, max = 300))]
    pub timeout_secs: u64,

    #[serde(default)]
    #[validate(nested)]
    pub retry: RetryConfig,
}

impl RegistryConfig {
    /// Basic-auth credentials, ignoring blanks left by unset env references
    pub fn credentials(&self) -> Option<(&str, &SensitiveString)> {
        let username = self.username.as_deref().filter(|u| !u.is_empty())?;
        let password = self
            .password
            .as_ref()
            .filter(|p| !p.expose_secret().is_empty())?;
        Some((username, password))
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: default_registry_url(),
            username: None,
            password: None,
            timeout_secs: default_registry_timeout(),
            retry: RetryConfig::default(),
        }
    }
}

/// Exponential backoff for registry fetches
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct RetryConfig {
    /// Total attempts including the first (default: 5)
    #[serde(default = "default_max_attempts")]
    #[validate(range(min = 1, max = 100))]
    pub max_attempts: u32,

    #[serde(default = "default_retry_initial_ms")]
    #[validate(range(min = 1, max = 60000))]
    pub initial_ms: u64,

    #[serde(default = "default_retry_max_ms")]
    #[validate(range(min = 1, max = 300000))]
    pub max_ms: u64,

    #[serde(default = "default_retry_multiplier")]
    #[validate(range(min = 1.0, max = 10.0))]
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_ms: default_retry_initial_ms(),
            max_ms: default_retry_max_ms(),
            multiplier: default_retry_multiplier(),
        }
    }
}

/// Delivery behaviour
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConsumerConfig {
    /// Advance the committed position only after the handler succeeds
    #[serde(default = "default_true")]
    pub mark_messages: bool,

    #[serde(default)]
    pub on_registry_failure: RegistryFailurePolicy,

    /// Debug logging for the transport
    #[serde(default)]
    pub verbose: bool,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            mark_messages: true,
            on_registry_failure: RegistryFailurePolicy::default(),
            verbose: false,
        }
    }
}

fn default_group() -> String {
    "avroma".to_string()
}
fn default_fetch_max_bytes() -> i32 {
    1_048_576
}
fn default_fetch_max_wait_ms() -> i32 {
    500
}
fn default_connect_timeout() -> u64 {
    30000
}
fn default_retry_initial_ms() -> u64 {
    100
}
fn default_retry_max_ms() -> u64 {
    10000
}
fn default_retry_multiplier() -> f64 {
    2.0
}
fn default_empty_poll_delay_ms() -> u64 {
    50
}
fn default_registry_url() -> String {
    "http://localhost:8081".to_string()
}
fn default_registry_timeout() -> u64 {
    30
}
fn default_max_attempts() -> u32 {
    5
}
fn default_true() -> bool {
    true
}

impl AvromaConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let expanded = Self::expand_env_vars(content);

        let config: Self = serde_yaml::from_str(&expanded)
            .map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))?;

        config.check()?;
        Ok(config)
    }

    /// Expand environment variables in the format ${VAR} or ${VAR:-default}
    fn expand_env_vars(content: &str) -> String {
        ENV_VAR_REGEX
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                let default = caps.get(2).map(|m| m.as_str());

                std::env::var(var_name).unwrap_or_else(|_| default.unwrap_or("").to_string())
            })
            .to_string()
    }

    /// Field-level validation plus the cross-field rules
    pub fn check(&self) -> anyhow::Result<()> {
        self.validate()
            .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

        if let Some(broker) = self.kafka.brokers.iter().find(|b| b.trim().is_empty()) {
            anyhow::bail!("Broker address must not be empty (got '{}')", broker);
        }
        if self.kafka.topics.iter().any(|t| t.trim().is_empty()) {
            anyhow::bail!("Topic names must not be empty");
        }
        if self.kafka.retry_initial_ms > self.kafka.retry_max_ms {
            anyhow::bail!("kafka.retry_initial_ms must not exceed kafka.retry_max_ms");
        }
        if self.registry.retry.initial_ms > self.registry.retry.max_ms {
            anyhow::bail!("registry.retry.initial_ms must not exceed registry.retry.max_ms");
        }
        // Empty values come from unset `${VAR:-}` references
        let username = self.registry.username.as_deref().filter(|u| !u.is_empty());
        let password = self
            .registry
            .password
            .as_ref()
            .filter(|p| !p.expose_secret().is_empty());
        if username.is_some() != password.is_some() {
            anyhow::bail!("registry.username and registry.password must be set together");
        }
        Ok(())
    }

    pub fn brokers<I, S>(mut self, brokers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.kafka.brokers = brokers.into_iter().map(Into::into).collect();
        self
    }

    pub fn topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.kafka.topics = topics.into_iter().map(Into::into).collect();
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.kafka.group = group.into();
        self
    }

    /// Start new partitions at the earliest retained offset instead of the end
    pub fn oldest(mut self, oldest: bool) -> Self {
        self.kafka.start_offset = if oldest {
            StartOffset::Earliest
        } else {
            StartOffset::Latest
        };
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.consumer.verbose = verbose;
        self
    }

    pub fn mark_messages(mut self, mark: bool) -> Self {
        self.consumer.mark_messages = mark;
        self
    }

    pub fn schema_registry_url(mut self, url: impl Into<String>) -> Self {
        self.registry.url = url.into();
        self
    }

    pub fn registry_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<SensitiveString>,
    ) -> Self {
        self.registry.username = Some(username.into());
        self.registry.password = Some(password.into());
        self
    }

    pub fn on_registry_failure(mut self, policy: RegistryFailurePolicy) -> Self {
        self.consumer.on_registry_failure = policy;
        self
    }
}

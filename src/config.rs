//! Configuration for the invoice extraction service.
//!
//! Every knob lives in [`ServiceConfig`], built once at process start and
//! handed to the HTTP handlers through [`crate::server::AppState`]. Nothing is
//! read from module-level state after start-up, so two services with different
//! upload directories or models can run side by side in one process (the
//! integration tests rely on this).

use crate::error::ExtractError;
use crate::pipeline::validate::MAX_UPLOAD_BYTES;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Model used when a provider is named without a model.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Provider used when `GEMINI_API_KEY` is the only hint in the environment.
pub const DEFAULT_PROVIDER: &str = "gemini";

/// Configuration for the extraction service.
///
/// Built via [`ServiceConfig::builder()`] or using
/// [`ServiceConfig::default()`].
///
/// # Example
/// ```rust
/// use invoice_vision::ServiceConfig;
///
/// let config = ServiceConfig::builder()
///     .port(5000)
///     .upload_dir("/tmp/invoices")
///     .model("gemini-2.0-flash")
///     .build()
///     .unwrap();
/// assert_eq!(config.port, 5000);
/// ```
#[derive(Clone)]
pub struct ServiceConfig {
    /// Interface to bind. Default: "0.0.0.0".
    pub host: String,

    /// TCP port to bind. Default: 5000.
    pub port: u16,

    /// Working directory for uploads awaiting extraction. Default: "uploads".
    ///
    /// Files only live here for the duration of one request; each gets a
    /// generated unique name so identically named uploads never collide.
    pub upload_dir: PathBuf,

    /// Request body ceiling in bytes. Default: 16 MiB.
    pub max_upload_bytes: usize,

    /// LLM provider name (e.g. "gemini", "openai", "anthropic").
    /// If None along with `provider`, the provider is auto-detected.
    pub provider_name: Option<String>,

    /// LLM model identifier. If None, [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    ///
    /// Extraction is transcription, not writing; a low value keeps the model
    /// faithful to the digits it sees.
    pub temperature: f32,

    /// Maximum tokens the model may generate per invoice. Default: 4096.
    pub max_tokens: usize,

    /// Upper bound on one model call in seconds. Default: 60.
    pub model_timeout_secs: u64,

    /// Attempts made to delete an upload after extraction. Default: 5.
    pub delete_attempts: u32,

    /// Pause between failed delete attempts in milliseconds. Default: 1000.
    pub delete_retry_delay_ms: u64,

    /// Remove files left behind in `upload_dir` by earlier runs. Default: true.
    pub sweep_on_start: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            upload_dir: PathBuf::from("uploads"),
            max_upload_bytes: MAX_UPLOAD_BYTES,
            provider_name: None,
            model: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 4096,
            model_timeout_secs: 60,
            delete_attempts: 5,
            delete_retry_delay_ms: 1000,
            sweep_on_start: true,
        }
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("upload_dir", &self.upload_dir)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("model_timeout_secs", &self.model_timeout_secs)
            .field("delete_attempts", &self.delete_attempts)
            .field("delete_retry_delay_ms", &self.delete_retry_delay_ms)
            .field("sweep_on_start", &self.sweep_on_start)
            .finish()
    }
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }

    /// `host:port` string suitable for `TcpListener::bind`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout_secs)
    }

    pub fn delete_retry_delay(&self) -> Duration {
        Duration::from_millis(self.delete_retry_delay_ms)
    }

    /// The model name actually sent to the provider.
    pub fn model_or_default(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.upload_dir = dir.into();
        self
    }

    pub fn max_upload_bytes(mut self, n: usize) -> Self {
        self.config.max_upload_bytes = n;
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn model_timeout_secs(mut self, secs: u64) -> Self {
        self.config.model_timeout_secs = secs;
        self
    }

    pub fn delete_attempts(mut self, n: u32) -> Self {
        self.config.delete_attempts = n;
        self
    }

    pub fn delete_retry_delay_ms(mut self, ms: u64) -> Self {
        self.config.delete_retry_delay_ms = ms;
        self
    }

    pub fn sweep_on_start(mut self, v: bool) -> Self {
        self.config.sweep_on_start = v;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, ExtractError> {
        let c = &self.config;
        if c.max_upload_bytes == 0 {
            return Err(ExtractError::InvalidConfig(
                "Upload limit must be ≥ 1 byte".into(),
            ));
        }
        if c.model_timeout_secs == 0 {
            return Err(ExtractError::InvalidConfig(
                "Model timeout must be ≥ 1 second".into(),
            ));
        }
        if c.delete_attempts == 0 {
            return Err(ExtractError::InvalidConfig(
                "Delete attempts must be ≥ 1".into(),
            ));
        }
        if c.upload_dir.as_os_str().is_empty() {
            return Err(ExtractError::InvalidConfig(
                "Upload directory must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_contract() {
        let c = ServiceConfig::default();
        assert_eq!(c.max_upload_bytes, 16 * 1024 * 1024);
        assert_eq!(c.delete_attempts, 5);
        assert_eq!(c.delete_retry_delay(), Duration::from_secs(1));
        assert_eq!(c.model_or_default(), DEFAULT_MODEL);
        assert_eq!(c.bind_addr(), "0.0.0.0:5000");
    }

    #[test]
    fn builder_clamps_temperature() {
        let c = ServiceConfig::builder().temperature(9.0).build().unwrap();
        assert_eq!(c.temperature, 2.0);
    }

    #[test]
    fn builder_rejects_zero_attempts() {
        let err = ServiceConfig::builder().delete_attempts(0).build().unwrap_err();
        assert!(matches!(err, ExtractError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_zero_timeout() {
        assert!(ServiceConfig::builder().model_timeout_secs(0).build().is_err());
    }

    #[test]
    fn debug_hides_provider() {
        let s = format!("{:?}", ServiceConfig::default());
        assert!(s.contains("provider: None"));
    }
}

//! Model client: send the invoice and the extraction prompt, get text back.
//!
//! The rest of the crate only sees the [`InvoiceModel`] trait (image +
//! prompt → text). [`LlmInvoiceModel`] is the production implementation over
//! an `edgequake_llm` provider; tests plug in canned models instead.
//!
//! Model errors are not retried: a failed call surfaces once, with the
//! provider's message, as an extraction failure. Every call is bounded by
//! [`call_model`]'s timeout so a stalled provider cannot pin a request open.

use crate::config::{ServiceConfig, DEFAULT_PROVIDER};
use crate::error::ExtractError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Anything that can read an invoice image and answer in text.
#[async_trait]
pub trait InvoiceModel: Send + Sync {
    async fn generate(&self, prompt: &str, image: ImageData) -> Result<String, ExtractError>;
}

/// [`InvoiceModel`] backed by a vision-capable LLM provider.
pub struct LlmInvoiceModel {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl LlmInvoiceModel {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ServiceConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
        }
    }

    /// Resolve the provider named by `config` and wrap it.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, ExtractError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider, config))
    }
}

#[async_trait]
impl InvoiceModel for LlmInvoiceModel {
    /// One user turn: the prompt text with the invoice attached.
    async fn generate(&self, prompt: &str, image: ImageData) -> Result<String, ExtractError> {
        let messages = vec![ChatMessage::user_with_images(prompt, vec![image])];

        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| ExtractError::ModelApi {
                message: e.to_string(),
            })?;

        debug!(
            "Model answered: {} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}

/// Run `model` with the extraction `prompt`, giving up after `timeout`.
pub async fn call_model(
    model: &dyn InvoiceModel,
    prompt: &str,
    image: ImageData,
    timeout: Duration,
) -> Result<String, ExtractError> {
    let start = Instant::now();
    match tokio::time::timeout(timeout, model.generate(prompt, image)).await {
        Ok(result) => {
            debug!("Model call finished in {:?}", start.elapsed());
            result
        }
        Err(_) => {
            let elapsed_ms = start.elapsed().as_millis() as u64;
            warn!("Model call timed out after {}ms", elapsed_ms);
            Err(ExtractError::ModelTimeout { elapsed_ms })
        }
    }
}

/// Build `CompletionOptions` from the service config.
fn build_options(config: &ServiceConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, ExtractError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ExtractError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`) used as-is.
/// 2. **Named provider** (`config.provider_name`) with `config.model` or
///    [`crate::config::DEFAULT_MODEL`].
/// 3. **Environment pair** `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`.
/// 4. **Gemini** when `GEMINI_API_KEY` is set.
/// 5. **Full auto-detection** via `ProviderFactory::from_env`.
pub fn resolve_provider(config: &ServiceConfig) -> Result<Arc<dyn LLMProvider>, ExtractError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        info!("Using provider '{}' with model '{}'", name, config.model_or_default());
        return create_vision_provider(name, config.model_or_default());
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            info!("Using provider '{}' with model '{}' from environment", prov, model);
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(key) = std::env::var("GEMINI_API_KEY") {
        if !key.is_empty() {
            info!("Using provider '{}' with model '{}'", DEFAULT_PROVIDER, config.model_or_default());
            return create_vision_provider(DEFAULT_PROVIDER, config.model_or_default());
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ExtractError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY, OPENAI_API_KEY, or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

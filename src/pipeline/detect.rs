//! Vision-model detection of index/TOC entries.
//!
//! All prompt text lives in [`crate::prompts`] and all response parsing in
//! [`crate::pipeline::parse`]; this module only builds requests, calls the
//! [`VisionClient`] and turns entries into [`IndexLink`]s with run-scoped ids.
//!
//! Errors from the client are returned as-is. Whether a failed page aborts a
//! batch is decided by the caller ([`crate::analyze::detect_rendered_pages`]).

use crate::config::IndexConfig;
use crate::error::IndexError;
use crate::output::{IndexLink, LinkIdSequence};
use crate::pipeline::encode::PageImage;
use crate::pipeline::parse;
use crate::prompts;
use async_trait::async_trait;
use edgequake_llm::{
    AnthropicProvider, ChatMessage, CompletionOptions, GeminiProvider, LLMProvider, MistralProvider,
    OpenAIProvider, OpenRouterProvider, ProviderFactory,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// One request to a vision model.
#[derive(Debug, Clone, Copy)]
pub struct VisionRequest<'a> {
    pub instruction: &'a str,
    /// JSON schema the response must follow.
    pub schema: &'a Value,
    pub images: &'a [PageImage],
    /// Text sent alongside the images (may be empty).
    pub text: &'a str,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisionResponse {
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// Anything that can answer a [`VisionRequest`].
#[async_trait]
pub trait VisionClient: Send + Sync {
    async fn generate(&self, request: VisionRequest<'_>) -> Result<VisionResponse, IndexError>;
}

/// [`VisionClient`] backed by an `edgequake-llm` provider.
pub struct LlmVisionClient {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
}

impl LlmVisionClient {
    pub fn new(provider: Arc<dyn LLMProvider>, temperature: f32, max_tokens: usize) -> Self {
        Self {
            provider,
            temperature,
            max_tokens,
        }
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            response_format: Some("json_object".to_string()),
            ..Default::default()
        }
    }
}

/// System prompt: instruction followed by the response schema.
fn system_prompt(instruction: &str, schema: &Value) -> String {
    let schema = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
    format!("{instruction}\n\nJSON schema of the response:\n{schema}")
}

#[async_trait]
impl VisionClient for LlmVisionClient {
    async fn generate(&self, request: VisionRequest<'_>) -> Result<VisionResponse, IndexError> {
        let system = system_prompt(request.instruction, request.schema);
        let images = request.images.iter().map(PageImage::to_image_data).collect();
        let messages = vec![
            ChatMessage::system(system.as_str()),
            ChatMessage::user_with_images(request.text, images),
        ];

        let response = self
            .provider
            .chat(&messages, Some(&self.options()))
            .await
            .map_err(|e| IndexError::LlmApiError {
                message: e.to_string(),
            })?;

        Ok(VisionResponse {
            text: response.content,
            input_tokens: response.prompt_tokens,
            output_tokens: response.completion_tokens,
        })
    }
}

/// Build the vision client for a run.
///
/// A pre-built `config.client` wins. Otherwise the credential is checked
/// first, so a missing key fails before any network I/O.
pub fn resolve_client(config: &IndexConfig) -> Result<Arc<dyn VisionClient>, IndexError> {
    if let Some(ref client) = config.client {
        return Ok(Arc::clone(client));
    }
    config.ensure_credential()?;

    let provider = build_provider(config)?;
    info!(
        "Using provider '{}' with model '{}'",
        config.provider_name, config.model
    );

    Ok(Arc::new(LlmVisionClient::new(
        provider,
        config.temperature,
        config.max_tokens,
    )))
}

/// Provider for `config`, built from the captured `api_key`.
///
/// Keyless providers (ollama, lmstudio, ...) go through the factory.
fn build_provider(config: &IndexConfig) -> Result<Arc<dyn LLMProvider>, IndexError> {
    let not_configured = |hint: String| IndexError::ProviderNotConfigured {
        provider: config.provider_name.clone(),
        hint,
    };
    let model = config.model.as_str();
    let key = config.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty());

    let provider: Arc<dyn LLMProvider> = match (config.provider_name.to_ascii_lowercase().as_str(), key) {
        ("gemini" | "google", Some(key)) => Arc::new(GeminiProvider::new(key).with_model(model)),
        ("openai", Some(key)) => Arc::new(OpenAIProvider::new(key).with_model(model)),
        ("anthropic", Some(key)) => Arc::new(AnthropicProvider::new(key).with_model(model)),
        ("openrouter", Some(key)) => Arc::new(OpenRouterProvider::new(key).with_model(model)),
        ("mistral", Some(key)) => Arc::new(
            MistralProvider::new(key.to_string(), model.to_string(), "mistral-embed".to_string(), None)
                .map_err(|e| not_configured(e.to_string()))?,
        ),
        _ => ProviderFactory::create_llm_provider(&config.provider_name, model)
            .map_err(|e| not_configured(e.to_string()))?,
    };
    Ok(provider)
}

/// Entries found on one page plus token usage.
#[derive(Debug, Clone, PartialEq)]
pub struct PageDetection {
    pub page: u32,
    pub links: Vec<IndexLink>,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// Runs detection calls for one analysis run.
///
/// Holds the run's [`LinkIdSequence`], so every link produced through the
/// same detector has a distinct id.
pub struct Detector {
    client: Arc<dyn VisionClient>,
    ids: LinkIdSequence,
}

impl Detector {
    pub fn new(client: Arc<dyn VisionClient>) -> Self {
        Self {
            client,
            ids: LinkIdSequence::new(),
        }
    }

    /// Detect the entries on one page.
    pub async fn detect_page(&mut self, image: &PageImage) -> Result<Vec<IndexLink>, IndexError> {
        self.detect(image).await.map(|d| d.links)
    }

    /// [`Detector::detect_page`] with token usage.
    pub async fn detect(&mut self, image: &PageImage) -> Result<PageDetection, IndexError> {
        let start = Instant::now();
        let schema = prompts::single_page_schema();
        let response = self
            .client
            .generate(VisionRequest {
                instruction: prompts::SINGLE_PAGE_INSTRUCTION,
                schema: &schema,
                images: std::slice::from_ref(image),
                text: "",
            })
            .await?;

        let links: Vec<IndexLink> = parse::parse_entries(&response.text)
            .into_iter()
            .map(|entry| entry.into_link(image.page, &mut self.ids))
            .collect();

        debug!(
            "Page {}: {} entries, {} input tokens, {} output tokens, {:?}",
            image.page,
            links.len(),
            response.input_tokens,
            response.output_tokens,
            start.elapsed()
        );

        Ok(PageDetection {
            page: image.page,
            links,
            input_tokens: response.input_tokens,
            output_tokens: response.output_tokens,
        })
    }

    /// Detect entries on several pages with a single call.
    ///
    /// Every requested page is present in the result (empty when the model
    /// reported nothing for it). Pages the model invented are dropped.
    pub async fn detect_pages_combined(
        &mut self,
        images: &[PageImage],
    ) -> Result<BTreeMap<u32, Vec<IndexLink>>, IndexError> {
        let mut out: BTreeMap<u32, Vec<IndexLink>> =
            images.iter().map(|img| (img.page, Vec::new())).collect();
        if images.is_empty() {
            return Ok(out);
        }

        let pages: Vec<u32> = images.iter().map(|img| img.page).collect();
        let schema = prompts::batch_schema();
        let legend = prompts::batch_image_legend(&pages);
        let response = self
            .client
            .generate(VisionRequest {
                instruction: prompts::BATCH_INSTRUCTION,
                schema: &schema,
                images,
                text: &legend,
            })
            .await?;

        for (page, entries) in parse::parse_batch(&response.text) {
            let Some(slot) = out.get_mut(&page) else {
                warn!(
                    "Model returned {} entries for page {}, which was not requested",
                    entries.len(),
                    page
                );
                continue;
            };
            slot.extend(entries.into_iter().map(|e| e.into_link(page, &mut self.ids)));
        }

        debug!(
            "Combined detection over {} pages: {} entries",
            pages.len(),
            out.values().map(Vec::len).sum::<usize>()
        );
        Ok(out)
    }
}

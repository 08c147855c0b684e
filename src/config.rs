//! Configuration for index detection and export.
//!
//! Everything the pipeline needs is carried by one [`IndexConfig`] value,
//! built once at start-up (usually with [`IndexConfig::from_env`]) and passed
//! by reference to whichever stage issues detection calls. No stage reads
//! global state on its own, which is also what lets tests swap in a scripted
//! [`VisionClient`] or [`PageRasterizer`].

use crate::error::IndexError;
use crate::pipeline::detect::VisionClient;
use crate::pipeline::render::PageRasterizer;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default vision provider.
pub const DEFAULT_PROVIDER: &str = "gemini";

/// Default model for [`DEFAULT_PROVIDER`].
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Configuration for an analysis run.
///
/// # Example
/// ```rust
/// use edgequake_pdf_index::{ErrorPolicy, IndexConfig, PageSelection};
///
/// let config = IndexConfig::builder()
///     .provider_name("openai")
///     .model("gpt-4.1-mini")
///     .api_key("sk-test")
///     .pages(PageSelection::Range(1, 4))
///     .error_policy(ErrorPolicy::ContinueOnError)
///     .build()
///     .unwrap();
/// assert_eq!(config.model, "gpt-4.1-mini");
/// ```
#[derive(Clone)]
pub struct IndexConfig {
    /// LLM provider name passed to the provider factory ("gemini", "openai", …).
    pub provider_name: String,

    /// Vision model identifier.
    pub model: String,

    /// Credential for `provider_name`, captured once at start-up.
    ///
    /// Required unless `client` is set or the provider needs no key
    /// (local providers such as ollama).
    pub api_key: Option<String>,

    /// Pre-constructed vision client. Takes precedence over `provider_name`.
    pub client: Option<Arc<dyn VisionClient>>,

    /// Pre-constructed rasteriser. Defaults to pdfium.
    pub rasterizer: Option<Arc<dyn PageRasterizer>>,

    /// Directory holding the pdfium shared library.
    /// `None` tries `./` and then the system library path.
    pub pdfium_lib_dir: Option<PathBuf>,

    /// Sampling temperature. Default: 0.1.
    ///
    /// Detection is transcription, not generation; a near-zero temperature
    /// keeps labels and page numbers faithful to the page.
    pub temperature: f32,

    /// Maximum tokens the model may generate per request. Default: 8192.
    ///
    /// A dense back-of-book index page easily lists a hundred entries, each
    /// costing ~40 output tokens of JSON.
    pub max_tokens: usize,

    /// What the batch pipeline does when one page fails. Default: continue.
    pub error_policy: ErrorPolicy,

    /// Pages to analyse. Default: all pages.
    pub pages: PageSelection,

    /// Per-page progress events.
    pub progress_callback: Option<ProgressCallback>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            provider_name: DEFAULT_PROVIDER.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            client: None,
            rasterizer: None,
            pdfium_lib_dir: None,
            temperature: 0.1,
            max_tokens: 8192,
            error_policy: ErrorPolicy::default(),
            pages: PageSelection::default(),
            progress_callback: None,
            download_timeout_secs: 120,
        }
    }
}

impl fmt::Debug for IndexConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexConfig")
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("client", &self.client.as_ref().map(|_| "<dyn VisionClient>"))
            .field(
                "rasterizer",
                &self.rasterizer.as_ref().map(|_| "<dyn PageRasterizer>"),
            )
            .field("pdfium_lib_dir", &self.pdfium_lib_dir)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("error_policy", &self.error_policy)
            .field("pages", &self.pages)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .finish()
    }
}

impl IndexConfig {
    /// Create a new builder for `IndexConfig`.
    pub fn builder() -> IndexConfigBuilder {
        IndexConfigBuilder {
            config: Self::default(),
        }
    }

    /// Default configuration for `provider`, with its credential read from
    /// the environment.
    ///
    /// This is the only place the library touches the environment. A missing
    /// variable is not an error here; it surfaces as
    /// [`IndexError::MissingCredential`] on the first detection attempt.
    pub fn from_env_for(provider: &str) -> Self {
        let api_key = credential_env_vars(provider)
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|k| !k.trim().is_empty());

        Self {
            provider_name: provider.to_string(),
            model: default_model_for(provider).to_string(),
            api_key,
            ..Self::default()
        }
    }

    /// [`IndexConfig::from_env_for`] with the default provider.
    pub fn from_env() -> Self {
        Self::from_env_for(DEFAULT_PROVIDER)
    }

    /// Check the credential precondition without doing any I/O.
    pub fn ensure_credential(&self) -> Result<(), IndexError> {
        if self.client.is_some() {
            return Ok(());
        }
        let vars = credential_env_vars(&self.provider_name);
        if vars.is_empty() {
            return Ok(());
        }
        match self.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => Ok(()),
            _ => Err(IndexError::MissingCredential {
                provider: self.provider_name.clone(),
                env_var: vars.join(" or "),
            }),
        }
    }
}

/// Environment variables that may hold the credential for `provider`, in
/// lookup order. Empty when the provider needs no key.
pub fn credential_env_vars(provider: &str) -> &'static [&'static str] {
    match provider.to_ascii_lowercase().as_str() {
        "gemini" | "google" => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
        "openai" => &["OPENAI_API_KEY"],
        "anthropic" => &["ANTHROPIC_API_KEY"],
        "mistral" => &["MISTRAL_API_KEY"],
        "openrouter" => &["OPENROUTER_API_KEY"],
        _ => &[],
    }
}

/// Vision-capable default model for `provider`.
pub fn default_model_for(provider: &str) -> &'static str {
    match provider.to_ascii_lowercase().as_str() {
        "openai" => "gpt-4.1-mini",
        "anthropic" => "claude-sonnet-4-20250514",
        "mistral" => "pixtral-12b-2409",
        "ollama" | "lmstudio" => "llava",
        _ => DEFAULT_MODEL,
    }
}

/// Builder for [`IndexConfig`].
pub struct IndexConfigBuilder {
    config: IndexConfig,
}

impl fmt::Debug for IndexConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl IndexConfigBuilder {
    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = name.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn client(mut self, client: Arc<dyn VisionClient>) -> Self {
        self.config.client = Some(client);
        self
    }

    pub fn rasterizer(mut self, rasterizer: Arc<dyn PageRasterizer>) -> Self {
        self.config.rasterizer = Some(rasterizer);
        self
    }

    pub fn pdfium_lib_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_dir = Some(dir.into());
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

    pub fn error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.config.error_policy = policy;
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<IndexConfig, IndexError> {
        let c = &self.config;
        if c.provider_name.trim().is_empty() {
            return Err(IndexError::InvalidConfig(
                "provider name must not be empty".into(),
            ));
        }
        if c.model.trim().is_empty() {
            return Err(IndexError::InvalidConfig("model must not be empty".into()));
        }
        if c.max_tokens == 0 {
            return Err(IndexError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How the batch pipeline reacts to a page that fails.
///
/// Single-page detection ([`crate::pipeline::detect::Detector::detect_page`])
/// always returns the error; this policy only governs batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ErrorPolicy {
    /// Record the failure and move on to the next page. (default)
    #[default]
    ContinueOnError,
    /// Stop at the first failed page and return its error.
    FailFast,
}

/// Specifies which pages of the PDF to analyse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// Every page (default).
    #[default]
    All,
    /// A single page (1-indexed).
    Single(u32),
    /// A contiguous range of pages (1-indexed, inclusive).
    Range(u32, u32),
    /// Specific pages (1-indexed, deduplicated).
    Set(Vec<u32>),
}

impl PageSelection {
    /// Expand into sorted, deduplicated 1-indexed page numbers within
    /// `1..=total_pages`.
    pub fn to_page_numbers(&self, total_pages: usize) -> Vec<u32> {
        let total = u32::try_from(total_pages).unwrap_or(u32::MAX);
        let mut pages: Vec<u32> = match self {
            PageSelection::All => (1..=total).collect(),
            PageSelection::Single(p) => {
                if (1..=total).contains(p) {
                    vec![*p]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => ((*start).max(1)..=(*end).min(total)).collect(),
            PageSelection::Set(pages) => pages
                .iter()
                .copied()
                .filter(|p| (1..=total).contains(p))
                .collect(),
        };
        pages.sort_unstable();
        pages.dedup();
        pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_selection_to_page_numbers() {
        assert_eq!(PageSelection::All.to_page_numbers(3), vec![1, 2, 3]);
        assert_eq!(PageSelection::Single(2).to_page_numbers(3), vec![2]);
        assert_eq!(PageSelection::Single(0).to_page_numbers(3), Vec::<u32>::new());
        assert_eq!(PageSelection::Single(4).to_page_numbers(3), Vec::<u32>::new());
        assert_eq!(PageSelection::Range(2, 10).to_page_numbers(4), vec![2, 3, 4]);
        assert_eq!(PageSelection::Range(0, 1).to_page_numbers(4), vec![1]);
        assert_eq!(
            PageSelection::Set(vec![4, 1, 4, 9]).to_page_numbers(5),
            vec![1, 4]
        );
    }

    #[test]
    fn missing_credential_is_reported_without_io() {
        let config = IndexConfig::builder()
            .provider_name("gemini")
            .build()
            .unwrap();
        match config.ensure_credential() {
            Err(IndexError::MissingCredential { env_var, .. }) => {
                assert_eq!(env_var, "GEMINI_API_KEY or GOOGLE_API_KEY")
            }
            other => panic!("expected MissingCredential, got {other:?}"),
        }
    }

    #[test]
    fn gemini_key_falls_back_to_google_api_key() {
        assert_eq!(
            credential_env_vars("gemini"),
            &["GEMINI_API_KEY", "GOOGLE_API_KEY"]
        );
        assert_eq!(credential_env_vars("Google"), credential_env_vars("gemini"));
        assert!(credential_env_vars("ollama").is_empty());
    }

    #[test]
    fn from_env_reads_google_api_key() {
        // Only this test touches these variables.
        std::env::remove_var("GEMINI_API_KEY");
        std::env::set_var("GOOGLE_API_KEY", "g-key");
        let config = IndexConfig::from_env();
        std::env::remove_var("GOOGLE_API_KEY");

        assert_eq!(config.api_key.as_deref(), Some("g-key"));
        assert!(config.ensure_credential().is_ok());
    }

    #[test]
    fn blank_credential_counts_as_missing() {
        let config = IndexConfig::builder().api_key("   ").build().unwrap();
        assert!(config.ensure_credential().is_err());
    }

    #[test]
    fn local_provider_needs_no_credential() {
        let config = IndexConfig::builder()
            .provider_name("ollama")
            .model("llava")
            .build()
            .unwrap();
        assert!(config.ensure_credential().is_ok());
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = IndexConfig::builder().api_key("sk-secret").build().unwrap();
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn build_rejects_zero_max_tokens() {
        assert!(IndexConfig::builder().max_tokens(0).build().is_err());
    }

    #[test]
    fn defaults() {
        let c = IndexConfig::default();
        assert_eq!(c.provider_name, "gemini");
        assert_eq!(c.error_policy, ErrorPolicy::ContinueOnError);
        assert_eq!(c.pages, PageSelection::All);
        assert_eq!(default_model_for("openai"), "gpt-4.1-mini");
    }
}

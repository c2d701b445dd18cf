//! Gemini API client struct and builder.

/// Default model used when none is specified on the request.
const DEFAULT_MODEL: &str = "flash-lite";

/// Default Gemini API base URL.
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Client for the Gemini `generateContent` API.
///
/// Implements `Provider` for use anywhere a provider is accepted.
///
/// # Example
///
/// ```no_run
/// use repl_provider_gemini::Gemini;
///
/// let client = Gemini::new("AIza...")
///     .model("flash")
///     .base_url("https://generativelanguage.googleapis.com");
/// ```
pub struct Gemini {
    /// Gemini API key (`GEMINI_API_KEY`).
    pub(crate) api_key: String,
    /// Default model identifier used when the request does not specify one.
    pub(crate) model: String,
    /// API base URL (override for testing or proxies).
    pub(crate) base_url: String,
    /// Shared HTTP client.
    pub(crate) client: reqwest::Client,
}

impl Gemini {
    /// Create a new client with the given API key and sensible defaults.
    ///
    /// Default model: `flash-lite`.
    /// Default base URL: `https://generativelanguage.googleapis.com`.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.into(),
            base_url: DEFAULT_BASE_URL.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Override the default model.
    ///
    /// This is used when the request does not carry a model of its own.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Override the API base URL.
    ///
    /// Useful for testing with a local mock server or an API proxy.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Build the generateContent endpoint URL for a model.
    pub(crate) fn generate_url(&self, model: &str) -> String {
        format!("{}/v1beta/models/{model}:generateContent", self.base_url)
    }
}

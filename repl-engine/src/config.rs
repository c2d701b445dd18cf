//! Configuration: environment variables, defaults, and the retry policy.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use repl_types::ConfigError;

/// Model used when `GEMINI_MODEL` is unset.
pub const DEFAULT_MODEL: &str = "flash-lite";

/// Project-local system prompt, consulted when no override is configured.
const PROJECT_SYSTEM_PROMPT: &str = "resources/system_prompt.txt";

/// Built-in system prompt used when nothing else resolves.
const DEFAULT_SYSTEM_PROMPT: &str = "You are a capable assistant behind an interactive console. \
You can inspect and modify files in the user's workspace through the provided \
tools. Answer concisely; quote file contents when asked about them.";

/// Backoff schedule for retrying throttled or transient provider errors.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts before giving up.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Multiplier applied per attempt.
    pub factor: f64,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            factor: 1.5,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// The delay before retry number `attempt` (1-based): 2s, 3s, 4.5s, …
    /// capped at `max_delay`.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let scaled = self.base_delay.as_secs_f64() * self.factor.powi(attempt.saturating_sub(1) as i32);
        self.max_delay.min(Duration::from_secs_f64(scaled))
    }
}

/// Everything the core needs to run, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Credential for the LLM transport.
    pub api_key: String,
    /// Model for main calls and classification.
    pub model: String,
    /// Whether the decision engine is active (fallback mode when false).
    pub structured_dispatch: bool,
    /// The resolved system prompt text.
    pub system_prompt: String,
    /// Direct sessions and logs to project-local paths.
    pub dev_mode: bool,
    /// Context token budget.
    pub token_budget: usize,
    /// Hard cap on trampoline iterations per user turn.
    pub max_trampoline_iterations: usize,
    /// Tool-result preview truncation length, in characters.
    pub preview_limit: usize,
    /// Decision cache entry lifetime.
    pub decision_cache_ttl: Duration,
    /// Wall-clock budget for a whole turn.
    pub turn_timeout: Duration,
    /// Requests-per-minute caps, per model.
    pub rpm_table: HashMap<String, u32>,
    /// Backoff schedule for provider throttling.
    pub retry: RetryPolicy,
}

impl Config {
    /// A config with all defaults, for direct assembly in tests and embedders.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            structured_dispatch: true,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            dev_mode: false,
            token_budget: 32_768,
            max_trampoline_iterations: 8,
            preview_limit: 2_000,
            decision_cache_ttl: Duration::from_secs(600),
            turn_timeout: Duration::from_secs(120),
            rpm_table: default_rpm_table(),
            retry: RetryPolicy::default(),
        }
    }

    /// Resolve configuration from the environment.
    ///
    /// Fails with [`ConfigError`] on a missing API key, an unreadable
    /// system prompt override, or an uninterpretable boolean.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let mut config = Self::new(api_key);
        if let Ok(model) = std::env::var("GEMINI_MODEL")
            && !model.is_empty()
        {
            config.model = model;
        }
        config.structured_dispatch = env_bool("GEMINI_STRUCTURED_DISPATCH", true)?;
        config.dev_mode = env_bool("GEMINI_DEV_MODE", false)?;
        config.system_prompt =
            resolve_system_prompt(std::env::var_os("GEMINI_SYSTEM_PROMPT").map(PathBuf::from))?;
        Ok(config)
    }
}

/// Default RPM caps per model.
#[must_use]
pub fn default_rpm_table() -> HashMap<String, u32> {
    HashMap::from([
        ("flash-lite".to_string(), 30),
        ("flash".to_string(), 15),
        ("flash-lite-preview".to_string(), 15),
        ("flash-25".to_string(), 10),
        ("pro".to_string(), 5),
    ])
}

/// Resolution order: explicit override path, then the project-local file,
/// then the built-in default. First existing wins; an explicit override
/// that cannot be read is fatal.
fn resolve_system_prompt(override_path: Option<PathBuf>) -> Result<String, ConfigError> {
    if let Some(path) = override_path {
        return std::fs::read_to_string(&path)
            .map_err(|source| ConfigError::SystemPrompt { path, source });
    }
    match std::fs::read_to_string(PROJECT_SYSTEM_PROMPT) {
        Ok(text) => Ok(text),
        Err(_) => Ok(DEFAULT_SYSTEM_PROMPT.to_string()),
    }
}

fn env_bool(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Err(_) => Ok(default),
        Ok(value) => match value.to_ascii_lowercase().as_str() {
            "" => Ok(default),
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::InvalidValue { name, value }),
        },
    }
}

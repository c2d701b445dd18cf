//! Token count estimation.

use repl_types::Message;

/// Estimates token counts from text using a configurable chars-per-token
/// ratio.
///
/// This is a heuristic estimator — real tokenization varies per model. The
/// default ratio of 4.0 chars/token approximates the Gemini family. Counts
/// are deterministic, stable across calls, and monotone in concatenation up
/// to the per-call `ceil` rounding.
#[derive(Debug, Clone)]
pub struct TokenCounter {
    chars_per_token: f32,
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCounter {
    /// Creates a counter with the default ratio of 4.0 chars/token.
    #[must_use]
    pub fn new() -> Self {
        Self { chars_per_token: 4.0 }
    }

    /// Creates a counter with a custom chars-per-token ratio.
    #[must_use]
    pub fn with_ratio(chars_per_token: f32) -> Self {
        Self { chars_per_token }
    }

    /// Estimates the number of tokens in a text string.
    #[must_use]
    pub fn estimate_text(&self, text: &str) -> usize {
        (text.len() as f32 / self.chars_per_token).ceil() as usize
    }

    /// Estimates the token count of a message, with a small per-message
    /// overhead for role markers.
    #[must_use]
    pub fn estimate_message(&self, message: &Message) -> usize {
        let role_overhead = 4;
        role_overhead + self.estimate_text(&message.content)
    }
}

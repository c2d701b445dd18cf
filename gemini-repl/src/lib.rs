#![doc = include_str!("../README.md")]

// === Core blocks (always available) ===

/// Shared types and traits — the lingua franca of all blocks.
pub mod types {
    pub use repl_types::*;
}

/// The sandboxed file tools and their wire declarations.
pub mod sandbox {
    pub use repl_sandbox::*;
}

/// Token accounting and the budget-trimmed conversation context.
pub mod context {
    pub use repl_context::*;
}

/// Append-only JSONL session journaling.
pub mod session {
    pub use repl_session::*;
}

/// Rate control, decision engine, dispatcher, and controller.
pub mod engine {
    pub use repl_engine::*;
}

// === Optional provider blocks ===

/// Gemini `generateContent` transport.
#[cfg(feature = "gemini")]
pub mod gemini {
    pub use repl_provider_gemini::*;
}

// === Prelude — convenient imports for embedding the core ===

/// Common imports for embedding the console core.
pub mod prelude {
    pub use repl_context::{ContextManager, TokenCounter};
    pub use repl_engine::{
        Config, Controller, RateEvent, StartupOptions, TurnOutcome,
    };
    pub use repl_sandbox::Sandbox;
    pub use repl_session::{Layout, SessionStore, SessionTarget};
    pub use repl_types::{
        Message, ModelResponse, Provider, Role, ToolCall, ToolDecision, TurnError,
    };

    #[cfg(feature = "gemini")]
    pub use repl_provider_gemini::Gemini;
}

#![doc = include_str!("../README.md")]

pub mod counter;
pub mod manager;

pub use counter::TokenCounter;
pub use manager::ContextManager;

/// Default token budget when the model does not imply one.
pub const DEFAULT_TOKEN_BUDGET: usize = 32_768;

#![doc = include_str!("../README.md")]

pub mod declarations;
pub mod sandbox;

pub use declarations::{CallParseError, parse_call, tool_declarations};
pub use sandbox::Sandbox;

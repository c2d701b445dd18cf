#![doc = include_str!("../README.md")]

pub mod config;
pub mod controller;
pub mod decision;
pub mod dispatch;
pub mod rate;

pub use config::{Config, RetryPolicy, default_rpm_table};
pub use controller::{Controller, StartupOptions};
pub use decision::DecisionEngine;
pub use dispatch::{Dispatcher, ToolUseRecord, TurnOutcome};
pub use rate::{RateController, RateEvent};

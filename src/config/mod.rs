//! Configuration loading and validation
//!
//! Settings come from a TOML file with `[general]`, `[email]` and `[slack]`
//! sections. A missing file yields the defaults and a commented template is
//! written in its place; a malformed one is fatal.

/// Configuration structures and loading
pub mod settings;

pub use settings::{Config, EmailConfig, GeneralConfig, SlackConfig, CONFIG_TEMPLATE};

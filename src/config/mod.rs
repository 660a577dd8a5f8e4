// src/config/mod.rs

//! Configuration loading and validation for docs-finalizer.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Turn the raw model into typed settings (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, load_from_str, load_or_default};
pub use model::{
    ConfigFile, ConfigSection, ListenerConfig, ListenerRule, RawConfigFile, TimeoutsSection,
};
pub use validate::parse_duration;

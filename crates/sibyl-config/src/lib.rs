//! Configuration system for the sibyl query router.
//!
//! Provides TOML-based configuration with:
//! - Completion provider settings (`[llm]`)
//! - Classifier thresholds and fallback policy (`[routing]`)
//! - Session persistence settings (`[memory]`)
//! - Variable scope selection (`[variables]`)
//! - Config file layering (XDG user config + project-local overrides)
//!
//! All sections are optional in the file; accessors fill in defaults.

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    load_config, load_config_file, load_config_with_options, resolve_data_dir, save_config,
    xdg_config_dir, xdg_config_path, ConfigSource, LoadedConfig,
};
pub use error::{ConfigError, Result};
pub use types::*;

//! Errors raised while locating, parsing, or writing config files.

/// Result type alias for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Ways loading or saving a config can fail.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A config file exists but could not be read.
    #[error("could not read {path}: {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// A config file could not be written.
    #[error("could not write {path}: {source}")]
    WriteFile {
        path: String,
        source: std::io::Error,
    },

    /// A discovered file is not valid TOML.
    #[error("config is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The in-memory config cannot be rendered as TOML.
    #[error("config cannot be rendered as TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A setting holds a value outside its valid range.
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigError {
    /// Shorthand for [`ConfigError::InvalidValue`].
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

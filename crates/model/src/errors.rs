use thiserror::Error;

pub type Result<T> = std::result::Result<T, ModelError>;

/// Failures raised while loading configuration or assembling a model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    ConfigFormat(String),

    #[error("invalid configuration: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("device setup failed: {0}")]
    Device(String),

    #[error(transparent)]
    Candle(#[from] candle_core::Error),
}

impl From<toml::de::Error> for ModelError {
    fn from(value: toml::de::Error) -> Self {
        ModelError::ConfigFormat(value.to_string())
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(value: serde_json::Error) -> Self {
        ModelError::ConfigFormat(value.to_string())
    }
}

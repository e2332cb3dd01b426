pub mod mapping;
pub mod settings;

pub use mapping::{Mapping, MappingFile, MappingTable};
pub use settings::Settings;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid output button: {0}")]
    InvalidOutput(String),

    #[error("Malformed config document: {0}")]
    Malformed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

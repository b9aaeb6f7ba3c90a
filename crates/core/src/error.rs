use thiserror::Error;

#[derive(Error, Debug)]
pub enum LanesError {
    #[error("config I/O error: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("invalid allocation spec: {0}")]
    InvalidAllocation(String),

    #[error("invalid value for {key}: {value}")]
    InvalidEnv { key: String, value: String },
}

pub type Result<T> = std::result::Result<T, LanesError>;

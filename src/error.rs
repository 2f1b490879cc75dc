use thiserror::Error;

#[derive(Error, Debug)]
pub enum InterceptError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Cache error: {0}")]
    Cache(String),
    #[error("Install failed: {0}")]
    Install(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<hyper::Error> for InterceptError {
    fn from(e: hyper::Error) -> Self {
        InterceptError::Network(e.to_string())
    }
}

impl From<url::ParseError> for InterceptError {
    fn from(e: url::ParseError) -> Self {
        InterceptError::InvalidInput(e.to_string())
    }
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChorusError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("runtime error: {0}")]
    Runtime(String),
    #[error("channel unavailable: {0}")]
    ChannelUnavailable(String),
    #[error("request already outstanding: {0}")]
    DuplicateRequest(String),
    #[error("cancelled: {0}")]
    Cancelled(String),
}

pub type Result<T> = std::result::Result<T, ChorusError>;

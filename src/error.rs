use thiserror::Error;

#[derive(Error, Debug)]
pub enum SdfsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("network error: {0}")]
    Network(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("quorum shortfall: wrote {acked} of {required} required replicas")]
    QuorumShortfall { acked: usize, required: usize },

    #[error("bind failure on port {port}: {source}")]
    BindFailure { port: u16, source: std::io::Error },

    #[error("introducer timeout after {0:?}")]
    IntroducerTimeout(std::time::Duration),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unreachable peer: ordinal {0}")]
    Unreachable(u32),
}

pub type Result<T> = std::result::Result<T, SdfsError>;

impl From<bincode::error::EncodeError> for SdfsError {
    fn from(e: bincode::error::EncodeError) -> Self {
        SdfsError::Serialization(e.to_string())
    }
}

impl From<bincode::error::DecodeError> for SdfsError {
    fn from(e: bincode::error::DecodeError) -> Self {
        SdfsError::Decode(e.to_string())
    }
}

impl From<serde_json::Error> for SdfsError {
    fn from(e: serde_json::Error) -> Self {
        SdfsError::Serialization(e.to_string())
    }
}

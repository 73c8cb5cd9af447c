use thiserror::Error;

/// Error taxonomy of the retrieval core.
///
/// Sub-component failures are absorbed at the nearest boundary that can
/// still produce a useful partial result; only a total inability to
/// produce candidates surfaces as `AllGeneratorsFailed`.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("query analysis failed: {0}")]
    Analysis(String),

    #[error("embedding backend failed: {0}")]
    Embedding(String),

    #[error("candidate generator '{generator}' failed: {reason}")]
    Generator { generator: &'static str, reason: String },

    #[error("all candidate generators failed")]
    AllGeneratorsFailed,

    #[error("cache store unavailable: {0}")]
    CacheUnavailable(String),

    #[error("chunk store error: {0}")]
    Store(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, RetrievalError>;

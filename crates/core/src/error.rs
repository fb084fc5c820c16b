use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("ingestion task failed: {0}")]
    Task(String),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("search request failed: {0}")]
    Request(String),

    #[error("collection does not exist yet: {0}")]
    NotReady(String),

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("index call timed out after {0:?}")]
    Timeout(std::time::Duration),
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding backend returned {status}: {details}")]
    BackendResponse { status: u16, details: String },

    #[error("expected {expected} embeddings, got {actual}")]
    CountMismatch { expected: usize, actual: usize },

    #[error("embedding dimension {actual} != {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("missing api key: set {0}")]
    MissingApiKey(&'static str),
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("generation backend returned {status}: {details}")]
    BackendResponse { status: u16, details: String },

    #[error("generation response had no text")]
    EmptyResponse,

    #[error("missing api key: set {0}")]
    MissingApiKey(&'static str),

    #[error("generation call timed out after {0:?}")]
    Timeout(std::time::Duration),
}

#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Search(#[from] SearchError),
}

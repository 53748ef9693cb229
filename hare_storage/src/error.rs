pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode metadata: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to encode log record: {0}")]
    Bincode(#[from] bincode::Error),
}

use hare_storage::StorageError;

pub type Result<T> = std::result::Result<T, BrokerError>;

pub type ReplyCode = u16;

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("404 Not found: {kind} `{name}`")]
    NotFound { kind: &'static str, name: String },
    #[error("530 Consumer tag `{tag}` is already in use on queue `{queue}`")]
    DuplicateConsumerTag { queue: String, tag: String },
    #[error("403 Access refused: {0}")]
    AccessRefused(&'static str),
    #[error("530 Not allowed: {0}")]
    NotAllowed(&'static str),
    #[error("541 Persistence failure: {0}")]
    Persistence(#[from] StorageError),
}

impl BrokerError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn reply_code(&self) -> ReplyCode {
        match self {
            BrokerError::NotFound { .. } => 404,
            BrokerError::DuplicateConsumerTag { .. } => 530,
            BrokerError::AccessRefused(_) => 403,
            BrokerError::NotAllowed(_) => 530,
            BrokerError::Persistence(_) => 541,
        }
    }

    pub fn reply_text(&self) -> &'static str {
        match self {
            BrokerError::NotFound { .. } => "not-found",
            BrokerError::DuplicateConsumerTag { .. } => "not-allowed",
            BrokerError::AccessRefused(_) => "access-refused",
            BrokerError::NotAllowed(_) => "not-allowed",
            BrokerError::Persistence(_) => "internal-error",
        }
    }
}

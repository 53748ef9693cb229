use std::io::Error;

use crate::frame::MAX_FRAME_SIZE;

pub type StdResult<T, E> = std::result::Result<T, E>;

pub type Result<T> = StdResult<T, TransError>;

#[derive(Debug, thiserror::Error)]
pub enum TransError {
    #[error("frame of {0} bytes exceeds the limit of {max} bytes", max = MAX_FRAME_SIZE)]
    FrameTooLarge(usize),
    #[error("connection closed in the middle of a frame")]
    UnexpectedEof,
    #[error("invalid message: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("connection error: `{0}`")]
    Other(#[from] anyhow::Error),
}

impl From<std::io::Error> for TransError {
    fn from(err: Error) -> Self {
        Self::Other(err.into())
    }
}

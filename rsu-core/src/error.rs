//! Error taxonomy for ledger operations.
//!
//! Every rejected operation surfaces exactly one of these variants. Messages
//! carry a stable prefix per failure (`not adjacent`, `already checked`, ...)
//! so hosts can match on them.

use crate::serialization::SerializationError;
use crate::types::RoundNumber;
use thiserror::Error;

/// Failure category, independent of the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    AlreadyInitialized,
    Unauthorized,
    PreconditionFailed,
    InvalidArgument,
    AlreadyDone,
    NotFound,
    Storage,
    Serialization,
}

#[derive(Debug, Error)]
pub enum RsuError {
    #[error("already initialized")]
    AlreadyInitialized,

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("already done: {0}")]
    AlreadyDone(String),

    #[error("round {0} was never opened")]
    NotFound(RoundNumber),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] SerializationError),
}

impl RsuError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RsuError::AlreadyInitialized => ErrorKind::AlreadyInitialized,
            RsuError::Unauthorized(_) => ErrorKind::Unauthorized,
            RsuError::PreconditionFailed(_) => ErrorKind::PreconditionFailed,
            RsuError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            RsuError::AlreadyDone(_) => ErrorKind::AlreadyDone,
            RsuError::NotFound(_) => ErrorKind::NotFound,
            RsuError::Storage(_) => ErrorKind::Storage,
            RsuError::Serialization(_) => ErrorKind::Serialization,
        }
    }

    pub(crate) fn unauthorized(msg: impl Into<String>) -> Self {
        RsuError::Unauthorized(msg.into())
    }

    pub(crate) fn precondition(msg: impl Into<String>) -> Self {
        RsuError::PreconditionFailed(msg.into())
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        RsuError::InvalidArgument(msg.into())
    }
}

impl From<sled::Error> for RsuError {
    fn from(err: sled::Error) -> Self {
        RsuError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RsuError>;

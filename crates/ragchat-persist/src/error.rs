use thiserror::Error;

/// Cosmos DB for MongoDB reports request-rate throttling with this code
pub const COSMOS_TOO_MANY_REQUESTS: i32 = 16500;

#[derive(Error, Debug)]
pub enum PersistError {
    #[cfg(feature = "mongodb")]
    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[cfg(feature = "mongodb")]
    #[error("BSON serialization error: {0}")]
    BsonSerialization(#[from] bson::ser::Error),

    #[error("Thread not found: {0}")]
    ThreadNotFound(String),

    #[error("Connection error: {0}")]
    Connection(String),

    /// Store is temporarily unable to serve the request (throttled, failing over)
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PersistError {
    /// Whether repeating the same operation may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            #[cfg(feature = "mongodb")]
            Self::Database(e) => mongo_is_retryable(e),
            Self::Connection(_) | Self::Unavailable(_) => true,
            _ => false,
        }
    }
}

#[cfg(feature = "mongodb")]
fn mongo_is_retryable(e: &mongodb::error::Error) -> bool {
    use mongodb::error::{ErrorKind, WriteFailure, RETRYABLE_WRITE_ERROR, TRANSIENT_TRANSACTION_ERROR};

    if e.contains_label(RETRYABLE_WRITE_ERROR) || e.contains_label(TRANSIENT_TRANSACTION_ERROR) {
        return true;
    }

    match e.kind.as_ref() {
        ErrorKind::Io(_) | ErrorKind::ConnectionPoolCleared { .. } | ErrorKind::ServerSelection { .. } => true,
        ErrorKind::Command(err) => err.code == COSMOS_TOO_MANY_REQUESTS,
        ErrorKind::Write(WriteFailure::WriteError(err)) => err.code == COSMOS_TOO_MANY_REQUESTS,
        _ => false,
    }
}

pub type Result<T> = std::result::Result<T, PersistError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable() {
        assert!(PersistError::Unavailable("throttled".into()).is_retryable());
        assert!(PersistError::Connection("reset".into()).is_retryable());
        assert!(!PersistError::Internal("bad document".into()).is_retryable());
        assert!(!PersistError::ThreadNotFound("t1".into()).is_retryable());
    }
}

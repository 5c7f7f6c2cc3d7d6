use ledgerly_core::LedgerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("Transfer pair rejected: {0}")]
    InvalidTransferPair(String),
}

impl StorageError {
    pub(crate) fn not_found(entity: &'static str, id: i64) -> Self {
        StorageError::NotFound { entity, id }
    }
}

use thiserror::Error;

pub type PlumeResult<T, E = PlumeError> = Result<T, E>;

#[derive(Debug, Error)]
pub enum PlumeError {
    #[error("Bad scan opcodes: {0}")]
    BadOpcodes(String),

    #[error("Bad scan range: {0}")]
    BadScanRange(String),

    #[error("No such key in range")]
    KeyNotFound,

    #[error("Scan not initialized")]
    ScanNotStarted,

    #[error("Index scan completed")]
    ScanCompleted,

    #[error("Bad index info: {0}")]
    BadIndexInfo(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

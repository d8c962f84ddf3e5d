use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("path escapes store root: {0}")]
    PathTraversal(String),

    #[error("unexpected non-zero data past end of store at offset {0}")]
    NonZeroPastEnd(u64),
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("dht error: {0}")]
    Dht(#[from] crate::dht::DhtError),

    #[error("tracker error: {0}")]
    Tracker(#[from] crate::tracker::TrackerError),

    #[error("invalid share id: {0}")]
    InvalidShareId(String),
}

use thiserror::Error;

pub type MeepleResult<T> = Result<T, MeepleError>;

#[derive(Error, Debug)]
pub enum MeepleError {
    #[error("Unknown item: {0}")]
    UnknownItem(String),

    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Similarity pipeline error: {0}")]
    Pipeline(String),

    #[error("Invalid similarity store: {0}")]
    InvalidStore(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl MeepleError {
    /// True for lookups of users or items that the store has never seen.
    pub fn is_not_found(&self) -> bool {
        matches!(self, MeepleError::UnknownItem(_) | MeepleError::UnknownUser(_))
    }
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Columnar chunk-table read or write failure.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Snapshot archive failure. Reported alongside I/O errors.
    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Operation failed: {0}")]
    Operation(String),
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self { Error::InvalidConfig(err.to_string()) }
}

impl Error {
    /// Whether this error belongs to the I/O class (file system or archive).
    pub fn is_io(&self) -> bool { matches!(self, Error::Io(_) | Error::Archive(_)) }
}

pub type Result<T> = std::result::Result<T, Error>;

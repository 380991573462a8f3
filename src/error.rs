use thiserror::Error;

/// Errors raised by the chat core and its collaborators.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The model server reported a failure or produced an unusable stream.
    #[error("Model error: {0}")]
    Model(String),

    #[error("Attachment error: {0}")]
    Attachment(String),

    #[error("turn cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Why a session rename was refused. Every variant leaves the session untouched.
#[derive(Error, Debug)]
pub enum RenameError {
    #[error("session name is empty after removing unsupported characters")]
    EmptyName,

    #[error("a session named '{0}' already exists")]
    Taken(String),

    #[error(transparent)]
    Storage(#[from] Error),
}

//! Error types for deck background replacement.

use std::path::PathBuf;

use thiserror::Error;

use crate::session::UserId;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while receiving, rebuilding or writing a deck.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to open, read or write a file.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The uploaded source file is not a supported deck.
    #[error("Unsupported input file: {0}")]
    InputFormat(String),

    /// An image arrived for a user with no pending deck.
    #[error("No pending deck for user {0}")]
    NotReady(UserId),

    /// Invalid or corrupted deck package.
    #[error("Invalid or corrupted file: {0}")]
    CorruptedFile(String),

    /// ZIP archive error.
    #[error("ZIP error: {0}")]
    ZipError(String),

    /// XML parsing or generation error.
    #[error("XML error: {0}")]
    XmlError(String),

    /// The background image is not a recognized raster format.
    #[error("Unsupported background image: {0}")]
    UnsupportedImage(String),

    /// Loading, rebuilding or saving a deck failed.
    #[error("Deck transform failed: {0}")]
    Transform(#[source] Box<Error>),
}

impl Error {
    /// Wrap this error as a transform failure, unless it already is one.
    pub fn into_transform(self) -> Self {
        match self {
            Error::Transform(_) => self,
            other => Error::Transform(Box::new(other)),
        }
    }

    /// True for errors the user can fix by re-sending something.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, Error::InputFormat(_) | Error::NotReady(_))
    }
}

/// Non-fatal failure to remove a filesystem artifact.
#[derive(Error, Debug)]
#[error("Failed to remove {}: {source}", path.display())]
pub struct CleanupWarning {
    /// The artifact that could not be removed.
    pub path: PathBuf,
    /// Underlying I/O failure.
    #[source]
    pub source: std::io::Error,
}

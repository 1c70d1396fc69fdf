use std::io;
use thiserror::Error;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ErrorKind {
    Io,
    Format,
    NotFound,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("corrupt data: {0}")]
    Format(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) => ErrorKind::Io,
            Error::Format(_) => ErrorKind::Format,
            Error::NotFound(_) => ErrorKind::NotFound,
        }
    }

    pub(crate) fn format<S: Into<String>>(msg: S) -> Error {
        Error::Format(msg.into())
    }

    pub(crate) fn not_found<S: Into<String>>(msg: S) -> Error {
        Error::NotFound(msg.into())
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(e: zip::result::ZipError) -> Self {
        use zip::result::ZipError;
        match e {
            ZipError::Io(e) => Error::Io(e),
            ZipError::FileNotFound => Error::NotFound("archive entry".to_owned()),
            ZipError::InvalidArchive(msg) | ZipError::UnsupportedArchive(msg) => {
                Error::Io(io::Error::new(io::ErrorKind::InvalidData, msg))
            }
            #[allow(unreachable_patterns)]
            other => Error::Io(io::Error::new(io::ErrorKind::Other, other.to_string())),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

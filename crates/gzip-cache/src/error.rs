//! Error types for the gzip cache

use std::fmt;

#[derive(Debug)]
pub enum GzipError {
    Io(Box<std::io::Error>),
    Compressor(String),
}

impl fmt::Display for GzipError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GzipError::Io(err) => write!(f, "IO error: {}", err),
            GzipError::Compressor(msg) => write!(f, "Compressor error: {}", msg),
        }
    }
}

impl std::error::Error for GzipError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GzipError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for GzipError {
    fn from(err: std::io::Error) -> Self {
        GzipError::Io(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, GzipError>;

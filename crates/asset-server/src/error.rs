//! Error types for the asset server

use std::fmt;

#[derive(Debug)]
pub enum AssetServerError {
    Cache(ttl_file_cache::CacheError),
    Gzip(gzip_cache::GzipError),
    Io(Box<std::io::Error>),
    Config(String),
}

impl fmt::Display for AssetServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetServerError::Cache(err) => write!(f, "Cache error: {}", err),
            AssetServerError::Gzip(err) => write!(f, "Gzip error: {}", err),
            AssetServerError::Io(err) => write!(f, "IO error: {}", err),
            AssetServerError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for AssetServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AssetServerError::Cache(err) => Some(err),
            AssetServerError::Gzip(err) => Some(err),
            AssetServerError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<ttl_file_cache::CacheError> for AssetServerError {
    fn from(err: ttl_file_cache::CacheError) -> Self {
        AssetServerError::Cache(err)
    }
}

impl From<gzip_cache::GzipError> for AssetServerError {
    fn from(err: gzip_cache::GzipError) -> Self {
        AssetServerError::Gzip(err)
    }
}

impl From<std::io::Error> for AssetServerError {
    fn from(err: std::io::Error) -> Self {
        AssetServerError::Io(Box::new(err))
    }
}

impl From<tracing_subscriber::filter::ParseError> for AssetServerError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        AssetServerError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AssetServerError>;

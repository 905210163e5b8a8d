//! Error types for the tiered image cache

use std::fmt;

#[derive(Debug)]
pub enum CacheError {
    Network(String),
    Http(Box<reqwest::Error>),
    InvalidPayload(String),
    Storage(Box<std::io::Error>),
    Config(String),
    InvalidKey(String),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Network(msg) => write!(f, "Network error: {}", msg),
            CacheError::Http(err) => write!(f, "HTTP error: {}", err),
            CacheError::InvalidPayload(msg) => write!(f, "Invalid payload: {}", msg),
            CacheError::Storage(err) => write!(f, "Storage error: {}", err),
            CacheError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CacheError::InvalidKey(key) => write!(f, "Invalid cache key: {}", key),
        }
    }
}

impl CacheError {
    /// Whether this failure should be reported to the caller as a failed request.
    ///
    /// Storage problems are recovered inside the cache and never surface.
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            CacheError::Network(_) | CacheError::Http(_) | CacheError::InvalidPayload(_)
        )
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Http(err) => Some(err.as_ref()),
            CacheError::Storage(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for CacheError {
    fn from(err: reqwest::Error) -> Self {
        CacheError::Http(Box::new(err))
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Storage(Box::new(err))
    }
}

impl From<image::ImageError> for CacheError {
    fn from(err: image::ImageError) -> Self {
        CacheError::InvalidPayload(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;

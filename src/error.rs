//! Error types for streamsift

use crate::decode::aes::DecryptionAttempt;
use thiserror::Error;

/// Main error type for streamsift operations
///
/// Malformed encodings and packer blocks never show up here: decoding is
/// best-effort and hands back its input unchanged instead.
#[derive(Debug, Error)]
pub enum SiftError {
    #[error("Page evaluation failed: {0}")]
    PageEvaluation(String),

    #[error("Fetch failed: {0}")]
    FetchFailed(#[from] reqwest::Error),

    #[error("Fetch returned HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Timeout error: {0}")]
    TimeoutError(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid IV candidate: {0}")]
    InvalidIv(String),

    #[error("Invalid ciphertext: {0}")]
    InvalidCiphertext(String),

    #[error(
        "Decryption failed: none of {} IV candidates produced valid plaintext",
        .attempts.len()
    )]
    DecryptionFailed { attempts: Vec<DecryptionAttempt> },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Generic error: {0}")]
    Generic(String),
}

impl SiftError {
    /// Check if error is a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, SiftError::TimeoutError(_))
    }

    /// Check if a detector should swallow this error and contribute nothing
    pub fn is_detector_soft(&self) -> bool {
        matches!(
            self,
            SiftError::PageEvaluation(_)
                | SiftError::TimeoutError(_)
                | SiftError::JsonError(_)
                | SiftError::FetchFailed(_)
                | SiftError::HttpStatus { .. }
        )
    }

    /// Number of IV candidates tried before giving up, if this is a decryption failure
    pub fn attempt_count(&self) -> Option<usize> {
        match self {
            SiftError::DecryptionFailed { attempts } => Some(attempts.len()),
            _ => None,
        }
    }
}

//! AES-128-CBC resolution against a list of candidate IVs
//!
//! Some players ship their source list encrypted with a fixed key while the IV
//! rotates between a handful of known values. The resolver tries each IV in
//! order and stops at the first one that yields clean plaintext.

use crate::error::SiftError;
use crate::harvest::mining::{extract_urls, is_stream_url};
use crate::media::page::TextFetcher;
use crate::utils::fallback::first_success;
use crate::utils::url::unescape_embedded_url;
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info};

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// AES block size in bytes; also the key and IV size for AES-128
pub const BLOCK_SIZE: usize = 16;

static SOURCE_FIELD_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"["']?\b(?:source|file|url|src)["']?\s*[:=]\s*["']([^"']+)["']"#)
        .expect("source field regex is valid")
});

/// One IV to try
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IvCandidate {
    /// How the IV was written by the caller, for reporting
    pub label: String,
    bytes: [u8; BLOCK_SIZE],
}

impl IvCandidate {
    /// IV given as 16 bytes of text
    pub fn from_text(text: &str) -> Result<Self, SiftError> {
        let bytes: [u8; BLOCK_SIZE] = text.as_bytes().try_into().map_err(|_| {
            SiftError::InvalidIv(format!(
                "expected {} bytes of text, got {}",
                BLOCK_SIZE,
                text.len()
            ))
        })?;
        Ok(Self {
            label: text.to_string(),
            bytes,
        })
    }

    /// IV given as 32 hex characters
    pub fn from_hex(hex_text: &str) -> Result<Self, SiftError> {
        let decoded = hex::decode(hex_text.trim())
            .map_err(|e| SiftError::InvalidIv(format!("{}: {}", hex_text, e)))?;
        let bytes: [u8; BLOCK_SIZE] = decoded.as_slice().try_into().map_err(|_| {
            SiftError::InvalidIv(format!(
                "expected {} hex bytes, got {}",
                BLOCK_SIZE,
                decoded.len()
            ))
        })?;
        Ok(Self {
            label: hex_text.trim().to_string(),
            bytes,
        })
    }

    /// Accept either form: 32 hex characters are read as hex, anything else as text
    pub fn parse(value: &str) -> Result<Self, SiftError> {
        let trimmed = value.trim();
        if trimmed.len() == BLOCK_SIZE * 2 && trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
            Self::from_hex(trimmed)
        } else {
            Self::from_text(value)
        }
    }

    /// Raw IV bytes
    pub fn bytes(&self) -> &[u8; BLOCK_SIZE] {
        &self.bytes
    }
}

/// Where the ciphertext comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CiphertextSource {
    /// Hex ciphertext supplied directly
    Literal(String),
    /// Hex ciphertext served as the body of an HTTP GET
    Fetch(String),
}

/// Record of one IV trial
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptionAttempt {
    pub iv_candidate: String,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plaintext: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_url: Option<String>,
}

impl DecryptionAttempt {
    /// A trial that produced nothing usable
    pub fn failed(iv_candidate: impl Into<String>) -> Self {
        Self {
            iv_candidate: iv_candidate.into(),
            succeeded: false,
            plaintext: None,
            extracted_url: None,
        }
    }
}

/// Successful resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptedSource {
    /// Label of the IV that worked
    pub iv: String,
    pub plaintext: String,
    pub extracted_url: Option<String>,
    pub is_stream_url: bool,
    /// Every trial, the successful one last
    pub attempts: Vec<DecryptionAttempt>,
}

/// Fixed key plus ordered IV candidates
#[derive(Debug, Clone)]
pub struct AesResolver {
    key: [u8; BLOCK_SIZE],
    iv_candidates: Vec<IvCandidate>,
}

impl AesResolver {
    /// Create a resolver for a 16-byte textual key
    pub fn new(key: &str, iv_candidates: Vec<IvCandidate>) -> Result<Self, SiftError> {
        let key: [u8; BLOCK_SIZE] = key.as_bytes().try_into().map_err(|_| {
            SiftError::InvalidKey(format!(
                "AES-128 needs a {}-byte key, got {} bytes",
                BLOCK_SIZE,
                key.len()
            ))
        })?;
        if iv_candidates.is_empty() {
            return Err(SiftError::InvalidIv("no IV candidates given".to_string()));
        }
        Ok(Self { key, iv_candidates })
    }

    /// Candidate IVs in trial order
    pub fn iv_candidates(&self) -> &[IvCandidate] {
        &self.iv_candidates
    }

    /// Decrypt hex ciphertext, trying IVs strictly in order
    pub fn decrypt_hex(&self, hex_ciphertext: &str) -> Result<DecryptedSource, SiftError> {
        let ciphertext = parse_ciphertext(hex_ciphertext)?;

        let outcome = first_success(&self.iv_candidates, |candidate| {
            match decrypt_block_chain(&ciphertext, &self.key, candidate.bytes()) {
                Some(plaintext) => Ok((candidate, plaintext)),
                None => {
                    debug!("IV candidate {} rejected", candidate.label);
                    Err(DecryptionAttempt::failed(candidate.label.clone()))
                }
            }
        });

        let mut attempts = outcome.failures;
        let Some((candidate, plaintext)) = outcome.value else {
            return Err(SiftError::DecryptionFailed { attempts });
        };

        let extracted_url = extract_source_url(&plaintext);
        let is_stream_url = extracted_url.as_deref().map(is_stream_url).unwrap_or(false);
        info!(
            "Decrypted with IV {} after {} attempt(s)",
            candidate.label,
            attempts.len() + 1
        );
        attempts.push(DecryptionAttempt {
            iv_candidate: candidate.label.clone(),
            succeeded: true,
            plaintext: Some(plaintext.clone()),
            extracted_url: extracted_url.clone(),
        });

        Ok(DecryptedSource {
            iv: candidate.label.clone(),
            plaintext,
            extracted_url,
            is_stream_url,
            attempts,
        })
    }

    /// Resolve ciphertext from `source`, fetching it first when needed
    pub async fn resolve(
        &self,
        source: &CiphertextSource,
        fetcher: &dyn TextFetcher,
        fetch_timeout: Duration,
    ) -> Result<DecryptedSource, SiftError> {
        let hex_ciphertext = match source {
            CiphertextSource::Literal(text) => text.clone(),
            CiphertextSource::Fetch(url) => {
                debug!("Fetching ciphertext from {}", url);
                tokio::time::timeout(fetch_timeout, fetcher.fetch_text(url))
                    .await
                    .map_err(|_| {
                        SiftError::TimeoutError(format!(
                            "ciphertext fetch from {} exceeded {:?}",
                            url, fetch_timeout
                        ))
                    })??
            }
        };
        self.decrypt_hex(&hex_ciphertext)
    }
}

fn parse_ciphertext(hex_ciphertext: &str) -> Result<Vec<u8>, SiftError> {
    let compact: String = hex_ciphertext
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let bytes =
        hex::decode(&compact).map_err(|e| SiftError::InvalidCiphertext(e.to_string()))?;
    if bytes.is_empty() || bytes.len() % BLOCK_SIZE != 0 {
        return Err(SiftError::InvalidCiphertext(format!(
            "length {} is not a positive multiple of {}",
            bytes.len(),
            BLOCK_SIZE
        )));
    }
    Ok(bytes)
}

/// Decrypt and unpad; `None` on padding errors or plaintext that is not clean text
fn decrypt_block_chain(
    ciphertext: &[u8],
    key: &[u8; BLOCK_SIZE],
    iv: &[u8; BLOCK_SIZE],
) -> Option<String> {
    let cipher = Aes128CbcDec::new(&(*key).into(), &(*iv).into());
    let mut buf = ciphertext.to_vec();
    let plain = cipher.decrypt_padded_mut::<Pkcs7>(&mut buf).ok()?;
    let text = std::str::from_utf8(plain).ok()?;
    is_clean_text(text).then(|| text.to_string())
}

/// A wrong IV only garbles the first block, which usually still decodes as
/// ASCII; control characters are what give it away.
fn is_clean_text(text: &str) -> bool {
    !text.is_empty()
        && !text
            .chars()
            .any(|c| (c.is_control() && !matches!(c, '\t' | '\n' | '\r')) || c == '\u{FFFD}')
}

/// Pull the media URL out of decrypted plaintext
pub fn extract_source_url(plaintext: &str) -> Option<String> {
    SOURCE_FIELD_REGEX
        .captures_iter(plaintext)
        .map(|caps| unescape_embedded_url(&caps[1]))
        .find(|url| url.starts_with("http") || url.starts_with("//"))
        .or_else(|| extract_urls(plaintext).into_iter().next())
}

//! Fail-soft decode layers and the ordered pipeline that chains them
//!
//! Every layer hands back its input unchanged when the input does not conform
//! to that encoding. Callers routinely apply speculative chains to strings that
//! may not be encoded at all, so a no-op is the expected failure mode.

use crate::decode::packer;
use crate::error::SiftError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// A single decode primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Encoding {
    Base64,
    Base64Url,
    Hex,
    UrlPercent,
    Rot13,
    Reverse,
    PackerUnpack,
}

impl Encoding {
    /// All encodings, in declaration order
    pub const ALL: [Encoding; 7] = [
        Encoding::Base64,
        Encoding::Base64Url,
        Encoding::Hex,
        Encoding::UrlPercent,
        Encoding::Rot13,
        Encoding::Reverse,
        Encoding::PackerUnpack,
    ];

    /// Short name used on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Base64 => "base64",
            Encoding::Base64Url => "base64url",
            Encoding::Hex => "hex",
            Encoding::UrlPercent => "url",
            Encoding::Rot13 => "rot13",
            Encoding::Reverse => "reverse",
            Encoding::PackerUnpack => "unpack",
        }
    }

    /// Apply this layer to `input`
    pub fn apply(&self, input: &str) -> String {
        match self {
            Encoding::Base64 | Encoding::Base64Url => decode_base64(input),
            Encoding::Hex => decode_hex(input),
            Encoding::UrlPercent => decode_url_percent(input),
            Encoding::Rot13 => rot13(input),
            Encoding::Reverse => reverse(input),
            Encoding::PackerUnpack => packer::unpack(input),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Encoding {
    type Err = SiftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "base64" | "b64" => Ok(Encoding::Base64),
            "base64url" | "b64url" => Ok(Encoding::Base64Url),
            "hex" => Ok(Encoding::Hex),
            "url" | "percent" | "urlpercent" => Ok(Encoding::UrlPercent),
            "rot13" => Ok(Encoding::Rot13),
            "reverse" | "rev" => Ok(Encoding::Reverse),
            "unpack" | "packer" | "packerunpack" => Ok(Encoding::PackerUnpack),
            other => Err(SiftError::Generic(format!("Unknown encoding: {}", other))),
        }
    }
}

/// Parse a comma separated chain such as `base64,rot13`
pub fn parse_chain(chain: &str) -> Result<Vec<Encoding>, SiftError> {
    chain
        .split(',')
        .filter(|part| !part.trim().is_empty())
        .map(str::parse)
        .collect()
}

/// Output of a decode run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodeResult {
    pub output: String,
    pub is_likely_url: bool,
}

impl DecodeResult {
    fn new(output: String) -> Self {
        let is_likely_url = output.starts_with("http");
        Self {
            output,
            is_likely_url,
        }
    }
}

/// Raw text together with the encodings it is believed to carry, outermost first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedPayload {
    pub raw: String,
    pub declared_encoding_chain: Vec<Encoding>,
}

impl EncodedPayload {
    /// Create a payload with its declared chain
    pub fn new(raw: impl Into<String>, chain: Vec<Encoding>) -> Self {
        Self {
            raw: raw.into(),
            declared_encoding_chain: chain,
        }
    }

    /// Run the declared chain over the raw text
    pub fn decode(&self) -> DecodeResult {
        DecodePipeline::new(self.declared_encoding_chain.clone()).run(&self.raw)
    }
}

/// Ordered list of layers, each fed the previous layer's output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodePipeline {
    layers: Vec<Encoding>,
}

impl DecodePipeline {
    /// Create a pipeline from an ordered chain
    pub fn new(layers: Vec<Encoding>) -> Self {
        Self { layers }
    }

    /// Append a layer
    pub fn then(mut self, layer: Encoding) -> Self {
        self.layers.push(layer);
        self
    }

    /// Layers in application order
    pub fn layers(&self) -> &[Encoding] {
        &self.layers
    }

    /// Run every layer in order
    pub fn run(&self, input: &str) -> DecodeResult {
        let mut current = input.to_string();
        for layer in &self.layers {
            let next = layer.apply(&current);
            if next == current {
                debug!("Decode layer {} was a no-op", layer);
            }
            current = next;
        }
        DecodeResult::new(current)
    }
}

/// Result of speculative decoding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoDecodeResult {
    #[serde(flatten)]
    pub result: DecodeResult,
    /// Layers that were actually applied and changed the text
    pub applied_chain: Vec<Encoding>,
}

/// Guess the outermost encoding of `text`
pub fn sniff(text: &str) -> Option<Encoding> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if packer::detect(trimmed) {
        return Some(Encoding::PackerUnpack);
    }
    if looks_like_absolute_url(trimmed) {
        return None;
    }

    let lower = trimmed.to_ascii_lowercase();
    if lower.contains("%3a%2f%2f") || (trimmed.contains('%') && percent_sequences_valid(trimmed)) {
        return Some(Encoding::UrlPercent);
    }
    if rot13(trimmed).starts_with("http") {
        return Some(Encoding::Rot13);
    }
    if trimmed.ends_with("//:sptth") || trimmed.ends_with("//:ptth") {
        return Some(Encoding::Reverse);
    }

    let hex_body = strip_hex_prefix(trimmed);
    if hex_body.len() >= 8
        && hex_body.len() % 2 == 0
        && hex_body.chars().all(|c| c.is_ascii_hexdigit())
        && decode_hex(trimmed) != trimmed
    {
        return Some(Encoding::Hex);
    }

    let base64_alphabet = trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=' | '-' | '_'));
    if trimmed.len() >= 8 && base64_alphabet {
        let decoded = decode_base64(trimmed);
        if decoded != trimmed && is_mostly_printable(&decoded) {
            if trimmed.contains(['-', '_']) {
                return Some(Encoding::Base64Url);
            }
            return Some(Encoding::Base64);
        }
    }

    None
}

/// Apply sniffed layers until the text looks like a URL, stops changing, or `max_depth` is hit
pub fn auto_decode(text: &str, max_depth: usize) -> AutoDecodeResult {
    let mut current = text.to_string();
    let mut applied_chain = Vec::new();

    for _ in 0..max_depth {
        if looks_like_absolute_url(&current) {
            break;
        }
        let Some(layer) = sniff(&current) else {
            break;
        };
        let next = layer.apply(&current);
        if next == current {
            break;
        }
        debug!("Auto-decode applied {}", layer);
        applied_chain.push(layer);
        current = next;
    }

    AutoDecodeResult {
        result: DecodeResult::new(current),
        applied_chain,
    }
}

/// Base64 and Base64Url decode to UTF-8
pub fn decode_base64(input: &str) -> String {
    let mut normalized: String = input
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    let remainder = normalized.len() % 4;
    if remainder != 0 {
        normalized.push_str(&"=".repeat(4 - remainder));
    }

    match STANDARD.decode(normalized.as_bytes()) {
        Ok(bytes) => String::from_utf8(bytes).unwrap_or_else(|_| input.to_string()),
        Err(_) => input.to_string(),
    }
}

fn strip_hex_prefix(input: &str) -> &str {
    input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .unwrap_or(input)
}

/// Hex decode to UTF-8, ignoring an optional `0x` prefix and whitespace
pub fn decode_hex(input: &str) -> String {
    let compact: String = strip_hex_prefix(input.trim())
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if compact.is_empty() || compact.len() % 2 != 0 {
        return input.to_string();
    }

    match hex::decode(&compact) {
        Ok(bytes) => String::from_utf8(bytes).unwrap_or_else(|_| input.to_string()),
        Err(_) => input.to_string(),
    }
}

fn percent_sequences_valid(input: &str) -> bool {
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes
                .get(i + 1..i + 3)
                .map(|pair| pair.iter().all(u8::is_ascii_hexdigit))
                .unwrap_or(false);
            if !valid {
                return false;
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    true
}

/// Standard percent-decoding; malformed escapes leave the input untouched
pub fn decode_url_percent(input: &str) -> String {
    if !percent_sequences_valid(input) {
        return input.to_string();
    }
    match urlencoding::decode(input) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => input.to_string(),
    }
}

/// Rotate ASCII letters by 13, leaving everything else alone
pub fn rot13(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            'a'..='z' => (((c as u8 - b'a') + 13) % 26 + b'a') as char,
            'A'..='Z' => (((c as u8 - b'A') + 13) % 26 + b'A') as char,
            other => other,
        })
        .collect()
}

/// Reverse by Unicode scalar value.
///
/// Combining sequences and other multi-scalar graphemes come out scrambled;
/// that is the long-standing behavior and callers rely on it matching what the
/// page's own script does.
pub fn reverse(input: &str) -> String {
    input.chars().rev().collect()
}

fn looks_like_absolute_url(text: &str) -> bool {
    text.starts_with("http://") || text.starts_with("https://")
}

fn is_mostly_printable(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }
    let total = text.chars().count();
    let printable = text
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .count();
    printable * 10 >= total * 9
}

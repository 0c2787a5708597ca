//! Decoder for P.A.C.K.E.R. obfuscated JavaScript
//!
//! ## Typical structure
//! ```javascript
//! eval(function(p,a,c,k,e,d){
//!   // runtime decoder
//! }('payload', radix, count, 'symbol|table'.split('|'), 0, {}))
//! ```
//!
//! The decoder never raises past its boundary: [`unpack`] returns the input
//! unchanged whenever any part of the block cannot be located or validated.
//! [`try_unpack`] exposes the reason for callers that want to log it.

use crate::config::DEFAULT_MIN_DICTIONARY_LEN;
use crate::decode::radix::Radix;
use crate::utils::fallback::StrategyChain;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use thiserror::Error;
use tracing::debug;

static SIGNATURE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"function\s*\(\s*p\s*,\s*a\s*,\s*c\s*,\s*k\s*,\s*e\s*,\s*[dr]\s*\)")
        .expect("signature regex is valid")
});

static DICTIONARY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?:'((?:[^'\\]|\\.)*)'|"((?:[^"\\]|\\.)*)")\s*\.split\(\s*['"]\|['"]\s*\)"#,
    )
    .expect("dictionary regex is valid")
});

static BODY_START_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\}\s*\(\s*['"]"#).expect("body regex is valid"));

static ARGUMENTS_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s*,\s*(\d{1,2}|\[\])\s*,\s*(\d+)\s*,\s*$").expect("arguments regex is valid")
});

/// Why a block could not be unpacked
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnpackError {
    #[error("no packer signature")]
    MissingSignature,

    #[error("no dictionary literal followed by .split('|')")]
    MissingDictionary,

    #[error("no packed body after the decoder function")]
    MissingBody,

    #[error("no radix/count arguments before the dictionary")]
    MissingArguments,

    #[error("radix {0} outside [2, 62]")]
    UnsupportedRadix(u32),

    #[error("token count {0} is not a number")]
    InvalidTokenCount(String),

    #[error("nothing to substitute")]
    NothingToSubstitute,
}

/// Parsed view of a packer block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackedScriptBlock {
    /// Symbol table; empty entries mean "leave the token alone"
    pub dictionary: Vec<String>,
    pub radix: u32,
    /// Token count as declared in the script, before clamping
    pub token_count: usize,
    /// Packed body as it appears in the source, string escapes intact
    pub packed_body: String,
}

impl PackedScriptBlock {
    /// Token count clamped to the dictionary length
    pub fn effective_token_count(&self) -> usize {
        self.token_count.min(self.dictionary.len())
    }

    /// Substitute dictionary entries into the body
    ///
    /// Indices are processed from highest to lowest so that a short token
    /// such as `1` is never substituted inside a longer one such as `1a`
    /// before the longer one had its turn.
    pub fn unpack(&self) -> Result<String, UnpackError> {
        let radix = Radix::new(self.radix).ok_or(UnpackError::UnsupportedRadix(self.radix))?;
        let count = self.effective_token_count();
        if count == 0 {
            return Err(UnpackError::NothingToSubstitute);
        }

        let mut text = unescape_js_literal(&self.packed_body);
        for index in (0..count).rev() {
            let word = &self.dictionary[index];
            if word.is_empty() {
                continue;
            }
            let token = radix.encode(index);
            text = replace_whole_word(&text, &token, word);
        }
        Ok(text)
    }
}

/// Check whether `source` contains a packer decoder signature
pub fn detect(source: &str) -> bool {
    SIGNATURE_REGEX.is_match(source)
}

/// Locate and parse the packer block in `source`
pub fn parse(source: &str) -> Result<PackedScriptBlock, UnpackError> {
    parse_with(source, DEFAULT_MIN_DICTIONARY_LEN)
}

/// Like [`parse`], with an explicit minimum length for the preferred dictionary literal
pub fn parse_with(
    source: &str,
    min_dictionary_len: usize,
) -> Result<PackedScriptBlock, UnpackError> {
    let signature = SIGNATURE_REGEX
        .find(source)
        .ok_or(UnpackError::MissingSignature)?;
    let after_signature = &source[signature.end()..];

    let dictionary = locate_dictionary(after_signature, min_dictionary_len)
        .ok_or(UnpackError::MissingDictionary)?;

    let body_start = BODY_START_REGEX
        .find(&after_signature[..dictionary.quote_start])
        .ok_or(UnpackError::MissingBody)?
        .end();
    let between = &after_signature[body_start..dictionary.quote_start];

    let arguments = ARGUMENTS_REGEX
        .captures(between)
        .ok_or(UnpackError::MissingArguments)?;
    let radix = match &arguments[1] {
        "[]" => 62,
        digits => digits
            .parse::<u32>()
            .map_err(|_| UnpackError::UnsupportedRadix(u32::MAX))?,
    };
    if Radix::new(radix).is_none() {
        return Err(UnpackError::UnsupportedRadix(radix));
    }
    let token_count = arguments[2]
        .parse::<usize>()
        .map_err(|_| UnpackError::InvalidTokenCount(arguments[2].to_string()))?;

    let arguments_start = arguments.get(0).map(|m| m.start()).unwrap_or(between.len());
    let raw_body = &between[..arguments_start];
    // Only the literal's own closing quote goes; the body may legitimately end in an escaped one
    let packed_body = raw_body
        .strip_suffix('\'')
        .or_else(|| raw_body.strip_suffix('"'))
        .unwrap_or(raw_body)
        .to_string();

    Ok(PackedScriptBlock {
        dictionary: dictionary.entries,
        radix,
        token_count,
        packed_body,
    })
}

/// Unpack `source`, or return it unchanged on any failure
pub fn unpack(source: &str) -> String {
    unpack_with(source, DEFAULT_MIN_DICTIONARY_LEN)
}

/// Like [`unpack`], with an explicit minimum length for the preferred dictionary literal
pub fn unpack_with(source: &str, min_dictionary_len: usize) -> String {
    match try_unpack_with(source, min_dictionary_len) {
        Ok(unpacked) => unpacked,
        Err(reason) => {
            debug!("Packer unpack aborted: {}", reason);
            source.to_string()
        }
    }
}

/// Unpack `source`, reporting why it could not be unpacked
pub fn try_unpack(source: &str) -> Result<String, UnpackError> {
    try_unpack_with(source, DEFAULT_MIN_DICTIONARY_LEN)
}

fn try_unpack_with(source: &str, min_dictionary_len: usize) -> Result<String, UnpackError> {
    parse_with(source, min_dictionary_len)?.unpack()
}

struct DictionaryLiteral {
    /// Byte offset of the opening quote, relative to the searched text
    quote_start: usize,
    entries: Vec<String>,
}

fn locate_dictionary(text: &str, min_len: usize) -> Option<DictionaryLiteral> {
    let literals = || {
        DICTIONARY_REGEX.captures_iter(text).filter_map(|caps| {
            let start = caps.get(0)?.start();
            let literal = caps.get(1).or_else(|| caps.get(2))?.as_str();
            Some((start, literal))
        })
    };

    let chain = StrategyChain::<str, (usize, &str)>::new()
        .then("long-literal", |_| {
            literals().find(|(_, literal)| literal.chars().count() >= min_len)
        })
        .then("any-literal", |_| literals().next());

    let (strategy, (quote_start, literal)) = chain.run(text)?;
    debug!("Packer dictionary located via {} strategy", strategy);

    Some(DictionaryLiteral {
        quote_start,
        entries: unescape_js_literal(literal)
            .split('|')
            .map(str::to_string)
            .collect(),
    })
}

/// Resolve `\\`, `\'` and `\"` the way the JavaScript string literal would
fn unescape_js_literal(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    let mut chars = literal.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next @ ('\\' | '\'' | '"')) => out.push(next),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn is_word_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

/// Replace occurrences of `token` that stand alone as a `\b`-delimited word
fn replace_whole_word(haystack: &str, token: &str, replacement: &str) -> String {
    let bytes = haystack.as_bytes();
    let mut out = String::with_capacity(haystack.len());
    let mut last = 0;

    for (start, _) in haystack.match_indices(token) {
        if start < last {
            continue;
        }
        let end = start + token.len();
        let left_ok = start == 0 || !is_word_byte(bytes[start - 1]);
        let right_ok = end == bytes.len() || !is_word_byte(bytes[end]);
        if left_ok && right_ok {
            out.push_str(&haystack[last..start]);
            out.push_str(replacement);
            last = end;
        }
    }
    out.push_str(&haystack[last..]);
    out
}

//! Decoders for obfuscated page content

pub mod aes;
pub mod layers;
pub mod packer;
pub mod radix;

pub use aes::{AesResolver, CiphertextSource, DecryptedSource, DecryptionAttempt, IvCandidate};
pub use layers::*;
pub use packer::{PackedScriptBlock, UnpackError};

//! Loader wire codec (protocol v2).
//!
//! A frame is a hex string. Byte 0 is a per-message session key; every
//! following byte is XORed with it. The plaintext is
//! `[len: u8][version: len bytes, UTF-8][hash: 8 bytes, big-endian]`.
//!
//! This only keeps casual observers from reading the payload. The
//! authority remains the trust boundary.

use std::fmt;

use hex::FromHexError;
use thiserror::Error;

/// Session-key byte + length byte + hash bytes.
const MIN_FRAME_BYTES: usize = 1 + 1 + HASH_BYTES;
/// Width of the integrity hash in bytes.
const HASH_BYTES: usize = 8;

/// Why a loader frame was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("hex payload has odd length")]
    OddLength,

    #[error("frame shorter than {MIN_FRAME_BYTES} bytes")]
    TooShort,

    #[error("non-hex digit at offset {0}")]
    InvalidHex(usize),

    #[error("declared version length {declared} overruns {available} remaining bytes")]
    VersionOverrun { declared: usize, available: usize },

    #[error("version is not valid UTF-8")]
    VersionNotUtf8,
}

/// A decoded prehandshake / heartbeat / auth frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakePayload {
    pub version: String,
    pub hash: u64,
}

impl HandshakePayload {
    /// The hash as the authority stores it, e.g. `0x00000000DEADBEEF`.
    pub fn hash_hex(&self) -> String {
        format_hash(self.hash)
    }
}

impl fmt::Display for HandshakePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.version, self.hash_hex())
    }
}

/// Formats a hash as `0x` followed by 16 uppercase hex digits.
pub fn format_hash(hash: u64) -> String {
    format!("0x{:016X}", hash)
}

/// Parses `0x`-prefixed (or bare) hex of at most 16 digits into a hash.
pub fn parse_hash(text: &str) -> Option<u64> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    if digits.is_empty() || digits.len() > 16 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

/// Decodes an obfuscated loader frame.
pub fn decode(hex_frame: &str) -> Result<HandshakePayload, DecodeError> {
    if hex_frame.len() % 2 != 0 {
        return Err(DecodeError::OddLength);
    }
    if hex_frame.len() < MIN_FRAME_BYTES * 2 {
        return Err(DecodeError::TooShort);
    }

    let bytes = hex::decode(hex_frame).map_err(|e| match e {
        FromHexError::InvalidHexCharacter { index, .. } => DecodeError::InvalidHex(index),
        FromHexError::OddLength | FromHexError::InvalidStringLength => DecodeError::OddLength,
    })?;

    let session_key = bytes[0];
    let plain: Vec<u8> = bytes[1..].iter().map(|b| b ^ session_key).collect();

    let declared = plain[0] as usize;
    let available = plain.len() - 1 - HASH_BYTES;
    if declared > available {
        return Err(DecodeError::VersionOverrun { declared, available });
    }

    let version = std::str::from_utf8(&plain[1..1 + declared])
        .map_err(|_| DecodeError::VersionNotUtf8)?
        .to_string();

    let mut hash_bytes = [0u8; HASH_BYTES];
    hash_bytes.copy_from_slice(&plain[1 + declared..1 + declared + HASH_BYTES]);

    Ok(HandshakePayload {
        version,
        hash: u64::from_be_bytes(hash_bytes),
    })
}

/// Encodes a frame the way the loader does. Versions longer than 255
/// bytes cannot be represented and yield `None`.
pub fn encode(version: &str, hash: u64, session_key: u8) -> Option<String> {
    let len = u8::try_from(version.len()).ok()?;

    let mut frame = Vec::with_capacity(2 + version.len() + HASH_BYTES);
    frame.push(session_key);
    frame.push(len ^ session_key);
    frame.extend(version.bytes().map(|b| b ^ session_key));
    frame.extend(hash.to_be_bytes().iter().map(|b| b ^ session_key));

    Some(hex::encode(frame))
}

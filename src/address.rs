//! Algorand address parsing and validation
//!
//! An address is the base32 (RFC 4648, no padding) encoding of a 32-byte
//! ed25519 public key followed by a 4-byte checksum: the last four bytes of
//! SHA-512/256 over the public key. Always 58 characters.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512_256};

use crate::error::{Error, Result};

/// Canonical encoded address length
pub const ADDRESS_LEN: usize = 58;

/// Decoded public key length in bytes
pub const PUBKEY_LEN: usize = 32;

const CHECKSUM_LEN: usize = 4;

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// A checksum-verified Algorand address.
///
/// Constructible only through [`Address::parse`], so holding one proves the
/// string already passed format and checksum validation. Invalid input can
/// never reach the ledger gateway or be stored as connected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address {
    encoded: String,
    public_key: [u8; PUBKEY_LEN],
}

impl Address {
    /// Parse and verify a candidate address string.
    pub fn parse(candidate: &str) -> Result<Self> {
        let trimmed = candidate.trim();
        if trimmed.len() != ADDRESS_LEN {
            return Err(Error::InvalidAddress(format!(
                "expected {} characters, got {}",
                ADDRESS_LEN,
                trimmed.len()
            )));
        }

        let decoded = base32_decode(trimmed)
            .ok_or_else(|| Error::InvalidAddress("not valid base32".into()))?;
        if decoded.len() < PUBKEY_LEN + CHECKSUM_LEN {
            return Err(Error::InvalidAddress("decoded payload too short".into()));
        }

        let mut public_key = [0u8; PUBKEY_LEN];
        public_key.copy_from_slice(&decoded[..PUBKEY_LEN]);
        let checksum = &decoded[PUBKEY_LEN..PUBKEY_LEN + CHECKSUM_LEN];

        let digest = Sha512_256::digest(public_key);
        if &digest[digest.len() - CHECKSUM_LEN..] != checksum {
            return Err(Error::InvalidAddress("checksum mismatch".into()));
        }

        Ok(Self {
            encoded: trimmed.to_string(),
            public_key,
        })
    }

    /// The 32 public-key bytes, as embedded in transactions
    pub fn public_key(&self) -> &[u8; PUBKEY_LEN] {
        &self.public_key
    }

    pub fn as_str(&self) -> &str {
        &self.encoded
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encoded)
    }
}

impl std::str::FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<Address> for String {
    fn from(a: Address) -> Self {
        a.encoded
    }
}

/// Cheap yes/no validation for UI input fields.
///
/// Pure and idempotent, safe to call on every keystroke. Any decoding
/// problem is `false`, never an error.
pub fn is_valid(candidate: &str) -> bool {
    Address::parse(candidate).is_ok()
}

/// Decode unpadded RFC 4648 base32. Returns None on any non-alphabet byte.
fn base32_decode(s: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(s.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits = 0u32;

    for &c in s.as_bytes() {
        let value = BASE32_ALPHABET.iter().position(|&a| a == c)? as u32;
        buffer = (buffer << 5) | value;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push((buffer >> bits) as u8);
            buffer &= (1 << bits) - 1;
        }
    }
    // Trailing bits are padding and are discarded
    Some(out)
}

#[cfg(test)]
pub(crate) fn encode_address(public_key: &[u8; PUBKEY_LEN]) -> String {
    let digest = Sha512_256::digest(public_key);
    let mut payload = Vec::with_capacity(PUBKEY_LEN + CHECKSUM_LEN);
    payload.extend_from_slice(public_key);
    payload.extend_from_slice(&digest[digest.len() - CHECKSUM_LEN..]);

    let mut out = String::with_capacity(ADDRESS_LEN);
    let mut buffer: u32 = 0;
    let mut bits = 0u32;
    for &b in &payload {
        buffer = (buffer << 8) | b as u32;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(BASE32_ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(BASE32_ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }
    out
}

//! Prefix-preserving address anonymization (CryptoPAn).
//!
//! The construction follows Fan, Xu, Ammar & Moore: a 32-byte master key
//! splits into a 16-byte AES-128 key `K` and a 16-byte pad seed; the pad
//! itself is `AES_K(seed)`. Anonymizing an address of bit-width `W` walks
//! bit positions `0..W`, each time enciphering a block built from the
//! address's already-fixed prefix and the pad's suffix, and folding the
//! most-significant bit of the ciphertext into the output. Two addresses
//! that share a `k`-bit prefix are guaranteed to anonymize to outputs that
//! also share that `k`-bit prefix.

use aes::Aes128;
use aes::cipher::{BlockEncrypt, KeyInit, generic_array::GenericArray};
use sha2::{Digest, Sha256};

use crate::error::NfanonError;

/// Anything that can turn a raw address into its pseudonym. Modeled as a
/// trait (rather than process-global state) so the key schedule is always
/// an explicit, injected dependency of the pipeline.
pub trait Anonymizer: Send + Sync {
    fn anon4(&self, addr: u32) -> u32;
    fn anon6(&self, addr: [u64; 2]) -> [u64; 2];
}

/// CryptoPAn anonymizer over AES-128.
pub struct CryptoPan {
    cipher: Aes128,
    pad: u128,
}

const MIN_KEY_LEN: usize = 1;
const MAX_KEY_LEN: usize = 66;
const HEX_KEY_LEN: usize = 64;

impl CryptoPan {
    /// Builds the anonymizer from the raw 32-byte master key.
    pub fn new(key: &[u8; 32]) -> Self {
        let aes_key = GenericArray::from_slice(&key[..16]);
        let cipher = Aes128::new(aes_key);

        let mut pad_block = GenericArray::clone_from_slice(&key[16..]);
        cipher.encrypt_block(&mut pad_block);
        let pad = u128::from_be_bytes(pad_block.into());

        Self { cipher, pad }
    }

    /// Parses a `-K` argument (a 64-character hex string, or an arbitrary
    /// passphrase) and builds the anonymizer from it.
    pub fn from_key_str(raw: &str) -> Result<Self, NfanonError> {
        Ok(Self::new(&parse_key(raw)?))
    }

    fn anonymize_bits(&self, orig: u128, width: u32) -> u128 {
        debug_assert!(width <= 128);
        let mut result: u128 = 0;
        for i in 0..width {
            let prefix_mask: u128 = if i == 0 { 0 } else { !0u128 << (128 - i) };
            let candidate = (orig & prefix_mask) | (self.pad & !prefix_mask);

            let mut block = GenericArray::clone_from_slice(&candidate.to_be_bytes());
            self.cipher.encrypt_block(&mut block);
            let ciphertext = u128::from_be_bytes(block.into());
            let flip_bit = (ciphertext >> 127) & 1;

            let orig_bit = (orig >> (127 - i)) & 1;
            result |= (orig_bit ^ flip_bit) << (127 - i);
        }
        result
    }
}

impl Anonymizer for CryptoPan {
    fn anon4(&self, addr: u32) -> u32 {
        let orig = (addr as u128) << 96;
        (self.anonymize_bits(orig, 32) >> 96) as u32
    }

    fn anon6(&self, addr: [u64; 2]) -> [u64; 2] {
        let orig = ((addr[0] as u128) << 64) | addr[1] as u128;
        let result = self.anonymize_bits(orig, 128);
        [(result >> 64) as u64, result as u64]
    }
}

/// Parses the `-K` key argument into 32 raw key bytes.
///
/// A 64-character string of hex digits is decoded directly; anything else
/// (1..66 bytes) is treated as a passphrase and stretched to 32 bytes via
/// double SHA-256.
fn parse_key(raw: &str) -> Result<[u8; 32], NfanonError> {
    if raw.is_empty() || raw.len() > MAX_KEY_LEN {
        return Err(NfanonError::setup(format!(
            "key must be 1-{MAX_KEY_LEN} characters, got {}",
            raw.len()
        )));
    }

    if raw.len() == HEX_KEY_LEN && raw.bytes().all(|b| b.is_ascii_hexdigit()) {
        let mut key = [0u8; 32];
        for (i, byte) in key.iter_mut().enumerate() {
            let hi = hex_nibble(raw.as_bytes()[i * 2])?;
            let lo = hex_nibble(raw.as_bytes()[i * 2 + 1])?;
            *byte = (hi << 4) | lo;
        }
        return Ok(key);
    }

    let first = Sha256::digest(raw.as_bytes());
    let second = Sha256::digest(first);
    let mut key = [0u8; 32];
    key.copy_from_slice(&second);
    Ok(key)
}

fn hex_nibble(byte: u8) -> Result<u8, NfanonError> {
    match byte {
        b'0'..=b'9' => Ok(byte - b'0'),
        b'a'..=b'f' => Ok(byte - b'a' + 10),
        b'A'..=b'F' => Ok(byte - b'A' + 10),
        _ => Err(NfanonError::setup("invalid hex digit in key")),
    }
}

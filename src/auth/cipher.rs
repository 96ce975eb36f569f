//! State token cipher
//!
//! Seals a string map into the opaque, hex-encoded value carried by the OAuth
//! `state` parameter, so caller context survives the provider redirect
//! without server-side session storage.
//!
//! Plaintext layout: `k1=v1|k2=v2-<nonce>`, values URL-encoded, encrypted
//! with AES-256-CBC and PKCS#7 padding.
//!
//! # Security
//!
//! The key and IV are fixed for the whole deployment. Anyone holding the
//! configured secret can forge state tokens, and identical IVs leak whether
//! two tokens share a prefix block. The cipher defeats casual tampering, it is
//! not an anti-forgery mechanism against a compromised secret.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use std::collections::BTreeMap;
use crate::Result;
use crate::config::{StateCipherConfig, STATE_IV_LEN, STATE_KEY_LEN};
use crate::error::Error;
use super::pkce::{code_challenge, generate_random_string};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Caller context round-tripped through the state parameter
pub type StateFields = BTreeMap<String, String>;

/// Total nonce length appended after the separator
pub const NONCE_LEN: usize = 32;

/// Random part of the nonce; the rest is a digest binding it to the payload
const NONCE_SALT_LEN: usize = 16;

const NONCE_SEPARATOR: char = '-';
const PAIR_SEPARATOR: char = '|';

/// Symmetric cipher for state tokens
#[derive(Clone)]
pub struct StateCipher {
    key: [u8; STATE_KEY_LEN],
    iv: [u8; STATE_IV_LEN],
}

impl std::fmt::Debug for StateCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateCipher").finish_non_exhaustive()
    }
}

impl StateCipher {
    /// Create a cipher from validated configuration
    pub fn new(config: &StateCipherConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            key: config.key_bytes()?,
            iv: config.iv_bytes()?,
        })
    }

    /// Create a cipher from raw key material
    pub fn from_bytes(key: [u8; STATE_KEY_LEN], iv: [u8; STATE_IV_LEN]) -> Self {
        Self { key, iv }
    }

    /// Encode `fields` into a hex state token
    pub fn cipher_state(&self, fields: &StateFields) -> Result<String> {
        let payload = fields
            .iter()
            .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("|");

        let salt = generate_random_string(NONCE_SALT_LEN);
        let text = format!("{}{}{}{}", payload, NONCE_SEPARATOR, salt, nonce_tag(&payload, &salt));

        let cipher = Aes256CbcEnc::new_from_slices(&self.key, &self.iv)
            .map_err(|e| Error::StateCipher(format!("invalid key material: {}", e)))?;
        let sealed = cipher.encrypt_padded_vec_mut::<Pkcs7>(text.as_bytes());

        Ok(hex::encode(sealed))
    }

    /// Decode a hex state token back into its fields
    ///
    /// Fails on malformed input, tokens sealed under other key material, and
    /// tokens whose nonce no longer matches the payload.
    pub fn decipher_state(&self, token: &str) -> Result<StateFields> {
        let sealed = hex::decode(token)
            .map_err(|e| Error::StateCipher(format!("state is not valid hex: {}", e)))?;

        if sealed.is_empty() || sealed.len() % STATE_IV_LEN != 0 {
            return Err(Error::StateCipher(format!(
                "state has invalid length {}",
                sealed.len()
            )));
        }

        let cipher = Aes256CbcDec::new_from_slices(&self.key, &self.iv)
            .map_err(|e| Error::StateCipher(format!("invalid key material: {}", e)))?;
        let plain = cipher
            .decrypt_padded_vec_mut::<Pkcs7>(&sealed)
            .map_err(|_| Error::StateCipher("state could not be decrypted".to_string()))?;
        let text = String::from_utf8(plain)
            .map_err(|_| Error::StateCipher("decrypted state is not UTF-8".to_string()))?;

        let payload = split_nonce(&text)?;
        parse_payload(payload)
    }
}

fn nonce_tag(payload: &str, salt: &str) -> String {
    let digest = code_challenge(&format!("{}{}{}", payload, NONCE_SEPARATOR, salt));
    digest[..NONCE_LEN - NONCE_SALT_LEN].to_string()
}

/// Strip and verify the nonce suffix, returning the payload
fn split_nonce(text: &str) -> Result<&str> {
    let invalid = || Error::StateCipher("state nonce is missing or altered".to_string());

    let split = text.len().checked_sub(NONCE_LEN + 1).ok_or_else(invalid)?;
    if !text.is_char_boundary(split) || text.as_bytes()[split] != NONCE_SEPARATOR as u8 {
        return Err(invalid());
    }

    let payload = &text[..split];
    let nonce = &text[split + 1..];
    if !nonce.is_ascii() {
        return Err(invalid());
    }
    let (salt, tag) = nonce.split_at(NONCE_SALT_LEN);
    if nonce_tag(payload, salt) != tag {
        return Err(invalid());
    }

    Ok(payload)
}

fn parse_payload(payload: &str) -> Result<StateFields> {
    let mut fields = StateFields::new();

    for pair in payload.split(PAIR_SEPARATOR) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if key.is_empty() {
            continue;
        }
        let value = urlencoding::decode(value)
            .map_err(|e| Error::StateCipher(format!("state value for {} is not UTF-8: {}", key, e)))?;
        fields.insert(key.to_string(), value.into_owned());
    }

    Ok(fields)
}

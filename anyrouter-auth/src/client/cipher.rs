//! Passphrase encryption for the credential file.
//!
//! The key is derived with Argon2id from the passphrase and a random salt,
//! and the JSON payload is sealed with ChaCha20-Poly1305. Salt and nonce are
//! regenerated on every save and stored next to the ciphertext, so rotating
//! the passphrase is just a save with the new one.

use argon2::Argon2;
use base64::prelude::*;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

pub(crate) const ENVELOPE_VERSION: u32 = 1;
const KDF_NAME: &str = "argon2id";
const CIPHER_NAME: &str = "chacha20poly1305";
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// On-disk form of an encrypted credential record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Envelope {
    pub version: u32,
    pub kdf: String,
    pub cipher: String,
    pub salt: String,
    pub nonce: String,
    pub ciphertext: String,
}

impl Envelope {
    /// Whether a parsed JSON document looks like an envelope rather than a
    /// plain record.
    pub fn matches(value: &serde_json::Value) -> bool {
        value.get("ciphertext").is_some() && value.get("salt").is_some()
    }
}

pub(crate) fn seal(plaintext: &[u8], passphrase: &SecretString) -> Result<Envelope, StorageError> {
    let mut rng = rand::rng();
    let mut salt = [0u8; SALT_LEN];
    let mut nonce = [0u8; NONCE_LEN];
    rng.fill(&mut salt);
    rng.fill(&mut nonce);

    let key = derive_key(passphrase, &salt)?;
    let aead = ChaCha20Poly1305::new(Key::from_slice(&key));
    let ciphertext = aead
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| StorageError::Cipher(e.to_string()))?;

    Ok(Envelope {
        version: ENVELOPE_VERSION,
        kdf: KDF_NAME.to_string(),
        cipher: CIPHER_NAME.to_string(),
        salt: BASE64_STANDARD.encode(salt),
        nonce: BASE64_STANDARD.encode(nonce),
        ciphertext: BASE64_STANDARD.encode(ciphertext),
    })
}

pub(crate) fn open(envelope: &Envelope, passphrase: &SecretString) -> Result<Vec<u8>, StorageError> {
    if envelope.version != ENVELOPE_VERSION {
        return Err(StorageError::UnsupportedVersion(envelope.version));
    }
    if envelope.kdf != KDF_NAME || envelope.cipher != CIPHER_NAME {
        return Err(StorageError::Corrupt(format!(
            "unknown algorithms {}/{}",
            envelope.kdf, envelope.cipher
        )));
    }

    let salt = decode_field("salt", &envelope.salt)?;
    let nonce = decode_field("nonce", &envelope.nonce)?;
    let ciphertext = decode_field("ciphertext", &envelope.ciphertext)?;

    if nonce.len() != NONCE_LEN {
        return Err(StorageError::Corrupt("nonce length is invalid".to_string()));
    }

    let key = derive_key(passphrase, &salt)?;
    let aead = ChaCha20Poly1305::new(Key::from_slice(&key));

    // A wrong key and a tampered payload are indistinguishable here; both
    // fail tag verification.
    aead.decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
        .map_err(|_| StorageError::Decrypt)
}

fn derive_key(passphrase: &SecretString, salt: &[u8]) -> Result<[u8; KEY_LEN], StorageError> {
    let mut key = [0u8; KEY_LEN];
    Argon2::default()
        .hash_password_into(passphrase.expose_secret().as_bytes(), salt, &mut key)
        .map_err(|e| StorageError::Cipher(format!("key derivation failed: {}", e)))?;
    Ok(key)
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>, StorageError> {
    BASE64_STANDARD
        .decode(value)
        .map_err(|e| StorageError::Corrupt(format!("invalid {} encoding: {}", name, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(s: &str) -> SecretString {
        SecretString::from(s)
    }

    #[test]
    fn seal_then_open_round_trips() {
        let envelope = seal(b"{\"access_token\":\"abc\"}", &secret("hunter2")).unwrap();
        let plaintext = open(&envelope, &secret("hunter2")).unwrap();
        assert_eq!(plaintext, b"{\"access_token\":\"abc\"}");
    }

    #[test]
    fn wrong_passphrase_fails_to_decrypt() {
        let envelope = seal(b"payload", &secret("right")).unwrap();
        assert!(matches!(
            open(&envelope, &secret("wrong")),
            Err(StorageError::Decrypt)
        ));
    }

    #[test]
    fn tampered_ciphertext_fails_to_decrypt() {
        let mut envelope = seal(b"payload", &secret("pass")).unwrap();
        let mut raw = BASE64_STANDARD.decode(&envelope.ciphertext).unwrap();
        raw[0] ^= 0xff;
        envelope.ciphertext = BASE64_STANDARD.encode(raw);
        assert!(matches!(
            open(&envelope, &secret("pass")),
            Err(StorageError::Decrypt)
        ));
    }

    #[test]
    fn every_seal_uses_a_fresh_salt_and_nonce() {
        let a = seal(b"payload", &secret("pass")).unwrap();
        let b = seal(b"payload", &secret("pass")).unwrap();
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn unknown_version_is_rejected() {
        let mut envelope = seal(b"payload", &secret("pass")).unwrap();
        envelope.version = 7;
        assert!(matches!(
            open(&envelope, &secret("pass")),
            Err(StorageError::UnsupportedVersion(7))
        ));
    }

    #[test]
    fn envelope_detection() {
        let envelope = seal(b"payload", &secret("pass")).unwrap();
        assert!(Envelope::matches(&serde_json::to_value(&envelope).unwrap()));
        assert!(!Envelope::matches(
            &serde_json::json!({"access_token": "abc", "client_id": "x"})
        ));
    }
}

//! Credential encryption using AES-256-GCM
//!
//! Stored token sets are serialized to JSON and sealed with a process-wide
//! key. The tenant and provider are bound in as additional authenticated data
//! so a blob copied to another row fails to open.

#![allow(deprecated)]

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

const VERSION_V1: u8 = 0x01;
const VERSION_FIELD_LEN: usize = 1;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MIN_ENCRYPTED_LEN: usize = VERSION_FIELD_LEN + NONCE_LEN + TAG_LEN;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("invalid ciphertext format")]
    InvalidFormat,
    #[error("unsupported ciphertext version {0:#04x}")]
    UnsupportedVersion(u8),
    #[error("empty ciphertext")]
    EmptyCiphertext,
    #[error("invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),
    #[error("credential payload is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Secure wrapper for the master key, wiped on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ZeroizingKey(Vec<u8>);

pub type CryptoKey = ZeroizingKey;

impl CryptoKey {
    pub fn new(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKeyLength(bytes.len()));
        }
        Ok(ZeroizingKey(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for ZeroizingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ZeroizingKey([REDACTED])")
    }
}

/// AAD binding a credential blob to its owning row.
pub fn credential_aad(tenant_id: Uuid, provider: &str) -> String {
    format!("{}|{}", tenant_id, provider)
}

/// Encrypt bytes: `version || nonce || ciphertext+tag`.
pub fn encrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let mut sealed = Vec::with_capacity(VERSION_FIELD_LEN + NONCE_LEN + ciphertext.len());
    sealed.push(VERSION_V1);
    sealed.extend_from_slice(&nonce);
    sealed.append(&mut ciphertext);

    Ok(sealed)
}

/// Decrypt bytes produced by [`encrypt_bytes`].
///
/// Fails on a wrong key, wrong AAD, or any tampering.
pub fn decrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    sealed: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let (&version, _) = sealed.split_first().ok_or(CryptoError::EmptyCiphertext)?;
    if version != VERSION_V1 {
        return Err(CryptoError::UnsupportedVersion(version));
    }
    if sealed.len() < MIN_ENCRYPTED_LEN {
        return Err(CryptoError::InvalidFormat);
    }

    let nonce = Nonce::from_slice(&sealed[VERSION_FIELD_LEN..VERSION_FIELD_LEN + NONCE_LEN]);
    let body = &sealed[VERSION_FIELD_LEN + NONCE_LEN..];
    debug_assert!(body.len() >= TAG_LEN);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    cipher
        .decrypt(nonce, Payload { msg: body, aad })
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

pub fn is_encrypted_payload(sealed: &[u8]) -> bool {
    sealed.len() >= MIN_ENCRYPTED_LEN && sealed[0] == VERSION_V1
}

/// Serialize `value` to JSON and encrypt it. The intermediate plaintext is
/// wiped before returning.
pub fn encrypt_object<T: Serialize>(
    key: &CryptoKey,
    aad: &[u8],
    value: &T,
) -> Result<Vec<u8>, CryptoError> {
    let plaintext = Zeroizing::new(serde_json::to_vec(value)?);
    encrypt_bytes(key, aad, &plaintext)
}

/// Decrypt and deserialize a value sealed by [`encrypt_object`].
pub fn decrypt_object<T: DeserializeOwned>(
    key: &CryptoKey,
    aad: &[u8],
    sealed: &[u8],
) -> Result<T, CryptoError> {
    let plaintext = Zeroizing::new(decrypt_bytes(key, aad, sealed)?);
    Ok(serde_json::from_slice(&plaintext)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn key(fill: u8) -> CryptoKey {
        CryptoKey::new(vec![fill; 32]).expect("valid test key")
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct TokenSet {
        access_token: String,
        refresh_token: Option<String>,
        expires_in: u64,
    }

    #[test]
    fn bytes_roundtrip() {
        let k = key(7);
        let sealed = encrypt_bytes(&k, b"aad", b"secret message").unwrap();
        assert!(is_encrypted_payload(&sealed));
        assert_eq!(decrypt_bytes(&k, b"aad", &sealed).unwrap(), b"secret message");
    }

    #[test]
    fn object_roundtrip_preserves_value() {
        let k = key(1);
        let tokens = TokenSet {
            access_token: "at-123".into(),
            refresh_token: Some("rt-456".into()),
            expires_in: 3600,
        };
        let sealed = encrypt_object(&k, b"t|greenhouse", &tokens).unwrap();
        let opened: TokenSet = decrypt_object(&k, b"t|greenhouse", &sealed).unwrap();
        assert_eq!(opened, tokens);
    }

    #[test]
    fn arbitrary_json_roundtrips() {
        let k = key(2);
        let value = json!({"nested": {"list": [1, 2, 3], "flag": true}, "s": "ü"});
        let sealed = encrypt_object(&k, b"x", &value).unwrap();
        let opened: serde_json::Value = decrypt_object(&k, b"x", &sealed).unwrap();
        assert_eq!(opened, value);
    }

    #[test]
    fn different_master_key_fails() {
        let sealed = encrypt_object(&key(1), b"aad", &json!({"a": 1})).unwrap();
        let result: Result<serde_json::Value, _> = decrypt_object(&key(2), b"aad", &sealed);
        assert!(matches!(result, Err(CryptoError::DecryptionFailed(_))));
    }

    #[test]
    fn different_aad_fails() {
        let k = key(3);
        let sealed = encrypt_bytes(&k, b"tenant-a|lever", b"x").unwrap();
        assert!(decrypt_bytes(&k, b"tenant-b|lever", &sealed).is_err());
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let k = key(4);
        let mut sealed = encrypt_bytes(&k, b"aad", b"secret message").unwrap();
        sealed[13] ^= 0x01;
        assert!(decrypt_bytes(&k, b"aad", &sealed).is_err());
    }

    #[test]
    fn nonces_are_unique() {
        let k = key(5);
        let a = encrypt_bytes(&k, b"aad", b"same").unwrap();
        let b = encrypt_bytes(&k, b"aad", b"same").unwrap();
        assert_ne!(&a[1..13], &b[1..13]);
    }

    #[test]
    fn unversioned_payload_is_rejected() {
        let k = key(6);
        let result = decrypt_bytes(&k, b"aad", b"plain-token");
        assert!(matches!(result, Err(CryptoError::UnsupportedVersion(b'p'))));
        assert!(matches!(
            decrypt_bytes(&k, b"aad", &[]),
            Err(CryptoError::EmptyCiphertext)
        ));
    }

    #[test]
    fn short_payload_is_invalid() {
        let result = decrypt_bytes(&key(0), b"aad", &[VERSION_V1, 0x02]);
        assert!(matches!(result, Err(CryptoError::InvalidFormat)));
    }

    #[test]
    fn key_length_is_enforced() {
        assert!(matches!(
            CryptoKey::new(vec![0u8; 16]),
            Err(CryptoError::InvalidKeyLength(16))
        ));
        assert!(CryptoKey::new(vec![0u8; 64]).is_err());
    }

    #[test]
    fn debug_output_hides_key_material() {
        assert_eq!(format!("{:?}", key(9)), "ZeroizingKey([REDACTED])");
    }
}

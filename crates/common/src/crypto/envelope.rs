//! Hybrid-crypto envelope primitives for enveloped RPC.
//!
//! Every call gets its own [`Envelope`]:
//!
//! - a fresh 16-byte [`SessionKey`] drawn from the alphanumeric alphabet
//! - a lowercase hex SHA-1 [`sign`]ature over the plaintext payload
//! - AES-128-ECB/PKCS#7 ciphertext of the payload under the session key
//! - the session key and the signature, each wrapped with the backend's RSA
//!   public key (PKCS#1 v1.5) by a [`KeyWrapper`] and base64-encoded
//!
//! ECB is what the remote protocol speaks; it is reproduced bit-for-bit.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ssogate_common::crypto::envelope::{Envelope, KeyWrapper};
//!
//! let wrapper = KeyWrapper::from_base64_der(PUBLIC_KEY)?;
//! let envelope = Envelope::seal(br#"{"id":42}"#, &wrapper)?;
//! // send envelope.body() with the ak / sk / ts headers ...
//! let plaintext = envelope.open(response_bytes)?;
//! ```

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyInit};
use aes::Aes128;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::distributions::Alphanumeric;
use rand::Rng;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pkcs1v15Encrypt, RsaPublicKey};
use sha1::{Digest, Sha1};
use thiserror::Error;

use crate::error::{CommonError, CommonResult};

type Aes128EcbEnc = ecb::Encryptor<Aes128>;
type Aes128EcbDec = ecb::Decryptor<Aes128>;

/// Length of a session key in bytes.
pub const SESSION_KEY_LEN: usize = 16;

/// Per-call symmetric key.
///
/// Deliberately neither `Clone` nor `Copy`: a key lives inside exactly one
/// [`Envelope`] and is dropped when that envelope is opened.
pub struct SessionKey([u8; SESSION_KEY_LEN]);

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey([REDACTED])")
    }
}

impl SessionKey {
    /// Draw a fresh key of 16 alphanumeric ASCII characters.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut key = [0u8; SESSION_KEY_LEN];
        for byte in key.iter_mut() {
            *byte = rng.sample(Alphanumeric);
        }
        Self(key)
    }

    /// Wrap existing key material (the server side of a test double).
    pub fn from_bytes(bytes: [u8; SESSION_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Rebuild a key from an unwrapped `ak` value.
    pub fn from_slice(bytes: &[u8]) -> CommonResult<Self> {
        let key: [u8; SESSION_KEY_LEN] = bytes.try_into().map_err(|_| {
            CommonError::crypto(
                "session key",
                format!("expected {SESSION_KEY_LEN} bytes, got {}", bytes.len()),
            )
        })?;
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; SESSION_KEY_LEN] {
        &self.0
    }

    /// AES-128-ECB encrypt with PKCS#7 padding.
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        Aes128EcbEnc::new(GenericArray::from_slice(&self.0))
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext)
    }

    /// AES-128-ECB decrypt and strip PKCS#7 padding.
    pub fn decrypt(&self, ciphertext: &[u8]) -> CommonResult<Vec<u8>> {
        Aes128EcbDec::new(GenericArray::from_slice(&self.0))
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| {
                CommonError::crypto(
                    "aes-ecb decrypt",
                    format!("invalid padding or length ({} bytes)", ciphertext.len()),
                )
            })
    }
}

/// Lowercase hex SHA-1 digest of the payload bytes.
pub fn sign(payload: &[u8]) -> String {
    hex::encode(Sha1::digest(payload))
}

/// Wraps small secrets with the backend's fixed RSA public key.
#[derive(Debug, Clone)]
pub struct KeyWrapper {
    key: RsaPublicKey,
}

impl KeyWrapper {
    pub fn new(key: RsaPublicKey) -> Self {
        Self { key }
    }

    /// Load a base64-encoded DER `SubjectPublicKeyInfo`.
    pub fn from_base64_der(encoded: &str) -> CommonResult<Self> {
        let der = BASE64
            .decode(encoded.trim())
            .map_err(|e| CommonError::config_field("rsa_public_key", format!("not base64: {e}")))?;
        let key = RsaPublicKey::from_public_key_der(&der).map_err(|e| {
            CommonError::config_field("rsa_public_key", format!("not an RSA public key: {e}"))
        })?;
        Ok(Self { key })
    }

    /// RSA PKCS#1 v1.5 encrypt, then base64.
    pub fn wrap(&self, secret: &[u8]) -> CommonResult<String> {
        let wrapped = self
            .key
            .encrypt(&mut rand::thread_rng(), Pkcs1v15Encrypt, secret)
            .map_err(|e| CommonError::crypto("rsa wrap", e.to_string()))?;
        Ok(BASE64.encode(wrapped))
    }
}

/// Why a response body could not be opened.
#[derive(Debug, Error)]
pub enum OpenError {
    /// The body is not base64 at all; the server answered in plaintext.
    #[error("response body is not an envelope: {0}")]
    NotEnveloped(String),

    /// The body decoded but did not decrypt under this call's key.
    #[error(transparent)]
    Malformed(#[from] CommonError),
}

/// One sealed request and the key needed to read its response.
#[derive(Debug)]
pub struct Envelope {
    key: SessionKey,
    signature: String,
    wrapped_key: String,
    wrapped_signature: String,
    body: String,
    timestamp_ms: u128,
}

impl Envelope {
    /// Seal a payload under a freshly generated session key.
    pub fn seal(payload: &[u8], wrapper: &KeyWrapper) -> CommonResult<Self> {
        Self::seal_with_key(payload, wrapper, SessionKey::generate())
    }

    /// Seal with caller-provided key material.
    pub fn seal_with_key(
        payload: &[u8],
        wrapper: &KeyWrapper,
        key: SessionKey,
    ) -> CommonResult<Self> {
        let signature = sign(payload);
        let wrapped_key = wrapper.wrap(key.as_bytes())?;
        let wrapped_signature = wrapper.wrap(signature.as_bytes())?;
        let body = BASE64.encode(key.encrypt(payload));
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();

        Ok(Self { key, signature, wrapped_key, wrapped_signature, body, timestamp_ms })
    }

    /// Value for the `ak` header.
    pub fn wrapped_key(&self) -> &str {
        &self.wrapped_key
    }

    /// Value for the `sk` header.
    pub fn wrapped_signature(&self) -> &str {
        &self.wrapped_signature
    }

    /// Value for the `ts` header.
    pub fn timestamp_ms(&self) -> u128 {
        self.timestamp_ms
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Base64 ciphertext request body.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Decode and decrypt a response body, consuming the envelope.
    pub fn open(self, response: &[u8]) -> Result<Vec<u8>, OpenError> {
        let trimmed = response.trim_ascii();
        let ciphertext =
            BASE64.decode(trimmed).map_err(|e| OpenError::NotEnveloped(e.to_string()))?;
        Ok(self.key.decrypt(&ciphertext)?)
    }
}

//! Opaque-token encryption for interactive controls.
//!
//! Tokens travel embedded in outbound keyboards and come back from untrusted
//! clients, so decryption must treat every input as hostile: any malformed
//! token is a recoverable [`CipherError`], never a panic.

use aes::Aes256;
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use ctr::cipher::{KeyIvInit, StreamCipher};
use sha2::{Digest, Sha256};

type Aes256Ctr = ctr::Ctr128BE<Aes256>;

/// Width of the random IV prefixed to every ciphertext.
pub const IV_LEN: usize = 16;

/// Upper bound on plaintext length, enforced before any cipher work.
pub const MAX_PLAINTEXT_LEN: usize = 48;

// ─── CipherError ──────────────────────────────────────────────────────────────

/// Errors from [`TokenCipher::encrypt`] / [`TokenCipher::decrypt`].
#[derive(Clone, Debug, PartialEq)]
pub enum CipherError {
    /// Plaintext exceeds [`MAX_PLAINTEXT_LEN`]. Caller error, rejected up front.
    TooLong { len: usize },
    /// Token is not valid base64, or too short to carry an IV.
    Malformed,
}

impl std::fmt::Display for CipherError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooLong { len } => {
                write!(f, "plaintext too long: {len} bytes (max {MAX_PLAINTEXT_LEN})")
            }
            Self::Malformed => write!(f, "malformed token"),
        }
    }
}
impl std::error::Error for CipherError {}

/// Derive the 256-bit session key from a shared secret.
///
/// Done once at session start; the resulting key material is immutable
/// afterwards and needs no synchronization.
pub fn derive_key(secret: &str) -> [u8; 32] {
    Sha256::digest(secret.as_bytes()).into()
}

// ─── TokenCipher ──────────────────────────────────────────────────────────────

/// Symmetric cipher for small opaque tokens.
///
/// With no secret configured both directions are plain base64 transforms, so
/// callers never branch on whether encryption is on.
pub enum TokenCipher {
    /// Pass-through: `encrypt` base64-encodes, `decrypt` base64-decodes.
    Plain,
    /// AES-256-CTR keyed by [`derive_key`]; every token carries a fresh IV.
    Aes { key: [u8; 32] },
}

impl TokenCipher {
    /// Build a cipher from an optional session secret.
    pub fn from_secret(secret: Option<&str>) -> Self {
        match secret {
            Some(s) => Self::Aes { key: derive_key(s) },
            None => Self::Plain,
        }
    }

    /// Encrypt `plaintext` into a transport-safe token.
    ///
    /// Never deterministic: two calls with the same plaintext yield different
    /// tokens (fresh IV each time).
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, CipherError> {
        if plaintext.len() > MAX_PLAINTEXT_LEN {
            return Err(CipherError::TooLong { len: plaintext.len() });
        }
        match self {
            Self::Plain => Ok(B64.encode(plaintext)),
            Self::Aes { key } => {
                let mut iv = [0u8; IV_LEN];
                getrandom::getrandom(&mut iv).expect("getrandom");

                let mut buf = Vec::with_capacity(IV_LEN + plaintext.len());
                buf.extend_from_slice(&iv);
                buf.extend_from_slice(plaintext);

                let mut ctr = Aes256Ctr::new(key.into(), (&iv).into());
                ctr.apply_keystream(&mut buf[IV_LEN..]);
                Ok(B64.encode(&buf))
            }
        }
    }

    /// Decrypt a token previously produced by [`TokenCipher::encrypt`].
    ///
    /// A wrong key decrypts to garbage rather than failing — CTR has no
    /// integrity check — so callers must treat the plaintext as untrusted.
    pub fn decrypt(&self, token: &str) -> Result<Vec<u8>, CipherError> {
        let raw = B64.decode(token).map_err(|_| CipherError::Malformed)?;
        match self {
            Self::Plain => Ok(raw),
            Self::Aes { key } => {
                if raw.len() < IV_LEN {
                    return Err(CipherError::Malformed);
                }
                let mut iv = [0u8; IV_LEN];
                iv.copy_from_slice(&raw[..IV_LEN]);

                let mut buf = raw[IV_LEN..].to_vec();
                let mut ctr = Aes256Ctr::new(key.into(), (&iv).into());
                ctr.apply_keystream(&mut buf);
                Ok(buf)
            }
        }
    }
}

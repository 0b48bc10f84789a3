//! Cryptographic primitives for tdbridge.
//!
//! Provides:
//! - `TokenCipher` — AES-256-CTR encryption of small opaque tokens
//!   (callback payloads), base64-wrapped with a per-token random IV
//! - SHA-256 session key derivation from a shared secret

#![deny(unsafe_code)]

mod cipher;

pub use cipher::{derive_key, CipherError, TokenCipher, IV_LEN, MAX_PLAINTEXT_LEN};

//! Error types for tdbridge-client.

use std::fmt;

use tdbridge_crypto::CipherError;

// ─── RpcError ─────────────────────────────────────────────────────────────────

/// An error outcome returned by the transport for a named operation,
/// or delivered later inside a failure event.
#[derive(Clone, Debug, PartialEq)]
pub struct RpcError {
    /// Numeric error code (HTTP-like; 429 is the structured rate-limit code).
    pub code: i32,
    /// Human-readable error message.
    pub message: String,
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RPC {}: {}", self.code, self.message)
    }
}

impl std::error::Error for RpcError {}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    /// Match on the error message, with optional wildcard prefix/suffix `'*'`.
    ///
    /// # Examples
    /// - `err.is("Chat not found")` — exact match
    /// - `err.is("Chat not*")` — starts-with match
    /// - `err.is("*not found")` — ends-with match
    pub fn is(&self, pattern: &str) -> bool {
        if let Some(prefix) = pattern.strip_suffix('*') {
            self.message.starts_with(prefix)
        } else if let Some(suffix) = pattern.strip_prefix('*') {
            self.message.ends_with(suffix)
        } else {
            self.message == pattern
        }
    }

    /// Returns the back-off duration in seconds if this is a rate-limit error.
    ///
    /// The structured code (429) is authoritative. The trailing-number parse of
    /// `"Too Many Requests: retry after N"` is a fallback heuristic for
    /// transports that only carry the message.
    pub fn retry_after_seconds(&self) -> Option<u64> {
        if self.code != 429 && !self.message.starts_with("Too Many Requests") {
            return None;
        }
        self.message
            .rsplit(' ')
            .next()
            .and_then(|s| s.parse::<u64>().ok())
            .or(Some(0))
    }

    /// `true` if callers should treat this as transient and back off.
    pub fn is_rate_limit(&self) -> bool {
        self.code == 429 || self.message.starts_with("Too Many Requests")
    }
}

// ─── InvocationError ──────────────────────────────────────────────────────────

/// The error type returned from any `Client` method.
#[derive(Debug)]
pub enum InvocationError {
    /// The transport (or the eventual completion event) rejected the request.
    Rpc(RpcError),
    /// Operation invoked before the session finished its setup.
    NotReady,
    /// A handle could not be resolved to a chat identifier.
    Resolve(String),
    /// Callback token encryption/decryption failed on a caller-supplied value.
    Cipher(CipherError),
    /// Response or event payload did not have the expected shape.
    Deserialize(String),
    /// The registered wait outlived the configured acknowledgement timeout.
    Timeout,
    /// A wait is already registered under the same correlation key.
    DuplicateWait(String),
    /// The wait was dropped before delivery (e.g. event stream shut down).
    Dropped,
}

impl fmt::Display for InvocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rpc(e)           => write!(f, "{e}"),
            Self::NotReady         => write!(f, "client is not ready yet"),
            Self::Resolve(s)       => write!(f, "resolve error: {s}"),
            Self::Cipher(e)        => write!(f, "cipher error: {e}"),
            Self::Deserialize(s)   => write!(f, "deserialize error: {s}"),
            Self::Timeout          => write!(f, "no completion event before the deadline"),
            Self::DuplicateWait(k) => write!(f, "wait already registered for key {k}"),
            Self::Dropped          => write!(f, "wait dropped before delivery"),
        }
    }
}

impl std::error::Error for InvocationError {}

impl From<RpcError> for InvocationError {
    fn from(e: RpcError) -> Self { Self::Rpc(e) }
}

impl From<CipherError> for InvocationError {
    fn from(e: CipherError) -> Self { Self::Cipher(e) }
}

impl InvocationError {
    /// Returns `true` if this is an RPC error matching `pattern` (supports `'*'` wildcards).
    pub fn is(&self, pattern: &str) -> bool {
        match self {
            Self::Rpc(e) => e.is(pattern),
            _            => false,
        }
    }

    /// If this is a rate-limit error, returns how many seconds to back off.
    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            Self::Rpc(e) => e.retry_after_seconds(),
            _            => None,
        }
    }
}

//! Request signing with HMAC-SHA256.
//!
//! Tracking requests may carry a signature in the `s` query parameter. The
//! signature covers every other parameter, canonicalized as follows:
//!
//! 1. Drop the signature parameter itself.
//! 2. Sort the remaining keys by ascending byte order.
//! 3. Concatenate `key + value` for each key, with no delimiter.
//!
//! The canonical string is MAC'd with HMAC-SHA256 keyed by the shared
//! secret and the raw digest is encoded as standard, padded base64.
//!
//! ```
//! use risa_collector::{sign, QueryParams};
//!
//! let params: QueryParams = [("c", "login"), ("a", "users")].into_iter().collect();
//! assert_eq!(params.canonical(), "ausersclogin");
//! assert_eq!(
//!     sign(&params, b"sekret"),
//!     "2vo7W6hQw5YegkoFE78LAmzCPY4GA0Np8jD/3KCzcYY="
//! );
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::btree_map::{self, BTreeMap};
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

/// Name of the query parameter carrying the signature.
pub const SIGNATURE_PARAM: &str = "s";

/// Query parameters of a tracking request.
///
/// Keys are unique. When a key repeats in the raw query string the first
/// value is kept, matching an ordinary single-value parameter lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(BTreeMap<String, String>);

impl QueryParams {
    /// Creates an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a parameter unless the key is already present.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.entry(key.into()).or_insert_with(|| value.into());
    }

    /// Returns the value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Returns the value for `key`, or the empty string when absent.
    pub fn get_or_empty(&self, key: &str) -> &str {
        self.get(key).unwrap_or("")
    }

    /// Returns the provided signature, if any.
    pub fn signature(&self) -> Option<&str> {
        self.get(SIGNATURE_PARAM)
    }

    /// Returns the number of parameters.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over parameters in ascending key order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.0.iter()
    }

    /// Builds the canonical signing string.
    pub fn canonical(&self) -> String {
        canonicalize(self)
    }
}

impl<K, V> FromIterator<(K, V)> for QueryParams
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = QueryParams::new();
        for (key, value) in iter {
            params.insert(key, value);
        }
        params
    }
}

/// Builds the canonical signing string for `params`.
///
/// `BTreeMap<String, _>` orders keys by their UTF-8 bytes, which is exactly
/// the ordering the signature scheme requires.
pub fn canonicalize(params: &QueryParams) -> String {
    let mut out = String::new();
    for (key, value) in params.iter() {
        if key == SIGNATURE_PARAM {
            continue;
        }
        out.push_str(key);
        out.push_str(value);
    }
    out
}

/// Computes the base64 signature of `params` under `secret`.
pub fn sign(params: &QueryParams, secret: &[u8]) -> String {
    let mut mac = keyed_mac(secret);
    mac.update(canonicalize(params).as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}

/// Verifies `provided` against the signature of `params`.
///
/// An empty `secret` disables verification. With a secret configured, a
/// missing or empty signature fails. The comparison is constant-time over
/// the decoded digest; because the decoder only accepts canonical padded
/// base64, the accepted strings are exactly those equal to [`sign`]'s output.
pub fn verify(params: &QueryParams, provided: Option<&str>, secret: &[u8]) -> bool {
    if secret.is_empty() {
        return true;
    }
    let provided = match provided {
        Some(sig) if !sig.is_empty() => sig,
        _ => return false,
    };
    let Ok(digest) = STANDARD.decode(provided) else {
        return false;
    };

    let mut mac = keyed_mac(secret);
    mac.update(canonicalize(params).as_bytes());
    mac.verify_slice(&digest).is_ok()
}

#[allow(clippy::expect_used)]
fn keyed_mac(secret: &[u8]) -> HmacSha256 {
    HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size")
}

/// Verifies tracking requests against the process-wide shared secret.
#[derive(Clone, Default)]
pub struct Signer {
    secret: Option<Zeroizing<Vec<u8>>>,
}

impl Signer {
    /// Creates a signer. `None` or an empty secret disables verification.
    pub fn new(secret: Option<Vec<u8>>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()).map(Zeroizing::new),
        }
    }

    /// Creates a signer that accepts every request.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Returns true if requests must be signed.
    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }

    /// Verifies the signature carried in `params` itself.
    pub fn verify(&self, params: &QueryParams) -> bool {
        match &self.secret {
            Some(secret) => verify(params, params.signature(), secret),
            None => true,
        }
    }

    /// Signs `params`. Returns `None` when signing is disabled.
    pub fn sign(&self, params: &QueryParams) -> Option<String> {
        self.secret.as_ref().map(|secret| sign(params, secret))
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

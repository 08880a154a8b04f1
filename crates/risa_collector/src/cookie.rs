//! Signed session cookie.
//!
//! The `_risa` cookie is an opaque container owned by the client. The server
//! only reads and writes `session_key`; any other entries survive a
//! re-encode untouched.
//!
//! ## Value Format
//!
//! ```text
//! base64url(json map) "." unix_seconds "." base64url(hmac)
//! ```
//!
//! The MAC is HMAC-SHA256 over `name "|" payload "|" unix_seconds`, keyed by
//! the cookie secret. Binding the cookie name prevents a value issued for
//! one cookie from being replayed under another.

use crate::error::{CookieError, CookieResult};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use std::collections::BTreeMap;
use std::time::Duration;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "_risa";

/// Key holding the session identifier inside the cookie container.
pub const SESSION_KEY: &str = "session_key";

/// Default cookie lifetime: 30 days.
pub const DEFAULT_COOKIE_MAX_AGE: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Decoded contents of the session cookie.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionCookie {
    values: BTreeMap<String, Value>,
}

impl SessionCookie {
    /// Creates an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the session identifier, if the container holds a string one.
    pub fn session_key(&self) -> Option<&str> {
        self.values.get(SESSION_KEY).and_then(Value::as_str)
    }

    /// Stores the session identifier.
    pub fn set_session_key(&mut self, key: impl Into<String>) {
        self.values
            .insert(SESSION_KEY.to_string(), Value::String(key.into()));
    }

    /// Returns an arbitrary entry.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Sets an arbitrary entry.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }
}

/// Encodes and verifies signed cookie values.
#[derive(Clone)]
pub struct CookieCodec {
    name: String,
    key: Zeroizing<Vec<u8>>,
    max_age: Duration,
}

impl CookieCodec {
    /// Creates a codec for the session cookie.
    pub fn new(key: Vec<u8>) -> Self {
        Self {
            name: SESSION_COOKIE.to_string(),
            key: Zeroizing::new(key),
            max_age: DEFAULT_COOKIE_MAX_AGE,
        }
    }

    /// Sets the cookie lifetime. Zero disables the expiry check.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Encodes `cookie` into a signed value stamped with `now`.
    pub fn encode(&self, cookie: &SessionCookie, now: DateTime<Utc>) -> CookieResult<String> {
        if self.key.is_empty() {
            return Err(CookieError::MissingKey);
        }
        let json =
            serde_json::to_vec(&cookie.values).map_err(|e| CookieError::Encode(e.to_string()))?;
        let payload = URL_SAFE_NO_PAD.encode(json);
        let timestamp = now.timestamp();
        let mac = self.mac(&payload, timestamp)?;

        Ok(format!(
            "{payload}.{timestamp}.{}",
            URL_SAFE_NO_PAD.encode(mac)
        ))
    }

    /// Decodes and verifies a signed value.
    pub fn decode(&self, value: &str, now: DateTime<Utc>) -> CookieResult<SessionCookie> {
        if self.key.is_empty() {
            return Err(CookieError::MissingKey);
        }

        let mut parts = value.split('.');
        let (Some(payload), Some(timestamp), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(CookieError::Malformed("expected three segments"));
        };

        let issued_at: i64 = timestamp
            .parse()
            .map_err(|_| CookieError::Malformed("bad timestamp"))?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| CookieError::Malformed("bad signature encoding"))?;

        let mut mac = self.keyed_mac()?;
        mac.update(self.signing_input(payload, issued_at).as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| CookieError::BadSignature)?;

        let max_age = i64::try_from(self.max_age.as_secs()).unwrap_or(i64::MAX);
        if max_age > 0 && issued_at < now.timestamp().saturating_sub(max_age) {
            return Err(CookieError::Expired { issued_at, max_age });
        }

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| CookieError::Malformed("bad payload encoding"))?;
        let values: BTreeMap<String, Value> = serde_json::from_slice(&json)
            .map_err(|_| CookieError::Malformed("payload is not a json object"))?;

        Ok(SessionCookie { values })
    }

    /// Renders a `Set-Cookie` header value for an encoded cookie.
    pub fn set_cookie_header(&self, value: &str) -> String {
        format!(
            "{}={}; Path=/; Max-Age={}; HttpOnly",
            self.name,
            value,
            self.max_age.as_secs()
        )
    }

    fn mac(&self, payload: &str, timestamp: i64) -> CookieResult<[u8; 32]> {
        let mut mac = self.keyed_mac()?;
        mac.update(self.signing_input(payload, timestamp).as_bytes());
        Ok(mac.finalize().into_bytes().into())
    }

    fn keyed_mac(&self) -> CookieResult<HmacSha256> {
        HmacSha256::new_from_slice(&self.key).map_err(|_| CookieError::MissingKey)
    }

    fn signing_input(&self, payload: &str, timestamp: i64) -> String {
        format!("{}|{}|{}", self.name, payload, timestamp)
    }
}

impl std::fmt::Debug for CookieCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieCodec")
            .field("name", &self.name)
            .field("max_age", &self.max_age)
            .finish_non_exhaustive()
    }
}

/// Finds the value of cookie `name` across one or more `Cookie` headers.
///
/// The first occurrence wins.
pub fn find_cookie<'a, I>(headers: I, name: &str) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    headers
        .into_iter()
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().trim_matches('"'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn codec() -> CookieCodec {
        CookieCodec::new(b"cookie-secret".to_vec())
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn encode_and_decode() {
        let mut cookie = SessionCookie::new();
        cookie.set_session_key("42");

        let value = codec().encode(&cookie, at(1_000)).unwrap();
        let decoded = codec().decode(&value, at(1_000)).unwrap();
        assert_eq!(decoded.session_key(), Some("42"));
    }

    #[test]
    fn preserves_other_entries() {
        let mut cookie = SessionCookie::new();
        cookie.insert("theme", Value::String("dark".into()));
        cookie.set_session_key("7");

        let value = codec().encode(&cookie, at(1_000)).unwrap();
        let decoded = codec().decode(&value, at(1_000)).unwrap();
        assert_eq!(decoded.get("theme"), Some(&Value::String("dark".into())));
        assert_eq!(decoded.session_key(), Some("7"));
    }

    #[test]
    fn non_string_session_key_is_ignored() {
        let mut cookie = SessionCookie::new();
        cookie.insert(SESSION_KEY, Value::from(42));
        assert_eq!(cookie.session_key(), None);
    }

    #[test]
    fn reject_wrong_key() {
        let mut cookie = SessionCookie::new();
        cookie.set_session_key("1");
        let value = codec().encode(&cookie, at(1_000)).unwrap();

        let other = CookieCodec::new(b"another-secret".to_vec());
        assert_eq!(
            other.decode(&value, at(1_000)),
            Err(CookieError::BadSignature)
        );
    }

    #[test]
    fn reject_tampered_payload() {
        let mut cookie = SessionCookie::new();
        cookie.set_session_key("1");
        let value = codec().encode(&cookie, at(1_000)).unwrap();

        let mut forged = SessionCookie::new();
        forged.set_session_key("999");
        let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged.values).unwrap());
        let rest = value.split_once('.').unwrap().1;
        let tampered = format!("{forged_payload}.{rest}");

        assert_eq!(
            codec().decode(&tampered, at(1_000)),
            Err(CookieError::BadSignature)
        );
    }

    #[test]
    fn reject_expired() {
        let codec = codec().with_max_age(Duration::from_secs(60));
        let value = codec.encode(&SessionCookie::new(), at(1_000)).unwrap();

        assert!(codec.decode(&value, at(1_060)).is_ok());
        assert!(matches!(
            codec.decode(&value, at(1_061)),
            Err(CookieError::Expired { .. })
        ));
    }

    #[test]
    fn zero_max_age_never_expires() {
        let codec = codec().with_max_age(Duration::ZERO);
        let value = codec.encode(&SessionCookie::new(), at(0)).unwrap();
        assert!(codec.decode(&value, at(i32::MAX as i64)).is_ok());
    }

    #[test]
    fn oversized_max_age_does_not_wrap() {
        let codec = codec().with_max_age(Duration::from_secs(u64::MAX));
        let value = codec.encode(&SessionCookie::new(), at(0)).unwrap();
        assert!(codec.decode(&value, at(i32::MAX as i64)).is_ok());
    }

    #[test]
    fn reject_malformed() {
        assert!(matches!(
            codec().decode("garbage", at(0)),
            Err(CookieError::Malformed(_))
        ));
        assert!(matches!(
            codec().decode("a.b.c.d", at(0)),
            Err(CookieError::Malformed(_))
        ));
        assert!(matches!(
            codec().decode("a.notanumber.c", at(0)),
            Err(CookieError::Malformed(_))
        ));
    }

    #[test]
    fn empty_key_refuses_to_sign() {
        let codec = CookieCodec::new(Vec::new());
        assert_eq!(
            codec.encode(&SessionCookie::new(), at(0)),
            Err(CookieError::MissingKey)
        );
    }

    #[test]
    fn set_cookie_attributes() {
        let header = codec().set_cookie_header("abc");
        assert_eq!(header, "_risa=abc; Path=/; Max-Age=2592000; HttpOnly");
    }

    #[test]
    fn find_cookie_in_headers() {
        let headers = ["theme=dark; _risa=abc.1.xyz", "_risa=second"];
        assert_eq!(find_cookie(headers, SESSION_COOKIE), Some("abc.1.xyz"));
        assert_eq!(find_cookie(["other=1"], SESSION_COOKIE), None);
        assert_eq!(find_cookie(["_risa=\"quoted\""], SESSION_COOKIE), Some("quoted"));
        assert_eq!(find_cookie(["x_risa=1"], SESSION_COOKIE), None);
    }

    #[test]
    fn debug_hides_key() {
        let out = format!("{:?}", codec());
        assert!(!out.contains("cookie-secret"));
    }
}

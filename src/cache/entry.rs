//! Immutable snapshot of a rendered response.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::http::{Headers, StatusCode};

/// `Cache-Control` directives that forbid storing a response.
const UNSTORABLE_DIRECTIVES: [&str; 3] = ["no-store", "private", "no-cache"];

/// A captured response held by the cache.
///
/// Built once by [`capture`](super::capture::capture) and never mutated
/// afterwards; refreshing a key means storing a new entry under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    expiration: u32,
    created: SystemTime,
    validator: String,
    status: StatusCode,
    headers: Headers,
    body: Vec<u8>,
}

impl CacheEntry {
    /// Assemble an entry.
    ///
    /// `created` is truncated to whole seconds, the precision of HTTP dates, so
    /// that a client echoing back the `Last-Modified` value compares equal.
    pub fn new(
        status: StatusCode,
        headers: Headers,
        body: Vec<u8>,
        validator: String,
        created: SystemTime,
        expiration: u32,
    ) -> Self {
        Self {
            expiration,
            created: truncate_to_seconds(created),
            validator,
            status,
            headers,
            body,
        }
    }

    /// Declared expiration in seconds; `0` defers to the global default.
    pub fn expiration(&self) -> u32 {
        self.expiration
    }

    pub fn created(&self) -> SystemTime {
        self.created
    }

    /// Entity tag used for `ETag` and `If-None-Match`.
    pub fn validator(&self) -> &str {
        &self.validator
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Approximate retained size: serialized headers plus body, saturating.
    pub fn cost(&self) -> u32 {
        let cost = self.headers.wire_len().saturating_add(self.body.len());
        u32::try_from(cost).unwrap_or(u32::MAX)
    }

    /// Store TTL derived from the declared expiration; zero means no expiry.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(u64::from(self.expiration))
    }

    /// `false` when the captured `Cache-Control` carries `no-store`, `private`,
    /// or `no-cache` (case-insensitive substring match).
    pub fn is_storable(&self) -> bool {
        !self.headers.get_all("cache-control").any(|value| {
            let value = value.to_ascii_lowercase();
            UNSTORABLE_DIRECTIVES
                .iter()
                .any(|directive| value.contains(directive))
        })
    }
}

fn truncate_to_seconds(time: SystemTime) -> SystemTime {
    match time.duration_since(UNIX_EPOCH) {
        Ok(since) => UNIX_EPOCH + Duration::from_secs(since.as_secs()),
        Err(_) => time,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(headers: Headers, body: &[u8]) -> CacheEntry {
        CacheEntry::new(
            StatusCode::Ok,
            headers,
            body.to_vec(),
            "\"v\"".to_owned(),
            SystemTime::now(),
            0,
        )
    }

    fn with_cache_control(value: &str) -> Headers {
        let mut headers = Headers::new();
        headers.insert("Cache-Control", value);
        headers
    }

    #[test]
    fn creation_time_has_second_precision() {
        let created = UNIX_EPOCH + Duration::from_millis(1_700_000_000_999);
        let entry = CacheEntry::new(
            StatusCode::Ok,
            Headers::new(),
            Vec::new(),
            String::new(),
            created,
            0,
        );
        assert_eq!(entry.created(), UNIX_EPOCH + Duration::from_secs(1_700_000_000));
    }

    #[test]
    fn cost_grows_with_body() {
        let small = entry(Headers::new(), &[0; 10]);
        let large = entry(Headers::new(), &[0; 1000]);
        assert!(large.cost() > small.cost());
    }

    #[test]
    fn cost_counts_headers() {
        let bare = entry(Headers::new(), b"x");
        let mut headers = Headers::new();
        headers.insert("Content-Type", "text/html");
        let dressed = entry(headers, b"x");
        assert!(dressed.cost() > bare.cost());
    }

    #[test]
    fn unstorable_directives_are_detected() {
        for value in ["no-store", "Private, max-age=0", "public, NO-CACHE"] {
            assert!(!entry(with_cache_control(value), b"").is_storable(), "{value}");
        }
        assert!(entry(with_cache_control("public, max-age=60"), b"").is_storable());
        assert!(entry(Headers::new(), b"").is_storable());
    }

    #[test]
    fn zero_expiration_means_no_ttl() {
        assert_eq!(entry(Headers::new(), b"").ttl(), Duration::ZERO);
    }
}

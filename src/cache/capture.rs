//! Rendering a canonical response for the cache.
//!
//! A miss is rendered against a sanitized copy of the request: conditional and
//! range headers are removed so downstream always produces the full,
//! unconditional representation, and the actor is treated as anonymous.

use std::time::SystemTime;

use sha2::{Digest, Sha256};
use tracing::debug;

use super::entry::CacheEntry;
use crate::context::Context;
use crate::middleware::Next;

/// Request headers removed before rendering a cacheable response.
pub const CONDITIONAL_HEADERS: [&str; 6] = [
    "If-Modified-Since",
    "If-Unmodified-Since",
    "If-None-Match",
    "If-Match",
    "If-Range",
    "Range",
];

/// Response headers dropped from the entry; they are synthesized on serve.
const SYNTHESIZED_HEADERS: [&str; 3] = ["Accept-Ranges", "ETag", "Last-Modified"];

/// Copy `ctx` for rendering: same method, path, query, body, and mode flags,
/// minus conditional/range headers and with the login signal cleared.
///
/// The original context is not touched.
pub fn sanitize(ctx: &Context) -> Context {
    let request = ctx.request().without_headers(&CONDITIONAL_HEADERS);
    ctx.with_request(request).map_flags(|flags| flags.logged_in = false)
}

/// Run the rest of the chain for `ctx` and record the result.
///
/// `ctx` is expected to be sanitized already (see [`sanitize`]). The entry's
/// validator is the downstream `ETag` when present, otherwise a hash of the
/// body; its creation time is the downstream `Last-Modified` when parseable,
/// otherwise now.
pub async fn capture(ctx: Context, next: Next) -> CacheEntry {
    let expiration = ctx.flags().expiration;
    let response = next.run(ctx).await;
    let (status, mut headers, body) = response.into_parts();

    let validator = match headers.get("etag") {
        Some(etag) => etag.to_owned(),
        None => content_validator(&body),
    };
    let created = headers
        .get("last-modified")
        .and_then(|value| httpdate::parse_http_date(value).ok())
        .unwrap_or_else(SystemTime::now);

    for name in SYNTHESIZED_HEADERS {
        headers.remove(name);
    }

    debug!(
        status = status.as_u16(),
        bytes = body.len(),
        validator = %validator,
        "captured response"
    );

    CacheEntry::new(status, headers, body, validator, created, expiration)
}

/// Strong entity tag for `body`: the quoted hex SHA-256 digest.
///
/// # Examples
///
/// ```
/// use render_cache::cache::capture::content_validator;
///
/// let tag = content_validator(b"hello");
/// assert!(tag.starts_with('"') && tag.ends_with('"'));
/// assert_eq!(tag, content_validator(b"hello"));
/// assert_ne!(tag, content_validator(b"hello!"));
/// ```
pub fn content_validator(body: &[u8]) -> String {
    format!("\"{}\"", hex::encode(Sha256::digest(body)))
}

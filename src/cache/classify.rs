//! Request classification: cacheability, login bypass, and cache keys.

use crate::Method;
use crate::context::Context;
use crate::http::Request;

/// Query parameter that lets a client force a bypass (`cache=0` / `cache=false`).
const BYPASS_PARAM: &str = "cache";

/// Key prefix for the alternate rendering mode.
const ALTERNATE_PREFIX: &str = "as-";
/// Key prefix for requests over an anonymizing network.
const ANONYMIZED_PREFIX: &str = "tor-";

/// `true` for `GET`/`HEAD` requests that did not opt out via `?cache=0` or
/// `?cache=false`.
pub fn is_cacheable(request: &Request) -> bool {
    if !matches!(request.method(), Method::Get | Method::Head) {
        return false;
    }
    !matches!(request.query_param(BYPASS_PARAM), Some("0" | "false"))
}

/// `true` when the actor is authenticated and the route did not force it
/// into the cache. Such requests skip caching entirely.
pub fn is_logged_in(ctx: &Context) -> bool {
    let flags = ctx.flags();
    flags.logged_in && !flags.force_cache
}

/// Deterministic cache key for a request.
///
/// Built from mode prefixes, the escaped path, and the query string decoded,
/// stably sorted by name, and re-encoded. Header values other than the mode
/// flags never influence the key.
///
/// # Examples
///
/// ```
/// use render_cache::{Method, Request, context::Context};
/// use render_cache::cache::classify::cache_key;
///
/// let a = Context::new(Request::new(Method::Get, "/posts?tag=rust&page=2"));
/// let b = Context::new(Request::new(Method::Get, "/posts?page=2&tag=rust"));
/// assert_eq!(cache_key(&a), cache_key(&b));
/// assert_eq!(cache_key(&a), "/posts?page=2&tag=rust");
///
/// let alternate = a.map_flags(|flags| flags.alternate_rendering = true);
/// assert_eq!(cache_key(&alternate), "as-/posts?page=2&tag=rust");
/// ```
pub fn cache_key(ctx: &Context) -> String {
    let request = ctx.request();
    let flags = ctx.flags();

    let mut key = String::with_capacity(request.path().len() + 16);
    if flags.alternate_rendering {
        key.push_str(ALTERNATE_PREFIX);
    }
    if flags.anonymized_network {
        key.push_str(ANONYMIZED_PREFIX);
    }
    key.push_str(request.path());
    if let Some(query) = request.query_string().and_then(canonical_query) {
        key.push('?');
        key.push_str(&query);
    }
    key
}

// Decode, sort by name (keeping the relative order of repeated names), and
// re-encode. An undecodable query is kept verbatim.
fn canonical_query(query: &str) -> Option<String> {
    let Ok(mut pairs) = serde_urlencoded::from_str::<Vec<(String, String)>>(query) else {
        return (!query.is_empty()).then(|| query.to_owned());
    };
    if pairs.is_empty() {
        return None;
    }
    pairs.sort_by(|(a, _), (b, _)| a.cmp(b));
    match serde_urlencoded::to_string(&pairs) {
        Ok(encoded) => Some(encoded),
        Err(_) => Some(query.to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestFlags;

    fn ctx(method: Method, target: &str) -> Context {
        Context::new(Request::new(method, target))
    }

    fn key(target: &str) -> String {
        cache_key(&ctx(Method::Get, target))
    }

    // ── is_cacheable ──────────────────────────────────────────────────────────

    #[test]
    fn only_get_and_head_are_cacheable() {
        assert!(is_cacheable(&Request::new(Method::Get, "/")));
        assert!(is_cacheable(&Request::new(Method::Head, "/")));
        for method in [Method::Post, Method::Put, Method::Delete, Method::Patch, Method::Options] {
            assert!(!is_cacheable(&Request::new(method, "/")));
        }
    }

    #[test]
    fn query_override_disables_caching() {
        assert!(!is_cacheable(&Request::new(Method::Get, "/?cache=0")));
        assert!(!is_cacheable(&Request::new(Method::Get, "/?page=1&cache=false")));
        assert!(is_cacheable(&Request::new(Method::Get, "/?cache=1")));
        assert!(is_cacheable(&Request::new(Method::Get, "/?cached=0")));
    }

    #[test]
    fn encoded_override_disables_caching() {
        assert!(!is_cacheable(&Request::new(Method::Get, "/p?cache=%30")));
        assert!(!is_cacheable(&Request::new(Method::Get, "/p?cach%65=0")));
        assert!(!is_cacheable(&Request::new(Method::Get, "/p?cache=f%61lse")));
    }

    // ── is_logged_in ──────────────────────────────────────────────────────────

    #[test]
    fn logged_in_bypasses_unless_forced() {
        let anonymous = ctx(Method::Get, "/");
        assert!(!is_logged_in(&anonymous));

        let logged_in = anonymous.map_flags(|f| f.logged_in = true);
        assert!(is_logged_in(&logged_in));

        let forced = logged_in.map_flags(|f| f.force_cache = true);
        assert!(!is_logged_in(&forced));
    }

    // ── cache_key ─────────────────────────────────────────────────────────────

    #[test]
    fn key_ignores_query_order() {
        assert_eq!(key("/s?b=2&a=1"), key("/s?a=1&b=2"));
    }

    #[test]
    fn key_distinguishes_query_values() {
        assert_ne!(key("/s?a=1"), key("/s?a=2"));
        assert_ne!(key("/s"), key("/s?a=1"));
    }

    #[test]
    fn key_keeps_repeated_names_in_order() {
        assert_eq!(key("/s?t=b&a=0&t=a"), "/s?a=0&t=b&t=a");
    }

    #[test]
    fn key_normalizes_encoding() {
        assert_eq!(key("/s?q=a+b"), key("/s?q=a%20b"));
    }

    #[test]
    fn empty_query_adds_nothing() {
        assert_eq!(key("/s?"), "/s");
    }

    #[test]
    fn key_ignores_headers() {
        let plain = ctx(Method::Get, "/p");
        let dressed = Context::new(
            Request::new(Method::Get, "/p")
                .header("Accept-Language", "de")
                .header("If-None-Match", "\"x\""),
        );
        assert_eq!(cache_key(&plain), cache_key(&dressed));
    }

    #[test]
    fn mode_combinations_never_collide() {
        let mut keys = Vec::new();
        for alternate_rendering in [false, true] {
            for anonymized_network in [false, true] {
                let flags = RequestFlags {
                    alternate_rendering,
                    anonymized_network,
                    ..RequestFlags::default()
                };
                keys.push(cache_key(&Context::with_flags(Request::new(Method::Get, "/p"), flags)));
            }
        }
        keys.sort();
        keys.dedup();
        assert_eq!(keys, vec!["/p", "as-/p", "as-tor-/p", "tor-/p"]);
    }
}

//! The caching middleware and its companion layers.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use tracing::debug;

use super::capture::{capture, sanitize};
use super::classify::{cache_key, is_cacheable, is_logged_in};
use super::config::{CacheConfig, CacheError};
use super::entry::CacheEntry;
use super::flight::FillCoordinator;
use super::store::CacheStore;
use crate::context::Context;
use crate::middleware::{Middleware, Next};
use crate::{Response, StatusCode};

/// Response caching middleware.
///
/// Serves `GET`/`HEAD` requests from the cache, renders misses through the
/// rest of the chain at most once per key at a time, synthesizes validator
/// and `Cache-Control` headers, and answers conditional requests with `304`.
///
/// Clones share the same store, so a clone kept by administrative code can
/// [`purge`](Self::purge) what the serving clone has cached.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use render_cache::{Method, Request, Response, StatusCode};
/// use render_cache::cache::{CacheConfig, CacheMiddleware};
/// use render_cache::context::Context;
/// use render_cache::middleware::Pipeline;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let cache = CacheMiddleware::new(&CacheConfig::default()).unwrap();
/// let pipeline = Pipeline::new()
///     .layer(Arc::new(cache.clone()))
///     .endpoint(|_ctx: Context| async { Response::new(StatusCode::Ok).body("<h1>Hi</h1>") });
///
/// let response = pipeline.handle(Context::new(Request::new(Method::Get, "/"))).await;
/// assert_eq!(response.headers().get("cache-control"),
///            Some("public,max-age=600,s-max-age=200,stale-while-revalidate=600"));
///
/// cache.purge();
/// # }
/// ```
#[derive(Clone)]
pub struct CacheMiddleware {
    store: CacheStore,
    flights: Arc<FillCoordinator<Arc<CacheEntry>>>,
    // Bumped by every purge; fills started under an older value are not stored.
    generation: Arc<AtomicU64>,
    default_expiration: u32,
}

impl CacheMiddleware {
    /// Build the middleware and its store from configuration.
    ///
    /// # Errors
    ///
    /// [`CacheError::InvalidConfig`] when caching is enabled with invalid sizing.
    pub fn new(config: &CacheConfig) -> Result<Self, CacheError> {
        Ok(Self::with_store(CacheStore::from_config(config)?, config.expiration))
    }

    /// Wrap an existing store. `default_expiration` is in seconds.
    pub fn with_store(store: CacheStore, default_expiration: u32) -> Self {
        Self {
            store,
            flights: Arc::new(FillCoordinator::new()),
            generation: Arc::new(AtomicU64::new(0)),
            default_expiration,
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Drop every cached response.
    ///
    /// Renders already in progress still answer their waiting callers, but
    /// their results are not stored, and requests arriving after the purge
    /// start a fresh render instead of joining them.
    pub fn purge(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.store.clear();
    }

    async fn serve(self, ctx: Context, next: Next) -> Response {
        if !self.store.is_enabled() || !is_cacheable(ctx.request()) {
            return next.run(ctx).await;
        }
        if is_logged_in(&ctx) {
            debug!(path = %ctx.request().path(), "cache bypass for logged-in actor");
            return next.run(ctx).await;
        }

        let key = cache_key(&ctx);
        let store = self.store.clone();
        let generation = Arc::clone(&self.generation);
        let started = generation.load(Ordering::SeqCst);
        let flight_key = format!("{started}:{key}");
        let render_ctx = sanitize(&ctx);

        let entry = self
            .flights
            .resolve(&flight_key, move || async move {
                if let Some(entry) = store.get(&key).await {
                    debug!(key = %key, "cache hit");
                    return entry;
                }
                debug!(key = %key, "cache miss");
                let entry = Arc::new(capture(render_ctx, next).await);
                if !entry.is_storable() {
                    debug!(key = %key, "response forbids storing");
                } else if generation.load(Ordering::SeqCst) != started {
                    debug!(key = %key, "cache purged during render, not storing");
                } else {
                    store
                        .put(key.clone(), entry.clone(), entry.cost(), entry.ttl())
                        .await;
                    if generation.load(Ordering::SeqCst) != started {
                        store.remove(&key).await;
                    }
                }
                entry
            })
            .await;

        respond(&ctx, &entry, self.default_expiration)
    }
}

impl Middleware for CacheMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin(self.clone().serve(ctx, next))
    }
}

// Build the outbound response for `entry`, answering 304 when the request's
// validators show the client already has it.
fn respond(ctx: &Context, entry: &CacheEntry, default_expiration: u32) -> Response {
    let mut headers = entry.headers().clone();
    headers.set("ETag", entry.validator());
    headers.set("Last-Modified", httpdate::fmt_http_date(entry.created()));
    if !headers.contains("cache-control") {
        headers.set("Cache-Control", cache_control(entry.expiration(), default_expiration));
    }

    let status = if is_not_modified(ctx, entry) {
        StatusCode::NotModified
    } else {
        entry.status()
    };

    let mut response = Response::new(status);
    for (name, value) in headers.iter() {
        response.add_header(name, value);
    }
    if status == StatusCode::NotModified {
        response
    } else {
        response.body_bytes(entry.body().to_vec())
    }
}

fn cache_control(expiration: u32, default_expiration: u32) -> String {
    if expiration > 0 {
        format!("public,max-age={expiration},stale-while-revalidate={expiration}")
    } else {
        let shared = default_expiration / 3;
        format!(
            "public,max-age={default_expiration},s-max-age={shared},stale-while-revalidate={default_expiration}"
        )
    }
}

// `If-None-Match` must equal the validator exactly; otherwise an
// `If-Modified-Since` at or after the creation time counts as fresh.
// Unparseable dates are ignored.
fn is_not_modified(ctx: &Context, entry: &CacheEntry) -> bool {
    let headers = ctx.request().headers();
    if headers.get("if-none-match") == Some(entry.validator()) {
        return true;
    }
    headers
        .get("if-modified-since")
        .and_then(|value| httpdate::parse_http_date(value).ok())
        .is_some_and(|since: SystemTime| since >= entry.created())
}

/// Marks requests as force-included: logged-in actors take the caching path
/// and are rendered as anonymous.
///
/// Place it before [`CacheMiddleware`] on routes such as preview links.
pub struct ForceCache;

impl Middleware for ForceCache {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin(next.run(ctx.map_flags(|flags| flags.force_cache = true)))
    }
}

/// Per-route expiration override, in seconds.
///
/// The value becomes the captured entry's declared expiration (and store TTL)
/// and drives the synthesized `Cache-Control`.
pub struct CacheFor(pub u32);

impl Middleware for CacheFor {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let seconds = self.0;
        Box::pin(next.run(ctx.map_flags(|flags| flags.expiration = seconds)))
    }
}

/// Purges the cache after any successful unsafe request (`POST`, `PUT`,
/// `PATCH`, `DELETE`, ...), so content edits are never shadowed by stale
/// cached pages.
pub struct PurgeOnWrite {
    cache: CacheMiddleware,
}

impl PurgeOnWrite {
    pub fn new(cache: CacheMiddleware) -> Self {
        Self { cache }
    }
}

impl Middleware for PurgeOnWrite {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let cache = self.cache.clone();
        Box::pin(async move {
            let is_write = !ctx.request().method().is_safe();
            let response = next.run(ctx).await;
            if is_write && response.status().is_success() {
                cache.purge();
            }
            response
        })
    }
}

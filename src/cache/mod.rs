//! Response caching layer.
//!
//! [`CacheMiddleware`] sits in front of an arbitrary downstream handler (the
//! rest of the middleware chain) and serves repeated `GET`/`HEAD` requests
//! from memory. A request flows through it like this:
//!
//! 1. [`classify`] decides whether the request may use the cache at all and
//!    derives its key.
//! 2. [`FillCoordinator`] makes sure only one render per key runs at a time;
//!    concurrent callers wait for and share that render.
//! 3. Inside the fill, [`CacheStore`] is consulted; on a miss [`capture`]
//!    renders a sanitized copy of the request into a [`CacheEntry`], which is
//!    stored unless its `Cache-Control` forbids it.
//! 4. The middleware writes the entry's headers plus synthesized `ETag`,
//!    `Last-Modified`, and `Cache-Control`, or a bare `304` when the client's
//!    validators match.
//!
//! Companion layers: [`ForceCache`] (cache logged-in actors anonymously),
//! [`CacheFor`] (per-route expiration), and [`PurgeOnWrite`] (drop everything
//! after a successful content change).

pub mod capture;
pub mod classify;
pub mod config;
pub mod entry;
pub mod flight;
pub mod middleware;
pub mod store;

pub use config::{CacheConfig, CacheError};
pub use entry::CacheEntry;
pub use flight::FillCoordinator;
pub use middleware::{CacheFor, CacheMiddleware, ForceCache, PurgeOnWrite};
pub use store::CacheStore;

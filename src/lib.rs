//! # render-cache
//!
//! A single-flight, cost-bounded HTTP response cache for async HTTP/1.1
//! servers, packaged as middleware.
//!
//! Put [`cache::CacheMiddleware`] in front of an expensive renderer and
//! repeated `GET`/`HEAD` requests are answered from memory, concurrent misses
//! for the same resource trigger a single render, and conditional requests are
//! answered with `304 Not Modified`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use render_cache::cache::{CacheConfig, CacheMiddleware};
//! use render_cache::context::Context;
//! use render_cache::middleware::{LoggerMiddleware, Pipeline};
//! use render_cache::server::Server;
//! use render_cache::{Response, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cache = CacheMiddleware::new(&CacheConfig::default())?;
//!     let pipeline = Pipeline::new()
//!         .layer(Arc::new(LoggerMiddleware))
//!         .layer(Arc::new(cache))
//!         .endpoint(|_ctx: Context| async {
//!             Response::new(StatusCode::Ok).body("Hello, World!")
//!         });
//!
//!     let server = Server::bind("127.0.0.1:8080").await?;
//!     println!("Listening on http://127.0.0.1:8080");
//!     server.serve(pipeline).await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod context;
pub mod http;
pub mod middleware;
pub mod server;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use server::{Server, ServerError};

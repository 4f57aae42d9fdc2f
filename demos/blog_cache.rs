//! A slow "blog renderer" behind the response cache.
//!
//! ```text
//! RUST_LOG=debug cargo run --example blog_cache
//! curl -i http://127.0.0.1:8080/posts/hello          # slow, then instant
//! curl -i -X POST http://127.0.0.1:8080/posts/hello  # purges the cache
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use render_cache::cache::{CacheConfig, CacheFor, CacheMiddleware, PurgeOnWrite};
use render_cache::context::Context;
use render_cache::middleware::{LoggerMiddleware, Middleware, Next, Pipeline};
use render_cache::server::Server;
use render_cache::{Response, StatusCode};
use tracing_subscriber::EnvFilter;

const CONFIG: &str = r#"{ "enable": true, "expiration": 300, "max_cost": 5000000 }"#;

/// Stand-in for session and network detection: `Cookie: session=...` marks
/// the actor as logged in, `?as=1` asks for the alternate rendering.
struct Classify;

impl Middleware for Classify {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let logged_in = ctx
            .request()
            .headers()
            .get("cookie")
            .is_some_and(|cookie| cookie.contains("session="));
        let alternate = ctx.request().query_param("as") == Some("1");
        Box::pin(next.run(ctx.map_flags(|flags| {
            flags.logged_in = logged_in;
            flags.alternate_rendering = alternate;
        })))
    }
}

async fn render(ctx: Context) -> Response {
    tokio::time::sleep(Duration::from_millis(500)).await;
    if ctx.flags().alternate_rendering {
        return Response::new(StatusCode::Ok)
            .header("Content-Type", "application/activity+json")
            .body(format!(r#"{{"id":"{}"}}"#, ctx.request().path()));
    }
    let greeting = if ctx.flags().logged_in { "Welcome back" } else { "Hello" };
    Response::new(StatusCode::Ok)
        .header("Content-Type", "text/html; charset=utf-8")
        .body(format!("<h1>{greeting}</h1><p>{}</p>", ctx.request().path()))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = CacheConfig::from_json(CONFIG)?;
    let cache = CacheMiddleware::new(&config)?;

    let pipeline = Pipeline::new()
        .layer(Arc::new(LoggerMiddleware))
        .layer(Arc::new(Classify))
        .layer(Arc::new(PurgeOnWrite::new(cache.clone())))
        .layer(Arc::new(CacheFor(120)))
        .layer(Arc::new(cache))
        .endpoint(render);

    let server = Server::bind("127.0.0.1:8080").await?;
    tracing::info!(address = %server.local_addr(), "blog cache demo");
    server.serve(pipeline).await?;
    Ok(())
}

//! Serves a tiny rendered "page" through the caching pipeline and prints
//! what the cache does across repeated requests.
//!
//! Run with `RUST_LOG=debug cargo run --example page_cache` to see the
//! hit/miss log lines alongside the request log.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use recache::cache::{CacheMiddleware, Config, InMemoryStore, Store, StoreMiddleware};
use recache::middleware::{HeartbeatMiddleware, LoggerMiddleware, Pipeline};
use recache::{Context, Request, Response, StatusCode};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let store: Arc<dyn Store> = Arc::new(InMemoryStore::with_janitor(
        Duration::from_secs(5),
        Duration::from_secs(1),
    ));

    let renders = Arc::new(AtomicUsize::new(0));
    let counter = renders.clone();

    let pipeline = Pipeline::new()
        .wrap(LoggerMiddleware)
        .wrap(HeartbeatMiddleware::new("/ping"))
        .wrap(StoreMiddleware::new(store.clone()))
        .wrap(CacheMiddleware::page(
            store,
            Config::default().expire(Duration::from_secs(5)),
        ))
        .handle(move |ctx: Context| {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Response::new(StatusCode::Ok)
                    .header("Content-Type", "text/html")
                    .body(format!(
                        "<h1>{} (render #{n})</h1>",
                        ctx.request().path()
                    ))
            }
        });

    for target in ["/items/42", "/items/42", "/items/7", "/ping", "/items/42"] {
        let raw = format!("GET {target} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let (request, _) = Request::parse(raw.as_bytes()).unwrap();
        let response = pipeline.dispatch(request).await;
        println!(
            "GET {target} -> {} {:?}",
            response.status(),
            String::from_utf8_lossy(response.body_slice())
        );
    }

    println!(
        "handler rendered {} pages for 5 requests",
        renders.load(Ordering::SeqCst)
    );
}

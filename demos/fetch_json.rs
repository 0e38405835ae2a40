//! Fetches a list of URLs and prints what each one served.
//!
//! ```sh
//! RUST_LOG=info cargo run --example fetch_json -- https://httpbin.org/json https://example.com
//! ```

use probe_core::prelude::*;
use scraper::Selector;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ProbeError> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut urls: Vec<String> = std::env::args().skip(1).collect();
    if urls.is_empty() {
        urls = vec![
            "https://httpbin.org/json".to_string(),
            "https://httpbin.org/html".to_string(),
            "https://httpbin.org/status/404".to_string(),
        ];
    }

    let handlers = HandlerSet::builder()
        .generate_urls(move |sink| {
            let urls = urls.clone();
            async move {
                for url in urls {
                    sink.emit(url).await?;
                }
                anyhow::Ok(())
            }
        })
        .on_response(|meta| println!("{} -> {}", meta.url, meta.status))
        .on_json(|meta, document| {
            let keys: Vec<_> = document
                .as_object()
                .map(|object| object.keys().cloned().collect())
                .unwrap_or_default();
            println!("{}: JSON with keys {:?}", meta.url, keys);
        })
        .on_markup(|meta, document| {
            let title = Selector::parse("title").ok().and_then(|selector| {
                document
                    .select(&selector)
                    .next()
                    .map(|title| title.text().collect::<String>())
            });
            println!("{}: HTML titled {:?}", meta.url, title.unwrap_or_default());
        })
        .build()?;

    let summary = ProbeBuilder::new(handlers)
        .concurrency(8)
        .poll_interval(Duration::from_millis(500))
        .handle_ctrl_c(true)
        .build()?
        .run()
        .await?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

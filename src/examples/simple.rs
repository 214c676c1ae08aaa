//! Simple example of using smart-proxy-pool as reqwest middleware.

use reqwest_middleware::ClientBuilder;
use smart_proxy_pool::{ConsumerHint, ProxyPoolConfig, ProxyPoolMiddleware, SourceRegistry};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("Initializing proxy pool...");

    let mut sources = SourceRegistry::builtin();
    // these tend to answer 403 to scripted clients
    sources.disable_often_blocked();

    let config = ProxyPoolConfig::builder()
        .sources(sources)
        .min_working_proxies(2)
        .validation_timeout(Duration::from_secs(5))
        .cache_file("simple-proxies.json")
        .retry_count(2)
        .build();

    let proxy_pool = ProxyPoolMiddleware::new(config).await.with_hint(ConsumerHint::Ssl);
    let stats = proxy_pool.pool().get_stats();
    println!("Pool ready: {} SSL, {} HTTP", stats.ssl_count, stats.http_count);

    let client = ClientBuilder::new(reqwest::Client::new())
        .with(proxy_pool)
        .build();

    println!("Sending request...");
    let response = client.get("https://httpbin.org/ip").send().await?;

    println!("Status: {}", response.status());
    println!("Response: {}", response.text().await?);

    Ok(())
}

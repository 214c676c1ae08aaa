//! Middleware implementation for reqwest.

use crate::config::ProxyPoolConfig;
use crate::error::NoProxyAvailable;
use crate::pool::ProxyPool;
use crate::rotator::ConsumerHint;

use anyhow::anyhow;
use async_trait::async_trait;
use log::{info, warn};
use reqwest_middleware::{Error, Middleware, Next, Result};
use std::sync::Arc;

/// Middleware that routes each request through the next pooled proxy.
///
/// A proxy whose request fails at the transport level is marked dead and the
/// request is retried with the next one, up to `retry_count` times.
#[derive(Clone)]
pub struct ProxyPoolMiddleware {
    pool: Arc<ProxyPool>,
    hint: Option<ConsumerHint>,
}

impl ProxyPoolMiddleware {
    /// Create a pool from `config` and bootstrap it non-interactively.
    pub async fn new(config: ProxyPoolConfig) -> Self {
        let pool = ProxyPool::new(config);
        let report = pool.bootstrap(None).await;
        info!("Proxy pool initialized: {}", report);
        if report.working_proxies == 0 {
            warn!("No working proxies available in pool");
        }
        Self::from_pool(pool)
    }

    /// Wrap an already bootstrapped pool.
    pub fn from_pool(pool: Arc<ProxyPool>) -> Self {
        Self { pool, hint: None }
    }

    /// Draw proxies from one pool only.
    pub fn with_hint(mut self, hint: ConsumerHint) -> Self {
        self.hint = Some(hint);
        self
    }

    pub fn pool(&self) -> &Arc<ProxyPool> {
        &self.pool
    }
}

#[async_trait]
impl Middleware for ProxyPoolMiddleware {
    async fn handle(
        &self,
        req: reqwest::Request,
        _extensions: &mut http::Extensions,
        _next: Next<'_>,
    ) -> Result<reqwest::Response> {
        let max_retries = self.pool.config.retry_count;
        let mut retry_count = 0;

        loop {
            let Some(endpoint) = self.pool.get_next(self.hint) else {
                let stats = self.pool.get_stats();
                warn!(
                    "No proxy available. SSL: {}, HTTP: {}, dead: {}",
                    stats.ssl_count, stats.http_count, stats.dead_count
                );
                return Err(Error::Middleware(anyhow!(NoProxyAvailable)));
            };

            let proxied_request = req.try_clone().ok_or_else(|| {
                Error::Middleware(anyhow!(
                    "Request object is not cloneable. Are you passing a streaming body?"
                ))
            })?;

            info!("Using proxy: {} (attempt {})", endpoint, retry_count + 1);

            let client = match endpoint.to_reqwest_proxy().and_then(|proxy| {
                reqwest::Client::builder()
                    .proxy(proxy)
                    .timeout(self.pool.config.request_timeout)
                    .build()
            }) {
                Ok(client) => client,
                Err(e) => {
                    warn!("Failed to build client with proxy {}: {}", endpoint, e);
                    self.pool.mark_dead(&endpoint).await;
                    retry_count += 1;
                    if retry_count > max_retries {
                        return Err(Error::Reqwest(e));
                    }
                    continue;
                }
            };

            match client.execute(proxied_request).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    warn!(
                        "Request failed with proxy {} (attempt {}): {}",
                        endpoint,
                        retry_count + 1,
                        err
                    );
                    self.pool.mark_dead(&endpoint).await;

                    retry_count += 1;
                    if retry_count > max_retries {
                        return Err(Error::Reqwest(err));
                    }
                }
            }
        }
    }
}

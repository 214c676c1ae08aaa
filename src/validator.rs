//! Concurrent liveness and capability checks.

use crate::config::ProxyPoolConfig;
use crate::proxy::{CapabilityClass, Endpoint};
use crate::utils;

use async_trait::async_trait;
use futures::future;
use log::{debug, info};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Certificate handling for an HTTPS probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    /// Verify the target's certificate chain.
    Strict,
    /// Accept any certificate.
    Relaxed,
}

/// A single request through a candidate proxy.
#[async_trait]
pub trait ProxyProbe: Send + Sync {
    /// GET `target` through `endpoint`. Returns true only on HTTP 200; every
    /// error, including timeouts, is a plain `false`.
    async fn probe(&self, endpoint: &Endpoint, target: &str, tls: TlsMode) -> bool;
}

/// Probe backed by a fresh reqwest client per request.
#[derive(Debug, Clone)]
pub struct ReqwestProbe {
    timeout: Duration,
    user_agent: String,
}

impl ReqwestProbe {
    pub fn new(timeout: Duration, user_agent: impl Into<String>) -> Self {
        Self {
            timeout,
            user_agent: user_agent.into(),
        }
    }
}

#[async_trait]
impl ProxyProbe for ReqwestProbe {
    async fn probe(&self, endpoint: &Endpoint, target: &str, tls: TlsMode) -> bool {
        let proxy = match endpoint.to_reqwest_proxy() {
            Ok(proxy) => proxy,
            Err(e) => {
                debug!("cannot parse proxy {}: {}", endpoint, e);
                return false;
            }
        };

        let client = match reqwest::Client::builder()
            .proxy(proxy)
            .timeout(self.timeout)
            .danger_accept_invalid_certs(tls == TlsMode::Relaxed)
            .pool_max_idle_per_host(0)
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                debug!("cannot build client for {}: {}", endpoint, e);
                return false;
            }
        };

        match client
            .get(target)
            .header("User-Agent", self.user_agent.as_str())
            .send()
            .await
        {
            Ok(resp) => resp.status() == reqwest::StatusCode::OK,
            Err(e) => {
                debug!("probe {} via {} failed: {}", target, endpoint, e);
                false
            }
        }
    }
}

/// Working endpoints found by one validation pass, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub ssl: Vec<Endpoint>,
    pub http: Vec<Endpoint>,
}

impl ValidationOutcome {
    pub fn total(&self) -> usize {
        self.ssl.len() + self.http.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Append another outcome, skipping endpoints already present.
    pub fn merge(&mut self, other: ValidationOutcome) {
        for endpoint in other.ssl {
            if !self.ssl.contains(&endpoint) {
                self.ssl.push(endpoint);
            }
        }
        for endpoint in other.http {
            if !self.http.contains(&endpoint) {
                self.http.push(endpoint);
            }
        }
    }
}

/// Classifies candidates as SSL-working, HTTP-working or dead.
pub struct Validator {
    probe: Arc<dyn ProxyProbe>,
    ssl_only: bool,
    ssl_test_urls: Vec<String>,
    http_test_urls: Vec<String>,
    /// Endpoints that failed during this run.
    dead: Mutex<HashSet<Endpoint>>,
}

impl Validator {
    pub fn new(config: &ProxyPoolConfig, probe: Arc<dyn ProxyProbe>) -> Self {
        Self {
            probe,
            ssl_only: config.ssl_only,
            ssl_test_urls: config.ssl_test_urls.clone(),
            http_test_urls: config.http_test_urls.clone(),
            dead: Mutex::new(HashSet::new()),
        }
    }

    /// Probe every candidate concurrently and wait for all of them.
    ///
    /// SSL-port candidates get the HTTPS check, the rest the plaintext check.
    /// In SSL-only mode the rest are skipped and left out of both the result
    /// and the dead set.
    pub async fn validate(&self, endpoints: &[Endpoint]) -> ValidationOutcome {
        let candidates = utils::dedup_preserving_order(endpoints.iter().cloned());
        if candidates.is_empty() {
            return ValidationOutcome::default();
        }

        let checks = candidates.into_iter().filter_map(|endpoint| {
            let class = if endpoint.presumed_ssl() {
                CapabilityClass::Ssl
            } else if self.ssl_only {
                return None;
            } else {
                CapabilityClass::Http
            };
            Some(async move {
                let working = match class {
                    CapabilityClass::Ssl => self.check_ssl(&endpoint).await,
                    CapabilityClass::Http => self.check_http(&endpoint).await,
                };
                (endpoint, class, working)
            })
        });

        // Run all probes concurrently
        let results = future::join_all(checks).await;
        let tested = results.len();

        let mut outcome = ValidationOutcome::default();
        {
            let mut dead = self.dead.lock();
            for (endpoint, class, working) in results {
                if working {
                    debug!("{} ({}) is working", endpoint, class);
                    dead.remove(&endpoint);
                    match class {
                        CapabilityClass::Ssl => outcome.ssl.push(endpoint),
                        CapabilityClass::Http => outcome.http.push(endpoint),
                    }
                } else {
                    debug!("{} ({}) failed", endpoint, class);
                    dead.insert(endpoint);
                }
            }
        }

        info!(
            "Validation completed: {}/{} working ({} SSL, {} HTTP)",
            outcome.total(),
            tested,
            outcome.ssl.len(),
            outcome.http.len()
        );
        outcome
    }

    /// Strict certificate pass first, relaxed pass only if strict failed.
    async fn check_ssl(&self, endpoint: &Endpoint) -> bool {
        if self.first_success(endpoint, &self.ssl_test_urls, TlsMode::Strict).await {
            return true;
        }
        let relaxed = self
            .first_success(endpoint, &self.ssl_test_urls, TlsMode::Relaxed)
            .await;
        if relaxed {
            debug!("{} passed HTTPS only without certificate verification", endpoint);
        }
        relaxed
    }

    async fn check_http(&self, endpoint: &Endpoint) -> bool {
        self.first_success(endpoint, &self.http_test_urls, TlsMode::Strict)
            .await
    }

    async fn first_success(&self, endpoint: &Endpoint, targets: &[String], tls: TlsMode) -> bool {
        for target in targets {
            if self.probe.probe(endpoint, target, tls).await {
                return true;
            }
        }
        false
    }

    /// Remember an endpoint as dead for the rest of the run.
    pub fn record_dead(&self, endpoint: &Endpoint) {
        self.dead.lock().insert(endpoint.clone());
    }

    pub fn is_dead(&self, endpoint: &Endpoint) -> bool {
        self.dead.lock().contains(endpoint)
    }

    pub fn dead_count(&self) -> usize {
        self.dead.lock().len()
    }
}

//! Round-robin rotation over the SSL and HTTP pools.

use crate::proxy::{CapabilityClass, Endpoint};

use log::info;
use serde::Serialize;
use std::str::FromStr;

/// What the caller is going to do with the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerHint {
    /// Target sites need TLS tunnelled through the proxy.
    Ssl,
    /// Target sites are fetched over plain HTTP.
    Http,
}

impl FromStr for ConsumerHint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ssl" | "tls" | "https" => Ok(Self::Ssl),
            "http" | "plain" => Ok(Self::Http),
            other => Err(format!("unknown consumer hint: {other}")),
        }
    }
}

/// Snapshot of pool sizes and cursors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub ssl_count: usize,
    pub http_count: usize,
    pub dead_count: usize,
    pub ssl_cursor: usize,
    pub http_cursor: usize,
}

impl PoolStats {
    pub fn total(&self) -> usize {
        self.ssl_count + self.http_count
    }
}

#[derive(Debug, Default)]
struct Pool {
    endpoints: Vec<Endpoint>,
    cursor: usize,
}

impl Pool {
    fn next(&mut self) -> Option<Endpoint> {
        let endpoint = self.endpoints.get(self.cursor)?.clone();
        self.cursor = (self.cursor + 1) % self.endpoints.len();
        Some(endpoint)
    }

    fn add(&mut self, endpoints: impl IntoIterator<Item = Endpoint>) -> usize {
        let before = self.endpoints.len();
        for endpoint in endpoints {
            if !self.endpoints.contains(&endpoint) {
                self.endpoints.push(endpoint);
            }
        }
        self.endpoints.len() - before
    }

    fn remove(&mut self, endpoint: &Endpoint) -> bool {
        let Some(idx) = self.endpoints.iter().position(|e| e == endpoint) else {
            return false;
        };
        self.endpoints.remove(idx);
        if self.cursor >= self.endpoints.len() {
            self.cursor = 0;
        }
        true
    }
}

/// Dispenses proxies in strict insertion order, one cursor per pool.
///
/// Not synchronized; the owner serializes access.
#[derive(Debug, Default)]
pub struct ProxyRotator {
    ssl: Pool,
    http: Pool,
}

impl ProxyRotator {
    pub fn new() -> Self {
        Self::default()
    }

    fn pool(&self, class: CapabilityClass) -> &Pool {
        match class {
            CapabilityClass::Ssl => &self.ssl,
            CapabilityClass::Http => &self.http,
        }
    }

    fn pool_mut(&mut self, class: CapabilityClass) -> &mut Pool {
        match class {
            CapabilityClass::Ssl => &mut self.ssl,
            CapabilityClass::Http => &mut self.http,
        }
    }

    /// Next endpoint of `class`, or `None` if that pool is empty.
    pub fn next(&mut self, class: CapabilityClass) -> Option<Endpoint> {
        self.pool_mut(class).next()
    }

    /// Next endpoint for a consumer. Without a hint the SSL pool is preferred
    /// and the HTTP pool used only when it is empty.
    pub fn next_for(&mut self, hint: Option<ConsumerHint>) -> Option<Endpoint> {
        match hint {
            Some(ConsumerHint::Ssl) => self.next(CapabilityClass::Ssl),
            Some(ConsumerHint::Http) => self.next(CapabilityClass::Http),
            None => self
                .next(CapabilityClass::Ssl)
                .or_else(|| self.next(CapabilityClass::Http)),
        }
    }

    /// Append endpoints not yet in the `class` pool. Returns how many were added.
    pub fn add(&mut self, endpoints: impl IntoIterator<Item = Endpoint>, class: CapabilityClass) -> usize {
        self.pool_mut(class).add(endpoints)
    }

    /// Remove an endpoint from every pool holding it.
    pub fn mark_dead(&mut self, endpoint: &Endpoint) -> bool {
        let mut removed = false;
        for class in [CapabilityClass::Ssl, CapabilityClass::Http] {
            let pool = self.pool_mut(class);
            if pool.remove(endpoint) {
                removed = true;
                info!(
                    "Marked {} as dead ({} pool: {} remaining)",
                    endpoint,
                    class,
                    pool.endpoints.len()
                );
            }
        }
        removed
    }

    pub fn contains(&self, endpoint: &Endpoint) -> bool {
        self.ssl.endpoints.contains(endpoint) || self.http.endpoints.contains(endpoint)
    }

    pub fn endpoints(&self, class: CapabilityClass) -> &[Endpoint] {
        &self.pool(class).endpoints
    }

    pub fn len(&self) -> usize {
        self.ssl.endpoints.len() + self.http.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sizes and cursors; `dead_count` is left for the owner to fill in.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            ssl_count: self.ssl.endpoints.len(),
            http_count: self.http.endpoints.len(),
            dead_count: 0,
            ssl_cursor: self.ssl.cursor,
            http_cursor: self.http.cursor,
        }
    }
}

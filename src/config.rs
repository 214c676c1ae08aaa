//! Configuration for the proxy pool.

use crate::sources::SourceRegistry;

use std::path::PathBuf;
use std::time::Duration;

/// Default HTTPS echo targets for SSL probing, tried in order.
pub const DEFAULT_SSL_TEST_URLS: [&str; 4] = [
    "https://icanhazip.com",
    "https://checkip.amazonaws.com",
    "https://ipinfo.io/ip",
    "https://httpbin.org/ip",
];

/// Default plaintext echo targets for HTTP probing, tried in order.
pub const DEFAULT_HTTP_TEST_URLS: [&str; 4] = [
    "http://icanhazip.com",
    "http://checkip.amazonaws.com",
    "http://ipinfo.io/ip",
    "http://httpbin.org/ip",
];

/// Settings for the background maintenance task.
#[derive(Debug, Clone, PartialEq)]
pub struct MaintenanceConfig {
    /// Sleep between cycles.
    pub interval: Duration,
    /// Extra sleep after a cycle that failed to add anything.
    pub error_backoff: Duration,
    /// The task stops after this many cycles.
    pub max_cycles: usize,
    /// A fetch is triggered when the pool holds fewer proxies than this.
    pub min_count: usize,
    /// Desired pool size, reported in logs.
    pub target_count: usize,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            error_backoff: Duration::from_secs(60),
            max_cycles: 10,
            min_count: 8,
            target_count: 15,
        }
    }
}

/// Configuration for the proxy pool.
#[derive(Debug, Clone)]
pub struct ProxyPoolConfig {
    /// Sources to fetch proxy lists from, in fetch order.
    pub sources: SourceRegistry,
    /// Working proxies needed for the pool to count as ready.
    pub min_working_proxies: usize,
    /// Fetching stops once this many working proxies were found.
    pub large_pool_threshold: usize,
    /// Timeout of each probe request.
    pub validation_timeout: Duration,
    /// Timeout of each source page request.
    pub source_timeout: Duration,
    /// Only test proxies on SSL-capable ports.
    pub ssl_only: bool,
    /// Upper bound of pages fetched from a paginated source.
    pub max_pages_per_source: usize,
    /// Wait between two pages of a paginated source.
    pub page_delay: Duration,
    /// Location of the JSON state file.
    pub cache_file: PathBuf,
    /// HTTPS targets used for SSL probing.
    pub ssl_test_urls: Vec<String>,
    /// Plaintext targets used for HTTP probing.
    pub http_test_urls: Vec<String>,
    /// User-Agent sent with probe requests.
    pub user_agent: String,
    /// Concurrency hint. Probes are not capped by it.
    pub max_workers: usize,
    /// Number of times to retry a request with different proxies.
    pub retry_count: usize,
    /// Timeout for requests routed through the middleware.
    pub request_timeout: Duration,
    /// Background maintenance settings.
    pub maintenance: MaintenanceConfig,
}

impl ProxyPoolConfig {
    /// Create a new configuration builder.
    pub fn builder() -> ProxyPoolConfigBuilder {
        ProxyPoolConfigBuilder::new()
    }
}

impl Default for ProxyPoolConfig {
    fn default() -> Self {
        ProxyPoolConfigBuilder::new().build()
    }
}

/// Builder for `ProxyPoolConfig`.
pub struct ProxyPoolConfigBuilder {
    sources: Option<SourceRegistry>,
    min_working_proxies: Option<usize>,
    large_pool_threshold: Option<usize>,
    validation_timeout: Option<Duration>,
    source_timeout: Option<Duration>,
    ssl_only: Option<bool>,
    max_pages_per_source: Option<usize>,
    page_delay: Option<Duration>,
    cache_file: Option<PathBuf>,
    ssl_test_urls: Option<Vec<String>>,
    http_test_urls: Option<Vec<String>>,
    user_agent: Option<String>,
    max_workers: Option<usize>,
    retry_count: Option<usize>,
    request_timeout: Option<Duration>,
    maintenance: Option<MaintenanceConfig>,
}

impl ProxyPoolConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self {
            sources: None,
            min_working_proxies: None,
            large_pool_threshold: None,
            validation_timeout: None,
            source_timeout: None,
            ssl_only: None,
            max_pages_per_source: None,
            page_delay: None,
            cache_file: None,
            ssl_test_urls: None,
            http_test_urls: None,
            user_agent: None,
            max_workers: None,
            retry_count: None,
            request_timeout: None,
            maintenance: None,
        }
    }

    /// Set the source registry. Defaults to [`SourceRegistry::builtin`].
    pub fn sources(mut self, sources: SourceRegistry) -> Self {
        self.sources = Some(sources);
        self
    }

    /// Set the minimum number of working proxies.
    pub fn min_working_proxies(mut self, count: usize) -> Self {
        self.min_working_proxies = Some(count);
        self
    }

    /// Set the pool size at which fetching stops early.
    pub fn large_pool_threshold(mut self, count: usize) -> Self {
        self.large_pool_threshold = Some(count);
        self
    }

    /// Set the per-probe timeout.
    pub fn validation_timeout(mut self, timeout: Duration) -> Self {
        self.validation_timeout = Some(timeout);
        self
    }

    /// Set the per-page timeout for source requests.
    pub fn source_timeout(mut self, timeout: Duration) -> Self {
        self.source_timeout = Some(timeout);
        self
    }

    /// Restrict validation to SSL-capable ports.
    pub fn ssl_only(mut self, ssl_only: bool) -> Self {
        self.ssl_only = Some(ssl_only);
        self
    }

    /// Set the maximum pages fetched from paginated sources.
    pub fn max_pages_per_source(mut self, pages: usize) -> Self {
        self.max_pages_per_source = Some(pages);
        self
    }

    /// Set the delay between pages of a paginated source.
    pub fn page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = Some(delay);
        self
    }

    /// Set the location of the state file.
    pub fn cache_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_file = Some(path.into());
        self
    }

    /// Set the HTTPS echo targets.
    pub fn ssl_test_urls(mut self, urls: Vec<impl Into<String>>) -> Self {
        self.ssl_test_urls = Some(urls.into_iter().map(Into::into).collect());
        self
    }

    /// Set the plaintext echo targets.
    pub fn http_test_urls(mut self, urls: Vec<impl Into<String>>) -> Self {
        self.http_test_urls = Some(urls.into_iter().map(Into::into).collect());
        self
    }

    /// Set the User-Agent used by probes.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Set the concurrency hint.
    pub fn max_workers(mut self, workers: usize) -> Self {
        self.max_workers = Some(workers);
        self
    }

    /// Set the number of times to retry a request with different proxies.
    pub fn retry_count(mut self, count: usize) -> Self {
        self.retry_count = Some(count);
        self
    }

    /// Set the timeout for proxied requests.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set the background maintenance settings.
    pub fn maintenance(mut self, maintenance: MaintenanceConfig) -> Self {
        self.maintenance = Some(maintenance);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ProxyPoolConfig {
        ProxyPoolConfig {
            sources: self.sources.unwrap_or_else(SourceRegistry::builtin),
            min_working_proxies: self.min_working_proxies.unwrap_or(3),
            large_pool_threshold: self.large_pool_threshold.unwrap_or(20),
            validation_timeout: self.validation_timeout.unwrap_or(Duration::from_secs(15)),
            source_timeout: self.source_timeout.unwrap_or(Duration::from_secs(30)),
            ssl_only: self.ssl_only.unwrap_or(true),
            max_pages_per_source: self.max_pages_per_source.unwrap_or(10),
            page_delay: self.page_delay.unwrap_or(Duration::from_secs(2)),
            cache_file: self.cache_file.unwrap_or_else(|| PathBuf::from("saved-proxies.json")),
            ssl_test_urls: self
                .ssl_test_urls
                .unwrap_or_else(|| DEFAULT_SSL_TEST_URLS.iter().map(|u| u.to_string()).collect()),
            http_test_urls: self
                .http_test_urls
                .unwrap_or_else(|| DEFAULT_HTTP_TEST_URLS.iter().map(|u| u.to_string()).collect()),
            user_agent: self.user_agent.unwrap_or_else(|| {
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string()
            }),
            max_workers: self.max_workers.unwrap_or(10),
            retry_count: self.retry_count.unwrap_or(3),
            request_timeout: self.request_timeout.unwrap_or(Duration::from_secs(30)),
            maintenance: self.maintenance.unwrap_or_default(),
        }
    }
}

impl Default for ProxyPoolConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProxyPoolConfig::default();
        assert_eq!(config.min_working_proxies, 3);
        assert_eq!(config.large_pool_threshold, 20);
        assert_eq!(config.validation_timeout, Duration::from_secs(15));
        assert!(config.ssl_only);
        assert_eq!(config.max_pages_per_source, 10);
        assert_eq!(config.cache_file, PathBuf::from("saved-proxies.json"));
        assert_eq!(config.ssl_test_urls.len(), 4);
        assert!(config.http_test_urls.iter().all(|u| u.starts_with("http://")));
        assert_eq!(config.sources.len(), 9);
        assert_eq!(config.maintenance.max_cycles, 10);
    }

    #[test]
    fn test_threshold_and_minimum_are_independent() {
        let config = ProxyPoolConfig::builder()
            .min_working_proxies(50)
            .build();
        assert_eq!(config.min_working_proxies, 50);
        assert_eq!(config.large_pool_threshold, 20);
    }
}

//! Source-by-source acquisition of new working proxies.

use crate::config::ProxyPoolConfig;
use crate::error::FetchError;
use crate::fetch::PageFetcher;
use crate::proxy::Endpoint;
use crate::sources::{SourceDescriptor, SourceRegistry};
use crate::utils;
use crate::validator::{ValidationOutcome, Validator};

use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;

/// Result of one pass over the enabled sources.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    /// Working proxies found, in discovery order.
    pub working: ValidationOutcome,
    /// Sources that were attempted, including failed ones.
    pub sources_tested: usize,
}

/// Walks the enabled sources in order and validates what each one yields.
pub struct Fetcher {
    page_fetcher: Arc<dyn PageFetcher>,
    min_working_proxies: usize,
    large_pool_threshold: usize,
    source_timeout: Duration,
    max_pages_per_source: usize,
    page_delay: Duration,
}

impl Fetcher {
    pub fn new(config: &ProxyPoolConfig, page_fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            page_fetcher,
            min_working_proxies: config.min_working_proxies,
            large_pool_threshold: config.large_pool_threshold,
            source_timeout: config.source_timeout,
            max_pages_per_source: config.max_pages_per_source,
            page_delay: config.page_delay,
        }
    }

    /// Fetch, parse and validate each enabled source in registry order.
    ///
    /// Candidates in `known` (already pooled) are not probed again. Stops as
    /// soon as the working total reaches the large-pool threshold.
    pub async fn fetch_all(
        &self,
        sources: &SourceRegistry,
        validator: &Validator,
        known: &HashSet<Endpoint>,
    ) -> FetchOutcome {
        info!("Fetching new proxies from {} sources", sources.enabled().count());

        let mut outcome = FetchOutcome::default();
        let mut seen: HashSet<Endpoint> = known.clone();

        for source in sources.enabled() {
            outcome.sources_tested += 1;

            let candidates = match self.collect(source).await {
                Ok(candidates) => candidates,
                Err(e) if e.is_blocked() => {
                    warn!("Source blocked: {} ({})", source.display_name, e);
                    continue;
                }
                Err(e) => {
                    warn!("Failed to fetch proxies from {}: {}", source.display_name, e);
                    continue;
                }
            };

            let fresh: Vec<Endpoint> = candidates
                .into_iter()
                .filter(|endpoint| seen.insert(endpoint.clone()))
                .collect();
            if fresh.is_empty() {
                info!("No new proxies from {}", source.display_name);
                continue;
            }
            info!("Fetched {} new proxies from {}", fresh.len(), source.display_name);

            let working = validator.validate(&fresh).await;
            info!(
                "{}: {}/{} working",
                source.display_name,
                working.total(),
                fresh.len()
            );
            outcome.working.merge(working);

            let total = outcome.working.total();
            if total >= self.min_working_proxies {
                info!(
                    "Found {} working proxies (minimum {} reached), continuing to build pool",
                    total, self.min_working_proxies
                );
            }
            if total >= self.large_pool_threshold {
                info!("Found {} working proxies (large pool achieved), stopping", total);
                break;
            }
        }

        info!(
            "Fetch finished: {} working proxies from {} sources tested",
            outcome.working.total(),
            outcome.sources_tested
        );
        outcome
    }

    /// Candidates published by one source, deduplicated.
    async fn collect(&self, source: &SourceDescriptor) -> Result<Vec<Endpoint>, FetchError> {
        if !source.pre_request_delay.is_zero() {
            time::sleep(source.pre_request_delay).await;
        }

        let content = self
            .page_fetcher
            .fetch(&source.url, &source.headers, self.source_timeout)
            .await?;
        let first_page = source.format.parse(&content);

        if !source.format.is_paginated() {
            return Ok(utils::dedup_preserving_order(first_page));
        }
        Ok(self.collect_pages(source, first_page).await)
    }

    /// Follow `page=N` URLs until a page adds nothing new, the source pushes
    /// back, or the page limit is reached.
    async fn collect_pages(&self, source: &SourceDescriptor, first_page: Vec<Endpoint>) -> Vec<Endpoint> {
        let mut all = utils::dedup_preserving_order(first_page);
        let mut seen: HashSet<Endpoint> = all.iter().cloned().collect();
        debug!("{} page 1: {} proxies", source.display_name, all.len());

        for page in 2..=self.max_pages_per_source {
            if !self.page_delay.is_zero() {
                time::sleep(self.page_delay).await;
            }

            let url = utils::page_url(&source.url, page);
            let content = match self
                .page_fetcher
                .fetch(&url, &source.headers, self.source_timeout)
                .await
            {
                Ok(content) => content,
                Err(e) if e.is_blocked() => {
                    info!("Rate limited on page {} of {}, stopping pagination", page, source.display_name);
                    break;
                }
                Err(e) => {
                    warn!("Failed to fetch page {} of {}: {}", page, source.display_name, e);
                    break;
                }
            };

            let new: Vec<Endpoint> = source
                .format
                .parse(&content)
                .into_iter()
                .filter(|endpoint| seen.insert(endpoint.clone()))
                .collect();
            if new.is_empty() {
                debug!("No new proxies on page {} of {}, stopping pagination", page, source.display_name);
                break;
            }
            debug!("{} page {}: {} new proxies", source.display_name, page, new.len());
            all.extend(new);
        }

        info!("{}: {} unique proxies across pages", source.display_name, all.len());
        all
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::parsers::SourceFormat;
    use crate::validator::tests::StaticProbe;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    pub(crate) enum Page {
        Body(String),
        Blocked,
    }

    /// In-memory page fetcher keyed by URL; unknown URLs answer 404.
    #[derive(Default)]
    pub(crate) struct StaticPages {
        pub pages: HashMap<String, Page>,
        pub requested: Mutex<Vec<String>>,
    }

    impl StaticPages {
        pub fn with_body(mut self, url: &str, body: impl Into<String>) -> Self {
            self.pages.insert(url.to_string(), Page::Body(body.into()));
            self
        }

        pub fn with_blocked(mut self, url: &str) -> Self {
            self.pages.insert(url.to_string(), Page::Blocked);
            self
        }

        pub fn requested(&self) -> Vec<String> {
            self.requested.lock().clone()
        }
    }

    #[async_trait]
    impl PageFetcher for StaticPages {
        async fn fetch(
            &self,
            url: &str,
            _headers: &[(String, String)],
            _timeout: Duration,
        ) -> Result<String, FetchError> {
            self.requested.lock().push(url.to_string());
            match self.pages.get(url) {
                Some(Page::Body(body)) => Ok(body.clone()),
                Some(Page::Blocked) => Err(FetchError::Blocked {
                    url: url.to_string(),
                    status: 403,
                }),
                None => Err(FetchError::Status {
                    url: url.to_string(),
                    status: 404,
                }),
            }
        }
    }

    /// `count` SSL-port endpoints unique to `group`.
    pub(crate) fn listing(group: u8, count: usize) -> String {
        (0..count)
            .map(|i| format!("10.{}.{}.{}:8080", group, i / 250, i % 250 + 1))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn text_source(key: &str) -> SourceDescriptor {
        SourceDescriptor::new(key, key.to_uppercase(), format!("mem://{key}"), SourceFormat::PlainText)
    }

    fn table(rows: &[&str]) -> String {
        let body: String = rows
            .iter()
            .map(|row| {
                let (ip, port) = row.split_once(':').unwrap();
                format!("<tr><td>{ip}</td><td>{port}</td></tr>")
            })
            .collect();
        format!("<table><tr><th>IP</th><th>Port</th></tr>{body}</table>")
    }

    fn config() -> ProxyPoolConfig {
        ProxyPoolConfig::builder()
            .page_delay(Duration::ZERO)
            .max_pages_per_source(10)
            .build()
    }

    fn validator(config: &ProxyPoolConfig) -> Validator {
        Validator::new(config, Arc::new(StaticProbe::all_working()))
    }

    #[tokio::test]
    async fn test_stops_after_large_pool_threshold() {
        let config = config();
        let pages = Arc::new(
            StaticPages::default()
                .with_body("mem://a", listing(1, 12))
                .with_body("mem://b", listing(2, 15))
                .with_body("mem://c", listing(3, 5)),
        );
        let registry = SourceRegistry::new()
            .with(text_source("a"))
            .with(text_source("b"))
            .with(text_source("c"));
        let fetcher = Fetcher::new(&config, pages.clone());

        let outcome = fetcher
            .fetch_all(&registry, &validator(&config), &HashSet::new())
            .await;

        assert_eq!(outcome.working.total(), 27);
        assert_eq!(outcome.sources_tested, 2);
        assert_eq!(pages.requested(), vec!["mem://a", "mem://b"]);
    }

    #[tokio::test]
    async fn test_reaching_minimum_does_not_stop() {
        let config = config();
        let pages = Arc::new(
            StaticPages::default()
                .with_body("mem://a", listing(1, 3))
                .with_body("mem://b", listing(2, 4)),
        );
        let registry = SourceRegistry::new().with(text_source("a")).with(text_source("b"));
        let fetcher = Fetcher::new(&config, pages.clone());

        let outcome = fetcher
            .fetch_all(&registry, &validator(&config), &HashSet::new())
            .await;

        assert_eq!(outcome.working.total(), 7);
        assert_eq!(pages.requested().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_and_disabled_sources_are_skipped() {
        let config = config();
        let pages = Arc::new(
            StaticPages::default()
                .with_blocked("mem://blocked")
                .with_body("mem://good", listing(4, 2))
                .with_body("mem://off", listing(5, 2)),
        );
        let registry = SourceRegistry::new()
            .with(text_source("blocked"))
            .with(text_source("missing"))
            .with(text_source("off").disabled())
            .with(text_source("good"));
        let fetcher = Fetcher::new(&config, pages.clone());

        let outcome = fetcher
            .fetch_all(&registry, &validator(&config), &HashSet::new())
            .await;

        assert_eq!(outcome.working.total(), 2);
        assert_eq!(outcome.sources_tested, 3);
        assert!(!pages.requested().contains(&"mem://off".to_string()));
    }

    #[tokio::test]
    async fn test_known_endpoints_are_not_probed_again() {
        let config = config();
        let probe = Arc::new(StaticProbe::all_working());
        let validator = Validator::new(&config, probe.clone());
        let pages = Arc::new(
            StaticPages::default()
                .with_body("mem://a", "1.1.1.1:8080\n2.2.2.2:8080")
                .with_body("mem://b", "2.2.2.2:8080\n3.3.3.3:8080"),
        );
        let registry = SourceRegistry::new().with(text_source("a")).with(text_source("b"));
        let known: HashSet<Endpoint> = [Endpoint::from("1.1.1.1:8080")].into_iter().collect();
        let fetcher = Fetcher::new(&config, pages);

        let outcome = fetcher.fetch_all(&registry, &validator, &known).await;

        assert_eq!(
            outcome.working.ssl,
            vec![Endpoint::from("2.2.2.2:8080"), Endpoint::from("3.3.3.3:8080")]
        );
        assert!(probe.calls_for("1.1.1.1:8080").is_empty());
        assert_eq!(probe.calls_for("2.2.2.2:8080").len(), 1);
    }

    #[tokio::test]
    async fn test_pagination_stops_when_page_adds_nothing() {
        let config = config();
        let base = "https://pages.test/?type=https&page=1";
        let pages = Arc::new(
            StaticPages::default()
                .with_body(base, table(&["1.0.0.1:443", "1.0.0.2:443"]))
                .with_body("https://pages.test/?type=https&page=2", table(&["1.0.0.2:443", "1.0.0.3:443"]))
                .with_body("https://pages.test/?type=https&page=3", table(&["1.0.0.3:443"]))
                .with_body("https://pages.test/?type=https&page=4", table(&["1.0.0.4:443"])),
        );
        let registry = SourceRegistry::new().with(SourceDescriptor::new(
            "world",
            "World",
            base,
            SourceFormat::FreeProxyWorldHtml,
        ));
        let fetcher = Fetcher::new(&config, pages.clone());

        let outcome = fetcher
            .fetch_all(&registry, &validator(&config), &HashSet::new())
            .await;

        assert_eq!(outcome.working.ssl.len(), 3);
        assert_eq!(pages.requested().len(), 3);
    }

    #[tokio::test]
    async fn test_pagination_respects_rate_limit_and_page_cap() {
        let base = "https://pages.test/?page=1";
        let registry = SourceRegistry::new().with(SourceDescriptor::new(
            "world",
            "World",
            base,
            SourceFormat::FreeProxyWorldHtml,
        ));

        let limited = config();
        let pages = Arc::new(
            StaticPages::default()
                .with_body(base, table(&["2.0.0.1:443"]))
                .with_blocked("https://pages.test/?page=2"),
        );
        let outcome = Fetcher::new(&limited, pages.clone())
            .fetch_all(&registry, &validator(&limited), &HashSet::new())
            .await;
        assert_eq!(outcome.working.ssl, vec![Endpoint::from("2.0.0.1:443")]);
        assert_eq!(pages.requested().len(), 2);

        let capped = ProxyPoolConfig::builder()
            .page_delay(Duration::ZERO)
            .max_pages_per_source(2)
            .build();
        let pages = Arc::new(
            StaticPages::default()
                .with_body(base, table(&["3.0.0.1:443"]))
                .with_body("https://pages.test/?page=2", table(&["3.0.0.2:443"]))
                .with_body("https://pages.test/?page=3", table(&["3.0.0.3:443"])),
        );
        let outcome = Fetcher::new(&capped, pages.clone())
            .fetch_all(&registry, &validator(&capped), &HashSet::new())
            .await;
        assert_eq!(outcome.working.ssl.len(), 2);
        assert_eq!(pages.requested().len(), 2);
    }
}

//! Registry of proxy-list sources.

use crate::error::UnknownSource;
use crate::parsers::SourceFormat;

use std::fmt;
use std::time::Duration;

const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Keys of sources that frequently answer with anti-bot pages.
pub const OFTEN_BLOCKED: [&str; 3] = ["spys_one", "freeproxy_world_https", "freeproxy_world_http"];

/// A single proxy-list source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDescriptor {
    /// Stable key used to enable/disable the source.
    pub key: String,
    /// Human-readable label for logs.
    pub display_name: String,
    pub url: String,
    pub enabled: bool,
    pub description: String,
    pub format: SourceFormat,
    /// Wait before the first request, to look less like a bot.
    pub pre_request_delay: Duration,
    /// Extra request headers sent with every page of this source.
    pub headers: Vec<(String, String)>,
}

impl SourceDescriptor {
    pub fn new(
        key: impl Into<String>,
        display_name: impl Into<String>,
        url: impl Into<String>,
        format: SourceFormat,
    ) -> Self {
        Self {
            key: key.into(),
            display_name: display_name.into(),
            url: url.into(),
            enabled: true,
            description: String::new(),
            format,
            pre_request_delay: Duration::ZERO,
            headers: vec![("User-Agent".to_string(), BROWSER_UA.to_string())],
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn pre_request_delay(mut self, delay: Duration) -> Self {
        self.pre_request_delay = delay;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    fn browser_headers(self) -> Self {
        self.header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9")
            .header("Accept-Language", "en-US,en;q=0.9")
            .header("DNT", "1")
            .header("Upgrade-Insecure-Requests", "1")
    }
}

/// Ordered, toggleable collection of sources. Iteration order is fetch order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceRegistry {
    sources: Vec<SourceDescriptor>,
}

impl SourceRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source at the end of the fetch order. A source with the same
    /// key replaces the existing entry in place.
    pub fn register(&mut self, source: SourceDescriptor) {
        match self.sources.iter_mut().find(|s| s.key == source.key) {
            Some(existing) => *existing = source,
            None => self.sources.push(source),
        }
    }

    pub fn with(mut self, source: SourceDescriptor) -> Self {
        self.register(source);
        self
    }

    pub fn get(&self, key: &str) -> Option<&SourceDescriptor> {
        self.sources.iter().find(|s| s.key == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceDescriptor> {
        self.sources.iter()
    }

    /// Enabled sources in registry order.
    pub fn enabled(&self) -> impl Iterator<Item = &SourceDescriptor> {
        self.sources.iter().filter(|s| s.enabled)
    }

    pub fn enabled_keys(&self) -> Vec<&str> {
        self.enabled().map(|s| s.key.as_str()).collect()
    }

    pub fn disabled_keys(&self) -> Vec<&str> {
        self.sources
            .iter()
            .filter(|s| !s.enabled)
            .map(|s| s.key.as_str())
            .collect()
    }

    pub fn enable(&mut self, key: &str) -> Result<(), UnknownSource> {
        self.set_enabled(key, true)
    }

    pub fn disable(&mut self, key: &str) -> Result<(), UnknownSource> {
        self.set_enabled(key, false)
    }

    /// Flip a source's state, returning the new state.
    pub fn toggle(&mut self, key: &str) -> Result<bool, UnknownSource> {
        let source = self.find_mut(key)?;
        source.enabled = !source.enabled;
        Ok(source.enabled)
    }

    /// Disable the sources listed in [`OFTEN_BLOCKED`] that are registered.
    pub fn disable_often_blocked(&mut self) {
        for source in self.sources.iter_mut() {
            if OFTEN_BLOCKED.contains(&source.key.as_str()) {
                source.enabled = false;
            }
        }
    }

    /// Status listing, one line per source.
    pub fn status(&self) -> SourceStatus<'_> {
        SourceStatus(self)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    fn set_enabled(&mut self, key: &str, enabled: bool) -> Result<(), UnknownSource> {
        self.find_mut(key)?.enabled = enabled;
        Ok(())
    }

    fn find_mut(&mut self, key: &str) -> Result<&mut SourceDescriptor, UnknownSource> {
        self.sources
            .iter_mut()
            .find(|s| s.key == key)
            .ok_or_else(|| UnknownSource(key.to_string()))
    }

    /// The built-in public proxy lists, in the order they are tried.
    pub fn builtin() -> Self {
        use SourceFormat::*;

        Self::new()
            .with(
                SourceDescriptor::new(
                    "monosans",
                    "monosans",
                    "https://raw.githubusercontent.com/monosans/proxy-list/main/proxies/http.txt",
                    PlainText,
                )
                .description("High success rate, good SSL coverage"),
            )
            .with(
                SourceDescriptor::new("spys_one", "SPYS.ONE", "https://spys.one/en/free-proxy-list/", SpysHtml)
                    .description("High-quality proxies with SSL indicators (may be blocked)")
                    .pre_request_delay(Duration::from_secs(2))
                    .header("Referer", "https://spys.one/en/"),
            )
            .with(
                SourceDescriptor::new(
                    "proxyscrape_all",
                    "ProxyScrape",
                    "https://api.proxyscrape.com/v4/free-proxy-list/get?request=displayproxies&protocol=http&timeout=10000&country=all&ssl=all&anonymity=all&skip=0&limit=2000",
                    PlainText,
                )
                .description("All proxies, SSL filtering happens during validation"),
            )
            .with(
                SourceDescriptor::new(
                    "proxyscrape_premium",
                    "ProxyScrape-Premium",
                    "https://api.proxyscrape.com/v4/free-proxy-list/get?request=displayproxies&protocol=http&timeout=5000&country=all&ssl=all&anonymity=elite,anonymous&skip=0&limit=1000",
                    PlainText,
                )
                .description("Elite and anonymous proxies"),
            )
            .with(
                SourceDescriptor::new(
                    "free_proxy_list",
                    "free-proxy-list.net",
                    "https://free-proxy-list.net/en/",
                    FreeProxyListHtml,
                )
                .description("HTML table, low SSL ratio"),
            )
            .with(
                SourceDescriptor::new(
                    "freeproxy_world_https",
                    "FreeProxy.World-HTTPS",
                    "https://www.freeproxy.world/?type=https&anonymity=&country=&speed=1800&port=&page=1",
                    FreeProxyWorldHtml,
                )
                .description("HTTPS proxies (may be blocked by Cloudflare)")
                .pre_request_delay(Duration::from_secs(1))
                .browser_headers(),
            )
            .with(
                SourceDescriptor::new(
                    "freeproxy_world_http",
                    "FreeProxy.World-HTTP",
                    "https://www.freeproxy.world/?type=http&anonymity=&country=&speed=1800&port=&page=1",
                    FreeProxyWorldHtml,
                )
                .description("HTTP proxies (may be blocked by Cloudflare)")
                .pre_request_delay(Duration::from_secs(1))
                .browser_headers(),
            )
            .with(
                SourceDescriptor::new(
                    "advanced_name",
                    "Advanced.name",
                    "https://advanced.name/freeproxy/68df12417db3f",
                    WhitespaceList,
                )
                .description("Advanced.name proxy export"),
            )
            .with(
                SourceDescriptor::new(
                    "thespeedx",
                    "TheSpeedX",
                    "https://raw.githubusercontent.com/TheSpeedX/PROXY-List/master/http.txt",
                    PlainText,
                )
                .description("Large volume, tried last"),
            )
    }
}

/// Printable status of a [`SourceRegistry`].
pub struct SourceStatus<'a>(&'a SourceRegistry);

impl fmt::Display for SourceStatus<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Proxy sources")?;
        for source in self.0.iter() {
            let state = if source.enabled { "enabled " } else { "disabled" };
            writeln!(f, "  [{}] {:24} {}", state, source.key, source.description)?;
        }
        write!(f, "Active sources: {}", self.0.enabled().count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_order_and_labels() {
        let registry = SourceRegistry::builtin();
        assert_eq!(registry.len(), 9);
        assert_eq!(registry.enabled_keys().first(), Some(&"monosans"));
        assert_eq!(registry.enabled_keys().last(), Some(&"thespeedx"));
        assert_eq!(
            registry.get("proxyscrape_premium").map(|s| s.display_name.as_str()),
            Some("ProxyScrape-Premium")
        );
        assert_eq!(
            registry.get("spys_one").map(|s| s.pre_request_delay),
            Some(Duration::from_secs(2))
        );
    }

    #[test]
    fn test_enable_disable_toggle() {
        let mut registry = SourceRegistry::builtin();

        registry.disable("monosans").unwrap();
        assert!(registry.disabled_keys().contains(&"monosans"));

        assert_eq!(registry.toggle("monosans"), Ok(true));
        assert_eq!(registry.toggle("monosans"), Ok(false));

        registry.enable("monosans").unwrap();
        assert!(registry.enabled_keys().contains(&"monosans"));
    }

    #[test]
    fn test_unknown_source() {
        let mut registry = SourceRegistry::builtin();
        assert_eq!(registry.enable("nope"), Err(UnknownSource("nope".to_string())));
        assert!(registry.toggle("nope").is_err());
    }

    #[test]
    fn test_disable_often_blocked() {
        let mut registry = SourceRegistry::builtin();
        registry.disable_often_blocked();
        let disabled = registry.disabled_keys();
        assert_eq!(disabled, OFTEN_BLOCKED.to_vec());
        assert_eq!(registry.enabled().count(), 6);
    }

    #[test]
    fn test_register_replaces_same_key() {
        let registry = SourceRegistry::new()
            .with(SourceDescriptor::new("a", "A", "file-a", SourceFormat::PlainText))
            .with(SourceDescriptor::new("b", "B", "file-b", SourceFormat::PlainText))
            .with(SourceDescriptor::new("a", "A2", "file-a2", SourceFormat::PlainText));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.iter().next().map(|s| s.url.as_str()), Some("file-a2"));
    }

    #[test]
    fn test_status_lists_every_source() {
        let mut registry = SourceRegistry::builtin();
        registry.disable("thespeedx").unwrap();
        let listing = registry.status().to_string();
        assert!(listing.contains("[disabled] thespeedx"));
        assert!(listing.ends_with("Active sources: 8"));
    }
}

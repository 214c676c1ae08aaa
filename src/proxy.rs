//! Proxy endpoint representation and capability classes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ports that suggest a proxy can tunnel TLS, before any live test.
pub const SSL_CAPABLE_PORTS: [u16; 12] = [
    443, 8443, 8442, 9443, 10443, 11443, 12443, 8080, 3128, 1080, 8081, 8888,
];

/// Capability of a validated proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityClass {
    /// Passed an HTTPS fetch through the proxy.
    Ssl,
    /// Passed a plaintext HTTP fetch through the proxy.
    Http,
}

impl fmt::Display for CapabilityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityClass::Ssl => write!(f, "SSL"),
            CapabilityClass::Http => write!(f, "HTTP"),
        }
    }
}

/// A `host:port` proxy address.
///
/// Equality is exact string equality; no normalization is applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Endpoint(String);

impl Endpoint {
    /// Parse a candidate string, accepting it only if it has a non-empty host
    /// and a port in `1..=65535`.
    pub fn parse(candidate: &str) -> Option<Self> {
        let candidate = candidate.trim();
        if is_valid_format(candidate) {
            Some(Self(candidate.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn host(&self) -> &str {
        self.0.split(':').next().unwrap_or("")
    }

    /// Port number, if the address carries a parseable one.
    pub fn port(&self) -> Option<u16> {
        self.0.split(':').nth(1)?.parse().ok()
    }

    /// Whether the port is on the SSL allow-list. Malformed addresses are
    /// presumed plain HTTP.
    pub fn presumed_ssl(&self) -> bool {
        self.port()
            .map(|port| SSL_CAPABLE_PORTS.contains(&port))
            .unwrap_or(false)
    }

    /// Class assigned by port alone, used when no live test is available.
    pub fn presumed_class(&self) -> CapabilityClass {
        if self.presumed_ssl() {
            CapabilityClass::Ssl
        } else {
            CapabilityClass::Http
        }
    }

    /// Forward-proxy URL for HTTP clients (e.g. "http://1.2.3.4:8080").
    pub fn proxy_url(&self) -> String {
        format!("http://{}", self.0)
    }

    /// Convert the endpoint to a reqwest::Proxy covering both schemes.
    pub fn to_reqwest_proxy(&self) -> Result<reqwest::Proxy, reqwest::Error> {
        reqwest::Proxy::all(self.proxy_url())
    }
}

impl From<String> for Endpoint {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Endpoint {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Check the `host:port` shape: non-empty host, numeric port in range.
pub fn is_valid_format(candidate: &str) -> bool {
    let Some((host, port)) = candidate.split_once(':') else {
        return false;
    };
    if host.is_empty() || port.is_empty() {
        return false;
    }
    matches!(port.parse::<u32>(), Ok(p) if (1..=65535).contains(&p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presumed_class_by_port() {
        assert_eq!(Endpoint::from("1.2.3.4:443").presumed_class(), CapabilityClass::Ssl);
        assert_eq!(Endpoint::from("1.2.3.4:3128").presumed_class(), CapabilityClass::Ssl);
        assert_eq!(Endpoint::from("5.6.7.8:80").presumed_class(), CapabilityClass::Http);
        assert_eq!(Endpoint::from("garbage").presumed_class(), CapabilityClass::Http);
    }

    #[test]
    fn test_parse_rejects_bad_ports() {
        assert!(Endpoint::parse("1.2.3.4:8080").is_some());
        assert!(Endpoint::parse(" 1.2.3.4:8080 ").is_some());
        assert!(Endpoint::parse("1.2.3.4:0").is_none());
        assert!(Endpoint::parse("1.2.3.4:70000").is_none());
        assert!(Endpoint::parse(":8080").is_none());
        assert!(Endpoint::parse("1.2.3.4:").is_none());
        assert!(Endpoint::parse("1.2.3.4").is_none());
        assert!(Endpoint::parse("1.2.3.4:80:90").is_none());
    }

    #[test]
    fn test_accessors() {
        let endpoint = Endpoint::from("10.1.2.3:8888");
        assert_eq!(endpoint.host(), "10.1.2.3");
        assert_eq!(endpoint.port(), Some(8888));
        assert_eq!(endpoint.proxy_url(), "http://10.1.2.3:8888");
        assert_eq!(endpoint.to_string(), "10.1.2.3:8888");
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let json = serde_json::to_string(&Endpoint::from("1.2.3.4:80")).unwrap();
        assert_eq!(json, "\"1.2.3.4:80\"");
    }
}

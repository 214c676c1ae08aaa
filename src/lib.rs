//! # smart-proxy-pool
//!
//! A self-refreshing pool of validated HTTP and SSL forwarding proxies.
//!
//! Candidate proxies are scraped from public lists, probed through real
//! requests, persisted between runs and handed out round-robin. The pool can
//! also be used as a reqwest middleware that retries failed requests through
//! the next proxy.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod fetch;
pub mod fetcher;
pub mod maintenance;
pub mod middleware;
pub mod parsers;
pub mod pool;
pub mod proxy;
pub mod rotator;
pub mod sources;
pub mod storage;
pub mod validator;
mod utils;

pub use bootstrap::{
    BootstrapPrompt, BootstrapReport, BootstrapStatus, ChoiceTaken, FallbackChoice, Provenance,
    UserChoice,
};
pub use config::{MaintenanceConfig, ProxyPoolConfig, ProxyPoolConfigBuilder};
pub use error::{FetchError, NoProxyAvailable, StorageError, UnknownSource};
pub use maintenance::{MaintenanceHandle, MaintenanceTask};
pub use middleware::ProxyPoolMiddleware;
pub use pool::ProxyPool;
pub use proxy::{is_valid_format, CapabilityClass, Endpoint};
pub use rotator::{ConsumerHint, PoolStats};
pub use sources::{SourceDescriptor, SourceRegistry};

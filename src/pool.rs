//! Pool manager: bootstrap, rotation and eviction.

use crate::bootstrap::{
    decide, Action, BootstrapPrompt, BootstrapReport, ChoiceTaken, DecisionContext, Provenance,
    Step, UserChoice,
};
use crate::config::ProxyPoolConfig;
use crate::fetch::{HttpPageFetcher, PageFetcher};
use crate::fetcher::Fetcher;
use crate::proxy::{CapabilityClass, Endpoint};
use crate::rotator::{ConsumerHint, PoolStats, ProxyRotator};
use crate::sources::SourceRegistry;
use crate::storage::ProxyStorage;
use crate::validator::{ProxyProbe, ReqwestProbe, ValidationOutcome, Validator};

use log::{info, warn};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// A self-refreshing pool of validated proxies.
///
/// Owns storage, validation, fetching and rotation for one run. Share it
/// behind an `Arc`; every pool mutation goes through a single lock.
pub struct ProxyPool {
    /// Configuration for the pool.
    pub config: ProxyPoolConfig,
    storage: ProxyStorage,
    validator: Validator,
    fetcher: Fetcher,
    rotator: Mutex<ProxyRotator>,
    /// Held from snapshot to write so saves land in pool order.
    save_lock: tokio::sync::Mutex<()>,
}

impl ProxyPool {
    /// Create an empty pool that probes and fetches over real HTTP.
    /// Call [`ProxyPool::bootstrap`] to fill it.
    pub fn new(config: ProxyPoolConfig) -> Arc<Self> {
        let probe = ReqwestProbe::new(config.validation_timeout, config.user_agent.clone());
        Self::with_collaborators(config, Arc::new(probe), Arc::new(HttpPageFetcher::new()))
    }

    /// Create an empty pool with custom probe and page fetcher.
    pub fn with_collaborators(
        config: ProxyPoolConfig,
        probe: Arc<dyn ProxyProbe>,
        pages: Arc<dyn PageFetcher>,
    ) -> Arc<Self> {
        Arc::new(Self {
            storage: ProxyStorage::new(config.cache_file.clone()),
            validator: Validator::new(&config, probe),
            fetcher: Fetcher::new(&config, pages),
            rotator: Mutex::new(ProxyRotator::new()),
            save_lock: tokio::sync::Mutex::new(()),
            config,
        })
    }

    pub fn sources(&self) -> &SourceRegistry {
        &self.config.sources
    }

    /// Load, validate and if needed fetch proxies until a terminal state.
    ///
    /// Without a prompt the run is non-interactive: missing proxies are
    /// fetched, and an empty fetch means running without proxies.
    pub async fn bootstrap(&self, prompt: Option<&dyn BootstrapPrompt>) -> BootstrapReport {
        let ctx = DecisionContext {
            min_working_proxies: self.config.min_working_proxies,
            interactive: prompt.is_some(),
        };
        info!(
            "Bootstrapping proxy pool (minimum {}, {})",
            ctx.min_working_proxies,
            if ctx.interactive { "interactive" } else { "non-interactive" }
        );

        let (saved_ssl, saved_http) = self.storage.load().await;
        let saved: Vec<Endpoint> = saved_ssl.into_iter().chain(saved_http).collect();
        if !saved.is_empty() {
            if let Some(saved_at) = self.storage.saved_at().await {
                info!("Found {} saved proxies (saved at {})", saved.len(), saved_at);
            }
        }

        let mut step = Step::Loaded { saved: saved.len() };
        loop {
            step = match decide(step, &ctx) {
                Action::ValidateSaved => {
                    let outcome = self.validator.validate(&saved).await;
                    self.absorb(outcome);
                    Step::SavedValidated {
                        working: self.pool_size(),
                    }
                }
                Action::TopUp => {
                    let working = self.pool_size();
                    warn!(
                        "Only {} working proxies (need {}), fetching more",
                        working, ctx.min_working_proxies
                    );
                    self.persist().await;
                    self.fetch_more().await;
                    Step::ToppedUp {
                        working: self.pool_size(),
                    }
                }
                Action::Ask => {
                    let choice = match prompt {
                        Some(prompt) => prompt.choose(ctx.min_working_proxies).await,
                        None => Some(UserChoice::FetchAndWait),
                    };
                    match choice {
                        Some(choice) => Step::Chose(choice),
                        None => return self.finish(BootstrapReport::exit(ChoiceTaken::Interrupt)).await,
                    }
                }
                Action::AskAfterEmptyFetch => {
                    let choice = match prompt {
                        Some(prompt) => prompt.choose_after_empty_fetch().await,
                        None => None,
                    };
                    match choice {
                        Some(choice) => Step::ChoseAfterEmptyFetch(choice),
                        None => return self.finish(BootstrapReport::exit(ChoiceTaken::Interrupt)).await,
                    }
                }
                Action::FetchFresh => {
                    info!("No working proxies available, fetching new ones");
                    self.fetch_more().await;
                    Step::FreshFetched {
                        working: self.pool_size(),
                    }
                }
                Action::Finish(report) => return self.finish(report).await,
            };
        }
    }

    async fn finish(&self, report: BootstrapReport) -> BootstrapReport {
        if report.source == Provenance::Saved {
            self.persist().await;
        }
        info!("Proxy pool bootstrap finished: {}", report);
        report
    }

    /// Next proxy for a consumer, or `None` if the relevant pool is empty.
    pub fn get_next(&self, hint: Option<ConsumerHint>) -> Option<Endpoint> {
        self.rotator.lock().next_for(hint)
    }

    /// Pooled proxies of one class in rotation order.
    pub fn endpoints(&self, class: CapabilityClass) -> Vec<Endpoint> {
        self.rotator.lock().endpoints(class).to_vec()
    }

    /// Report a proxy that failed in live use. Evicts it and re-saves the
    /// pools if it was pooled; returns whether it was.
    pub async fn mark_dead(&self, endpoint: &Endpoint) -> bool {
        let removed = self.rotator.lock().mark_dead(endpoint);
        self.validator.record_dead(endpoint);
        if removed {
            self.persist().await;
        }
        removed
    }

    /// Get statistics about the proxy pool.
    pub fn get_stats(&self) -> PoolStats {
        let mut stats = self.rotator.lock().stats();
        stats.dead_count = self.validator.dead_count();
        stats
    }

    /// Fetch more proxies when fewer than `min_count` are pooled. Returns the
    /// pool size afterwards.
    pub async fn maintain(&self, min_count: usize) -> usize {
        let current = self.pool_size();
        if current < min_count {
            info!("Proxy pool low ({}/{}), fetching more", current, min_count);
            self.fetch_more().await;
        }
        self.pool_size()
    }

    /// Write both pools to the state file. Concurrent calls are serialized
    /// and each writes the pools as they are once it holds the save lock.
    pub async fn persist(&self) {
        let _saving = self.save_lock.lock().await;
        let (ssl, http) = {
            let rotator = self.rotator.lock();
            (
                rotator.endpoints(CapabilityClass::Ssl).to_vec(),
                rotator.endpoints(CapabilityClass::Http).to_vec(),
            )
        };
        self.storage.save(&ssl, &http).await;
    }

    pub(crate) fn pool_size(&self) -> usize {
        self.rotator.lock().len()
    }

    /// One pass over the sources; new working proxies join the rotation and
    /// are persisted. Returns how many were added.
    async fn fetch_more(&self) -> usize {
        let known: HashSet<Endpoint> = {
            let rotator = self.rotator.lock();
            rotator
                .endpoints(CapabilityClass::Ssl)
                .iter()
                .chain(rotator.endpoints(CapabilityClass::Http))
                .cloned()
                .collect()
        };

        let outcome = self
            .fetcher
            .fetch_all(&self.config.sources, &self.validator, &known)
            .await;
        let added = self.absorb(outcome.working);

        if added > 0 {
            self.persist().await;
            info!("Added {} new proxies. Total: {}", added, self.pool_size());
        } else {
            warn!("No new working proxies found");
        }
        added
    }

    /// Add validated proxies to the rotation, keeping classes exclusive.
    fn absorb(&self, outcome: ValidationOutcome) -> usize {
        let mut rotator = self.rotator.lock();
        let ssl: Vec<Endpoint> = outcome
            .ssl
            .into_iter()
            .filter(|e| !rotator.contains(e))
            .collect();
        let added_ssl = rotator.add(ssl, CapabilityClass::Ssl);
        let http: Vec<Endpoint> = outcome
            .http
            .into_iter()
            .filter(|e| !rotator.contains(e))
            .collect();
        added_ssl + rotator.add(http, CapabilityClass::Http)
    }
}

//! Persistence of the SSL and HTTP pools in a JSON state file.

use crate::error::StorageError;
use crate::proxy::{CapabilityClass, Endpoint};
use crate::utils;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// On-disk layout. `working_proxies` alone is the legacy single-pool shape.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    working_proxies: Vec<Endpoint>,
    #[serde(default)]
    ssl_proxies: Option<Vec<Endpoint>>,
    #[serde(default)]
    http_proxies: Option<Vec<Endpoint>>,
    #[serde(default)]
    saved_at: Option<String>,
    #[serde(default)]
    count: usize,
    #[serde(default)]
    ssl_count: usize,
    #[serde(default)]
    http_count: usize,
}

/// Reads and writes the state file. Failures are logged and never returned.
#[derive(Debug, Clone)]
pub struct ProxyStorage {
    path: PathBuf,
}

impl ProxyStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load `(ssl, http)` pools, each deduplicated.
    ///
    /// Legacy files are split by presumed port class. A missing or unreadable
    /// file yields two empty pools.
    pub async fn load(&self) -> (Vec<Endpoint>, Vec<Endpoint>) {
        let snapshot = match self.read().await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                info!("No saved proxy file found at {}", self.path.display());
                return (Vec::new(), Vec::new());
            }
            Err(e) => {
                warn!("Failed to load saved proxies from {}: {}", self.path.display(), e);
                return (Vec::new(), Vec::new());
            }
        };

        match (snapshot.ssl_proxies, snapshot.http_proxies) {
            (Some(ssl), Some(http)) => {
                let ssl = utils::dedup_preserving_order(ssl);
                let http = utils::dedup_preserving_order(http);
                info!(
                    "Loaded {} SSL and {} HTTP proxies from {}",
                    ssl.len(),
                    http.len(),
                    self.path.display()
                );
                (ssl, http)
            }
            _ => {
                let saved = utils::dedup_preserving_order(snapshot.working_proxies);
                let (ssl, http): (Vec<Endpoint>, Vec<Endpoint>) = saved
                    .into_iter()
                    .partition(|endpoint| endpoint.presumed_class() == CapabilityClass::Ssl);
                info!(
                    "Loaded {} legacy proxies from {} (classified: {} SSL, {} HTTP)",
                    ssl.len() + http.len(),
                    self.path.display(),
                    ssl.len(),
                    http.len()
                );
                (ssl, http)
            }
        }
    }

    /// Timestamp of the last save, if the file has one.
    pub async fn saved_at(&self) -> Option<String> {
        self.read().await.ok().flatten().and_then(|s| s.saved_at)
    }

    /// Replace the state file with both pools, their union and counts.
    pub async fn save(&self, ssl: &[Endpoint], http: &[Endpoint]) {
        match self.write(ssl, http).await {
            Ok(total) => info!("Saved {} proxies to {}", total, self.path.display()),
            Err(e) => warn!("Failed to save proxies to {}: {}", self.path.display(), e),
        }
    }

    async fn read(&self) -> Result<Option<Snapshot>, StorageError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    async fn write(&self, ssl: &[Endpoint], http: &[Endpoint]) -> Result<usize, StorageError> {
        let ssl = utils::dedup_preserving_order(ssl.iter().cloned());
        let http = utils::dedup_preserving_order(http.iter().cloned());
        let combined: Vec<Endpoint> = ssl.iter().chain(http.iter()).cloned().collect();

        let snapshot = Snapshot {
            count: combined.len(),
            ssl_count: ssl.len(),
            http_count: http.len(),
            working_proxies: combined,
            ssl_proxies: Some(ssl),
            http_proxies: Some(http),
            saved_at: Some(chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()),
        };

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }

        // Write beside the target and rename over it
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, serde_json::to_string_pretty(&snapshot)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        Ok(snapshot.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoints(list: &[&str]) -> Vec<Endpoint> {
        list.iter().map(|e| Endpoint::from(*e)).collect()
    }

    #[tokio::test]
    async fn test_save_then_load_is_identity_after_dedup() {
        let dir = tempfile::tempdir().unwrap();
        let storage = ProxyStorage::new(dir.path().join("proxies.json"));

        let ssl = endpoints(&["1.1.1.1:443", "2.2.2.2:8080", "1.1.1.1:443"]);
        let http = endpoints(&["3.3.3.3:80", "4.4.4.4:81", "3.3.3.3:80"]);
        storage.save(&ssl, &http).await;

        let (loaded_ssl, loaded_http) = storage.load().await;
        assert_eq!(loaded_ssl, endpoints(&["1.1.1.1:443", "2.2.2.2:8080"]));
        assert_eq!(loaded_http, endpoints(&["3.3.3.3:80", "4.4.4.4:81"]));

        storage.save(&loaded_ssl, &loaded_http).await;
        assert_eq!(storage.load().await, (loaded_ssl, loaded_http));
    }

    #[tokio::test]
    async fn test_saved_file_carries_legacy_view_and_counts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("proxies.json");
        let storage = ProxyStorage::new(&path);

        storage
            .save(&endpoints(&["1.1.1.1:443"]), &endpoints(&["2.2.2.2:80"]))
            .await;

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["working_proxies"], serde_json::json!(["1.1.1.1:443", "2.2.2.2:80"]));
        assert_eq!(raw["count"], 2);
        assert_eq!(raw["ssl_count"], 1);
        assert_eq!(raw["http_count"], 1);
        assert!(raw["saved_at"].is_string());
        assert!(storage.saved_at().await.is_some());
    }

    #[tokio::test]
    async fn test_legacy_file_is_reclassified_by_port() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.json");
        std::fs::write(
            &path,
            r#"{"working_proxies": ["1.2.3.4:443", "5.6.7.8:80", "1.2.3.4:443"]}"#,
        )
        .unwrap();

        let (ssl, http) = ProxyStorage::new(&path).load().await;
        assert_eq!(ssl, endpoints(&["1.2.3.4:443"]));
        assert_eq!(http, endpoints(&["5.6.7.8:80"]));
    }

    #[tokio::test]
    async fn test_missing_or_malformed_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let missing = ProxyStorage::new(dir.path().join("missing.json"));
        assert_eq!(missing.load().await, (vec![], vec![]));
        assert_eq!(missing.saved_at().await, None);

        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(ProxyStorage::new(&path).load().await, (vec![], vec![]));
    }

    #[tokio::test]
    async fn test_unwritable_location_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        let storage = ProxyStorage::new(blocker.join("proxies.json"));
        storage.save(&endpoints(&["1.1.1.1:443"]), &[]).await;
        assert_eq!(storage.load().await, (vec![], vec![]));
    }
}

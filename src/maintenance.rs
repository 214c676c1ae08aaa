//! Background pool maintenance.
//!
//! Every `interval` the task checks the pool size and fetches more proxies
//! when it is below `min_count`. A cycle that fetches and gains nothing is a
//! failure and is followed by an extra `error_backoff` pause. The task stops
//! after `max_cycles` cycles or when its handle asks it to.

use crate::config::MaintenanceConfig;
use crate::pool::ProxyPool;

use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;

/// Periodic top-up of a shared pool.
pub struct MaintenanceTask {
    pool: Arc<ProxyPool>,
    config: MaintenanceConfig,
}

impl MaintenanceTask {
    pub fn new(pool: Arc<ProxyPool>, config: MaintenanceConfig) -> Self {
        Self { pool, config }
    }

    /// Run the task on the tokio runtime.
    pub fn spawn(self) -> MaintenanceHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move { self.run(shutdown_rx).await });
        MaintenanceHandle {
            shutdown_tx,
            task: Some(task),
            cycles: 0,
        }
    }

    /// Run until the cycle cap or shutdown. Returns the cycles completed.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> usize {
        info!(
            "Starting background proxy maintenance (interval: {}s, min: {}, target: {}, max cycles: {})",
            self.config.interval.as_secs(),
            self.config.min_count,
            self.config.target_count,
            self.config.max_cycles
        );

        let mut cycles = 0;
        while cycles < self.config.max_cycles {
            if !pause(self.config.interval, &mut shutdown).await {
                info!("Background proxy maintenance shutting down");
                return cycles;
            }
            cycles += 1;

            let before = self.pool.pool_size();
            if before >= self.config.min_count {
                debug!(
                    "Maintenance cycle {}: pool healthy ({} proxies)",
                    cycles, before
                );
                continue;
            }

            let after = self.pool.maintain(self.config.min_count).await;
            if after > before {
                info!(
                    "Maintenance cycle {}: pool grew from {} to {}",
                    cycles, before, after
                );
                continue;
            }

            warn!(
                "Maintenance cycle {} found no new proxies, backing off for {}s",
                cycles,
                self.config.error_backoff.as_secs()
            );
            if !pause(self.config.error_backoff, &mut shutdown).await {
                info!("Background proxy maintenance shutting down");
                return cycles;
            }
        }

        info!("Background proxy maintenance finished after {} cycles", cycles);
        cycles
    }
}

/// Sleep for `duration`. Returns false if shutdown was requested first.
async fn pause(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return false;
    }
    tokio::select! {
        _ = time::sleep(duration) => true,
        // A dropped handle counts as a shutdown request
        _ = shutdown.changed() => false,
    }
}

/// Handle to a spawned [`MaintenanceTask`]. Dropping it stops the task.
pub struct MaintenanceHandle {
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<usize>>,
    cycles: usize,
}

impl MaintenanceHandle {
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait until the task ends and return the cycles it completed.
    ///
    /// Cancel safe, so it can sit in a `select!` and be awaited again later.
    pub async fn finished(&mut self) -> usize {
        if let Some(task) = self.task.as_mut() {
            self.cycles = match task.await {
                Ok(cycles) => cycles,
                Err(e) => {
                    warn!("Background proxy maintenance task failed: {}", e);
                    0
                }
            };
            self.task = None;
        }
        self.cycles
    }

    /// Ask the task to stop and wait for it. Returns the cycles completed.
    pub async fn stop(mut self) -> usize {
        let _ = self.shutdown_tx.send(true);
        self.finished().await
    }

    /// Wait for the task to reach its cycle cap.
    pub async fn join(mut self) -> usize {
        self.finished().await
    }
}

impl ProxyPool {
    /// Spawn background maintenance with the pool's configured settings.
    pub fn start_maintenance(self: &Arc<Self>) -> MaintenanceHandle {
        MaintenanceTask::new(self.clone(), self.config.maintenance.clone()).spawn()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::tests::{listing, StaticPages};
    use crate::pool::tests::Fixture;
    use crate::validator::tests::StaticProbe;

    fn quick(max_cycles: usize, min_count: usize) -> MaintenanceConfig {
        MaintenanceConfig {
            interval: Duration::from_millis(5),
            error_backoff: Duration::from_millis(5),
            max_cycles,
            min_count,
            target_count: min_count,
        }
    }

    #[tokio::test]
    async fn test_tops_up_low_pool_and_stops_at_cycle_cap() {
        let fixture = Fixture::new(
            StaticProbe::all_working(),
            StaticPages::default().with_body("mem://a", listing(4, 3)),
        );
        let pool = fixture.pool();

        let handle = MaintenanceTask::new(pool.clone(), quick(3, 2)).spawn();
        assert_eq!(handle.join().await, 3);

        assert_eq!(pool.get_stats().total(), 3);
        // one fetch pass over both sources, then the pool is healthy
        assert_eq!(fixture.pages.requested().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_cycles_keep_retrying_until_cap() {
        let fixture = Fixture::new(StaticProbe::default(), StaticPages::default());
        let pool = fixture.pool();

        let handle = MaintenanceTask::new(pool.clone(), quick(2, 1)).spawn();
        assert_eq!(handle.join().await, 2);

        assert_eq!(pool.get_stats().total(), 0);
        assert_eq!(fixture.pages.requested().len(), 4);
    }

    #[tokio::test]
    async fn test_stop_interrupts_the_wait() {
        let fixture = Fixture::new(StaticProbe::all_working(), StaticPages::default());
        let config = MaintenanceConfig {
            interval: Duration::from_secs(3600),
            ..quick(10, 1)
        };

        let handle = MaintenanceTask::new(fixture.pool(), config).spawn();
        assert!(!handle.is_finished());

        let cycles = time::timeout(Duration::from_secs(5), handle.stop())
            .await
            .unwrap();
        assert_eq!(cycles, 0);
        assert!(fixture.pages.requested().is_empty());
    }

    #[tokio::test]
    async fn test_finished_can_be_awaited_by_reference() {
        let fixture = Fixture::new(StaticProbe::all_working(), StaticPages::default());
        let mut handle = MaintenanceTask::new(fixture.pool(), quick(2, 0)).spawn();

        tokio::select! {
            cycles = handle.finished() => assert_eq!(cycles, 2),
            _ = time::sleep(Duration::from_secs(5)) => panic!("maintenance did not finish"),
        }
        assert!(handle.is_finished());
        assert_eq!(handle.finished().await, 2);
        assert_eq!(handle.stop().await, 2);
    }
}

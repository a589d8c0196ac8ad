//! Expiry sweeper: deletes stored artifacts once they outlive the retention
//! threshold.
//!
//! ```text
//! ┌──────┐   ┌──────────┐   ┌─────────┐   ┌───────┐
//! │ Scan │──▶│ Evaluate │──▶│ Delete* │──▶│ Sleep │──┐
//! └──────┘   └──────────┘   └─────────┘   └───────┘  │
//!    ▲                                               │
//!    └───────────────────────────────────────────────┘
//! ```
//!
//! A cycle looks at every entry of the three store namespaces. An entry is
//! removed when `now - modified > retention` and its job is not in flight.
//! Modification times in the future count as age zero. Failures are logged
//! per entry and never stop the loop.

use crate::config::ServerConfig;
use crate::error::SweepError;
use crate::job::InFlightJobs;
use crate::store::{self, ArtifactKind, JobStore, StoredArtifact};
use serde::Serialize;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Outcome of one sweep cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub removed: usize,
    pub skipped_in_flight: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct Sweeper {
    store: JobStore,
    in_flight: InFlightJobs,
    retention: Duration,
    interval: Duration,
}

impl Sweeper {
    pub fn new(store: JobStore, in_flight: InFlightJobs, config: &ServerConfig) -> Self {
        Self {
            store,
            in_flight,
            retention: config.retention,
            interval: config.sweep_interval,
        }
    }

    /// Run a single cycle as of `now`. Blocking.
    pub fn sweep_once(&self, now: SystemTime) -> SweepReport {
        let mut report = SweepReport::default();

        for kind in ArtifactKind::ALL {
            let artifacts = match self.store.list(kind) {
                Ok(a) => a,
                Err(e) => {
                    warn!("Sweep could not list {} directory: {}", kind, e);
                    report.failed += 1;
                    continue;
                }
            };

            for artifact in artifacts {
                report.scanned += 1;
                if !self.is_expired(&artifact, now) {
                    continue;
                }
                if artifact.job_id.is_some_and(|id| self.in_flight.contains(&id)) {
                    debug!("Skipping in-flight {}", artifact.path.display());
                    report.skipped_in_flight += 1;
                    continue;
                }
                match remove(&artifact) {
                    Ok(()) => {
                        debug!("Removed expired {} {}", artifact.kind, artifact.name);
                        report.removed += 1;
                    }
                    Err(e) => {
                        warn!("{}", e);
                        report.failed += 1;
                    }
                }
            }
        }

        report
    }

    fn is_expired(&self, artifact: &StoredArtifact, now: SystemTime) -> bool {
        // Err means the mtime is in the future.
        let age = now.duration_since(artifact.modified).unwrap_or(Duration::ZERO);
        age > self.retention
    }

    /// Start the sweep loop on the runtime. The first cycle runs immediately.
    pub fn spawn(self) -> SweeperHandle {
        let (stop, stopped) = watch::channel(false);
        let task = tokio::spawn(self.run(stopped));
        SweeperHandle { stop, task }
    }

    async fn run(self, mut stopped: watch::Receiver<bool>) {
        info!(
            "Sweeper started (retention {}s, interval {}s)",
            self.retention.as_secs(),
            self.interval.as_secs()
        );

        loop {
            let sweeper = self.clone();
            match tokio::task::spawn_blocking(move || sweeper.sweep_once(SystemTime::now())).await {
                Ok(report) if report.removed > 0 || report.failed > 0 => info!(
                    removed = report.removed,
                    failed = report.failed,
                    skipped_in_flight = report.skipped_in_flight,
                    "Sweep cycle scanned {} artifacts",
                    report.scanned
                ),
                Ok(report) => debug!("Sweep cycle scanned {} artifacts", report.scanned),
                Err(e) => warn!("Sweep cycle panicked: {}", e),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = stopped.changed() => break,
            }
        }

        info!("Sweeper stopped");
    }
}

fn remove(artifact: &StoredArtifact) -> Result<(), SweepError> {
    store::remove_path(&artifact.path).map_err(|source| SweepError {
        path: artifact.path.clone(),
        source,
    })
}

/// Owns the running sweep task.
#[derive(Debug)]
pub struct SweeperHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the loop to stop and wait for it. A cycle already in progress
    /// finishes first.
    pub async fn shutdown(self) {
        // Only fails if the task is already gone.
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            warn!("Sweeper task ended abnormally: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputFormat;
    use crate::job::JobId;
    use tempfile::TempDir;

    const RETENTION: Duration = Duration::from_secs(120);

    fn sweeper() -> (TempDir, Sweeper, InFlightJobs) {
        let tmp = TempDir::new().unwrap();
        let config = ServerConfig::builder()
            .data_dir(tmp.path())
            .retention(RETENTION)
            .sweep_interval(Duration::from_millis(20))
            .build()
            .unwrap();
        let store = JobStore::open(&config).unwrap();
        let in_flight = InFlightJobs::new();
        let sweeper = Sweeper::new(store, in_flight.clone(), &config);
        (tmp, sweeper, in_flight)
    }

    /// Writes every artifact kind for a fresh job.
    fn full_job(store: &JobStore) -> JobId {
        let id = JobId::new();
        store.put_upload(id, b"%PDF").unwrap();
        store.put_page(id, 1, OutputFormat::Png, b"a").unwrap();
        store.put_page(id, 2, OutputFormat::Png, b"b").unwrap();
        std::fs::write(store.path(ArtifactKind::Archive, id), b"zip").unwrap();
        id
    }

    fn later() -> SystemTime {
        SystemTime::now() + RETENTION + Duration::from_secs(1)
    }

    #[test]
    fn young_artifacts_survive() {
        let (_tmp, sweeper, _) = sweeper();
        let id = full_job(&sweeper.store);

        let report = sweeper.sweep_once(SystemTime::now());
        assert_eq!(report.scanned, 3);
        assert_eq!(report.removed, 0);
        for kind in ArtifactKind::ALL {
            assert!(sweeper.store.path(kind, id).exists());
        }
    }

    #[test]
    fn expired_artifacts_are_removed_recursively() {
        let (_tmp, sweeper, _) = sweeper();
        let id = full_job(&sweeper.store);

        let report = sweeper.sweep_once(later());
        assert_eq!(report.removed, 3);
        assert_eq!(report.failed, 0);
        for kind in ArtifactKind::ALL {
            assert!(!sweeper.store.path(kind, id).exists(), "{kind} survived");
        }
    }

    #[test]
    fn second_sweep_removes_nothing() {
        let (_tmp, sweeper, _) = sweeper();
        full_job(&sweeper.store);

        let now = later();
        sweeper.sweep_once(now);
        let again = sweeper.sweep_once(now);
        assert_eq!(again, SweepReport::default());
    }

    #[test]
    fn in_flight_jobs_are_skipped() {
        let (_tmp, sweeper, in_flight) = sweeper();
        let busy = full_job(&sweeper.store);
        let idle = full_job(&sweeper.store);
        let guard = in_flight.register(busy);

        let report = sweeper.sweep_once(later());
        assert_eq!(report.skipped_in_flight, 3);
        assert_eq!(report.removed, 3);
        assert!(sweeper.store.path(ArtifactKind::Pages, busy).exists());
        assert!(!sweeper.store.path(ArtifactKind::Pages, idle).exists());

        drop(guard);
        assert_eq!(sweeper.sweep_once(later()).removed, 3);
    }

    #[test]
    fn stray_files_expire_too() {
        let (_tmp, sweeper, _) = sweeper();
        let stray = sweeper.store.dir(ArtifactKind::Archive).join("leftover.tmp");
        std::fs::write(&stray, b"?").unwrap();

        assert_eq!(sweeper.sweep_once(later()).removed, 1);
        assert!(!stray.exists());
    }

    #[test]
    fn future_mtime_counts_as_fresh() {
        let (_tmp, sweeper, _) = sweeper();
        full_job(&sweeper.store);
        let past = SystemTime::now() - Duration::from_secs(3600);
        assert_eq!(sweeper.sweep_once(past).removed, 0);
    }

    #[tokio::test]
    async fn spawned_loop_sweeps_and_stops() {
        let (_tmp, sweeper, _) = sweeper();
        let store = sweeper.store.clone();
        let sweeper = Sweeper {
            retention: Duration::ZERO,
            ..sweeper
        };
        let id = full_job(&store);
        // Zero retention still requires a strictly positive age.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let handle = sweeper.spawn();
        let mut gone = false;
        for _ in 0..100 {
            if !store.path(ArtifactKind::Upload, id).exists() {
                gone = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(gone, "upload was never swept");

        assert!(!handle.is_finished());
        tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .expect("shutdown should not hang");
    }
}

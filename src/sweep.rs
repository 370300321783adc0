//! Background reconciliation sweep.
//!
//! A dedicated worker thread periodically applies the configured
//! automatic strategy to all pending conflicts and, on a coarser cadence,
//! drives quality evaluation for registered sources. The sweeper owns
//! its shutdown signaling and is independent of any client connection
//! lifecycle; dropping or stopping it joins the worker deterministically.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, select, Sender};
use tracing::{debug, warn};

use crate::config::SweepConfig;
use crate::engine::ReconcileEngine;
use crate::window::Window;

/// Handle to the running sweep worker.
pub struct ReconcileSweeper {
    shutdown_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl ReconcileSweeper {
    /// Spawns the sweep worker.
    ///
    /// # Panics
    ///
    /// Panics if the worker thread cannot be spawned.
    #[must_use]
    pub fn start(engine: Arc<ReconcileEngine>, config: SweepConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("netrecon-sweeper".to_string())
            .spawn(move || {
                let mut cycle: usize = 0;
                loop {
                    select! {
                        recv(shutdown_rx) -> _ => break,
                        default(config.interval) => {
                            cycle += 1;
                            match engine.run_sweep_cycle(config.strategy) {
                                Ok(stats) => {
                                    if stats.pending_seen > 0 {
                                        debug!(
                                            resolved = stats.resolved,
                                            lost_races = stats.lost_races,
                                            failed = stats.failed,
                                            "sweep cycle complete"
                                        );
                                    }
                                }
                                Err(e) => warn!(error = %e, "sweep cycle failed"),
                            }

                            if config.quality_every > 0 && cycle % config.quality_every == 0 {
                                let window = Window::last(config.quality_window);
                                match engine.evaluate_registered_sources(&window) {
                                    Ok(recorded) => {
                                        debug!(recorded, "quality evaluation complete");
                                    }
                                    Err(e) => warn!(error = %e, "quality evaluation failed"),
                                }
                            }
                        }
                    }
                }
            })
            .expect("failed to spawn netrecon sweeper");

        Self {
            shutdown_tx,
            handle: Some(handle),
        }
    }

    /// Returns true while the worker is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Signals shutdown and joins the worker.
    ///
    /// The current cycle finishes; no new cycle starts.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.shutdown_tx.try_send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ReconcileSweeper {
    fn drop(&mut self) {
        // Deterministic shutdown when the handle goes out of scope.
        self.shutdown();
    }
}

impl std::fmt::Debug for ReconcileSweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconcileSweeper")
            .field("running", &self.handle.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::Utc;

    use crate::catalog::InMemoryCatalog;
    use crate::engine::ReconcileConfig;
    use crate::observation::Observation;
    use crate::resolution::ResolutionStrategy;
    use crate::value::FieldValue;

    fn engine() -> Arc<ReconcileEngine> {
        Arc::new(ReconcileEngine::in_memory(
            Arc::new(InMemoryCatalog::new()),
            ReconcileConfig::default(),
        ))
    }

    #[test]
    fn test_sweeper_resolves_pending_conflicts() {
        let engine = engine();
        engine
            .ingest(
                Observation::new(
                    "router-17",
                    "ip_address",
                    "nmap",
                    FieldValue::String("10.0.0.5".into()),
                    Utc::now(),
                    0.9,
                )
                .unwrap(),
            )
            .unwrap();
        engine
            .ingest(
                Observation::new(
                    "router-17",
                    "ip_address",
                    "zeek",
                    FieldValue::String("10.0.0.6".into()),
                    Utc::now(),
                    0.9,
                )
                .unwrap(),
            )
            .unwrap();

        let sweeper = ReconcileSweeper::start(
            Arc::clone(&engine),
            SweepConfig {
                interval: Duration::from_millis(20),
                strategy: ResolutionStrategy::PriorityBased,
                quality_every: 0,
                ..SweepConfig::default()
            },
        );

        // Wait for at least one cycle.
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        loop {
            let pending = engine
                .list_conflicts(Some(crate::conflict::ConflictStatus::Pending))
                .unwrap();
            if pending.is_empty() {
                break;
            }
            assert!(
                std::time::Instant::now() < deadline,
                "sweeper did not resolve pending conflict in time"
            );
            thread::sleep(Duration::from_millis(10));
        }

        sweeper.stop();
        assert!(engine
            .get_authoritative_value("router-17", "ip_address")
            .is_ok());
    }

    #[test]
    fn test_sweeper_stops_cleanly() {
        let sweeper = ReconcileSweeper::start(
            engine(),
            SweepConfig {
                interval: Duration::from_millis(10),
                ..SweepConfig::default()
            },
        );
        assert!(sweeper.is_running());
        sweeper.stop();
    }

    #[test]
    fn test_sweeper_drop_joins_worker() {
        let sweeper = ReconcileSweeper::start(
            engine(),
            SweepConfig {
                interval: Duration::from_millis(10),
                ..SweepConfig::default()
            },
        );
        drop(sweeper);
    }
}

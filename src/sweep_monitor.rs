//! Sweep Monitor
//!
//! Background service that times out overdue challenges.
//!
//! Flow:
//! 1. Every `poll_interval_secs`, resolve the ladders to sweep (configured
//!    list, or the `current_ladder` setting when none are configured)
//! 2. Sweep each ladder on the blocking pool with the engine clock
//! 3. Log timeouts and strike-kicks; a failing ladder is logged and retried
//!    next tick without holding up the others

use crate::engine::{Caller, LadderEngine, SweepReport};
use crate::storage::LadderStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

/// Configuration for the sweep monitor
#[derive(Debug, Clone)]
pub struct SweepMonitorConfig {
    /// How often to sweep (default: 1 hour)
    pub poll_interval_secs: u64,
    /// Ladders to sweep; empty means the current ladder
    pub ladders: Vec<String>,
}

impl Default for SweepMonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 3600,
            ladders: Vec::new(),
        }
    }
}

pub struct SweepMonitor<S: LadderStore + 'static> {
    engine: Arc<LadderEngine<S>>,
    config: SweepMonitorConfig,
}

impl<S: LadderStore + 'static> SweepMonitor<S> {
    pub fn new(engine: Arc<LadderEngine<S>>, config: SweepMonitorConfig) -> Self {
        Self { engine, config }
    }

    /// Start the monitor (runs forever)
    pub async fn run(&self) {
        info!(
            "Sweep monitor started (poll={}s, ladders={:?})",
            self.config.poll_interval_secs, self.config.ladders
        );

        let mut ticker = interval(Duration::from_secs(self.config.poll_interval_secs.max(1)));

        loop {
            ticker.tick().await;

            if let Err(e) = self.sweep_all().await {
                error!("Error sweeping overdue challenges: {}", e);
            }
        }
    }

    /// Sweep every configured ladder once. A failing ladder is logged and
    /// left out of the result; the others are still swept.
    pub async fn sweep_all(&self) -> anyhow::Result<Vec<(String, SweepReport)>> {
        let engine = self.engine.clone();
        let configured = self.config.ladders.clone();

        let reports = tokio::task::spawn_blocking(move || {
            let ladders = if configured.is_empty() {
                vec![engine.current_ladder()?]
            } else {
                configured
            };

            let now = engine.now();
            let caller = Caller::system();
            let mut reports = Vec::with_capacity(ladders.len());
            for ladder in ladders {
                match engine.sweep(&caller, &ladder, now) {
                    Ok(report) => reports.push((ladder, report)),
                    Err(e) => error!("Failed to sweep {}: {}", ladder, e),
                }
            }
            Ok::<_, anyhow::Error>(reports)
        })
        .await??;

        for (ladder, report) in &reports {
            if report.outcomes.is_empty() {
                debug!("No overdue challenges in {}", ladder);
                continue;
            }
            info!(
                "Swept {}: {} challenges timed out",
                ladder,
                report.outcomes.len()
            );
            for kicked in &report.kicked {
                warn!("{} kicked from {} for too many strikes", kicked, ladder);
            }
        }
        Ok(reports)
    }
}

/// Start the sweep monitor in background
pub fn spawn_sweep_monitor<S: LadderStore + 'static>(
    engine: Arc<LadderEngine<S>>,
    config: SweepMonitorConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let monitor = SweepMonitor::new(engine, config);
        monitor.run().await;
    })
}

//! Scheduled conversion-rate recalculation
//!
//! Optional background repair pass, decoupled from the lead write path.
//! Disabled unless `recalc_interval_secs` is configured.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::reconciliation::PipelineReconciler;

/// Spawn a task that recalculates all conversion rates every `period`
///
/// Failures are logged and the next tick tries again. The first run happens
/// one full period after startup.
pub fn spawn_recalculation_task(reconciler: PipelineReconciler, period: Duration) -> JoinHandle<()> {
    info!("Scheduled conversion-rate recalculation every {:?}", period);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            match reconciler.recalculate_conversion_rates().await {
                Ok(stages) => debug!(stages = stages.len(), "Scheduled recalculation complete"),
                Err(e) => warn!("Scheduled recalculation failed: {}", e),
            }
        }
    })
}

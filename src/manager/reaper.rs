//! Background idle-session reaper

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::process::ProcessController;

use super::dispatcher::SessionManager;

/// Shortest interval between reaper passes
const MIN_REAP_INTERVAL: Duration = Duration::from_secs(1);

/// How often the reaper runs for a given idle timeout
#[must_use]
pub fn reap_interval(idle_timeout: Duration) -> Duration {
    (idle_timeout / 4).max(MIN_REAP_INTERVAL)
}

/// Spawn a task that exits sessions idle longer than `idle_timeout`
///
/// Runs until `stop` is cancelled.
pub fn spawn_idle_reaper<C: ProcessController>(
    manager: Arc<SessionManager<C>>,
    idle_timeout: Duration,
    stop: CancellationToken,
) -> JoinHandle<()> {
    let interval = reap_interval(idle_timeout);
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = tokio::time::sleep(interval) => {}
                () = stop.cancelled() => break,
            }

            match manager.evict_idle(idle_timeout).await {
                Ok(evicted) if !evicted.is_empty() => {
                    log::info!("Reaper evicted {} idle session(s)", evicted.len());
                }
                Ok(_) => {}
                Err(e) => log::warn!("Reaper pass failed: {e}"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_is_a_quarter_of_the_timeout() {
        assert_eq!(reap_interval(Duration::from_secs(60)), Duration::from_secs(15));
        assert_eq!(reap_interval(Duration::from_millis(100)), MIN_REAP_INTERVAL);
    }
}

//! Status processor: the single writer of record health state.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::health::CheckResult;
use crate::metrics;
use crate::store::{Applied, RecordStore};

/// Consumes check results in arrival order and applies them to the store.
///
/// Because this loop is the only caller of [`RecordStore::apply`], status
/// updates never race with each other; the responder only reads.
pub struct StatusProcessor {
    store: RecordStore,
    results: mpsc::Receiver<CheckResult>,
}

impl StatusProcessor {
    /// Create a processor for the given store and result channel.
    pub fn new(store: RecordStore, results: mpsc::Receiver<CheckResult>) -> Self {
        Self { store, results }
    }

    /// Process results until the channel closes or the token is cancelled.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("Starting status processor");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    debug!("status processor shutting down");
                    return;
                }

                result = self.results.recv() => match result {
                    Some(result) => {
                        self.process(result);
                    }
                    None => {
                        debug!("check result channel closed");
                        return;
                    }
                }
            }
        }
    }

    /// Apply one result and log any state transition.
    pub fn process(&self, result: CheckResult) -> Applied {
        let applied = self.store.apply(&result);

        match &applied {
            Applied::Changed { record, enabled } => {
                info!(
                    id = %result.id,
                    "Status change for {} to {}",
                    record,
                    up_down(*enabled)
                );
                metrics::record_transition(*enabled);
            }
            Applied::Unchanged => {
                trace!(id = %result.id, success = result.success, "status unchanged");
            }
            Applied::UnknownId => {
                warn!(id = %result.id, "Dropping check result for unknown record");
            }
        }

        applied
    }
}

fn up_down(enabled: bool) -> &'static str {
    if enabled {
        "UP"
    } else {
        "DOWN"
    }
}

//! Confirmation dialogs for destructive commands

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

/// How long a dialog waits for a button press
pub const CONFIRM_TIMEOUT: Duration = Duration::from_secs(60);

const CONFIRM_PREFIX: &str = "confirm:";
const CANCEL_PREFIX: &str = "cancel:";

/// Final state of a dialog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Confirmed,
    Cancelled,
    TimedOut,
}

/// Button ids for a dialog
pub fn button_ids(id: &str) -> (String, String) {
    (
        format!("{}{}", CONFIRM_PREFIX, id),
        format!("{}{}", CANCEL_PREFIX, id),
    )
}

/// Split a button id into `(dialog id, confirmed)`
pub fn parse_button_id(custom_id: &str) -> Option<(&str, bool)> {
    if let Some(id) = custom_id.strip_prefix(CONFIRM_PREFIX) {
        return Some((id, true));
    }
    custom_id.strip_prefix(CANCEL_PREFIX).map(|id| (id, false))
}

/// Pending dialogs keyed by correlation id
#[derive(Clone, Default)]
pub struct ConfirmRegistry {
    pending: Arc<Mutex<HashMap<String, oneshot::Sender<bool>>>>,
}

impl ConfirmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, oneshot::Sender<bool>>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open a dialog; the receiver completes when it is resolved
    pub fn open(&self, id: &str) -> oneshot::Receiver<bool> {
        let (tx, rx) = oneshot::channel();
        if self.lock().insert(id.to_string(), tx).is_some() {
            debug!(id = %id, "Replaced pending confirmation");
        }
        rx
    }

    /// Resolve a pending dialog
    ///
    /// Returns `false` for an unknown or already resolved id.
    pub fn resolve(&self, id: &str, confirmed: bool) -> bool {
        let Some(tx) = self.lock().remove(id) else {
            return false;
        };
        tx.send(confirmed).is_ok()
    }

    /// Wait for the dialog to be resolved, or give up after `timeout`
    pub async fn await_decision(
        &self,
        id: &str,
        rx: oneshot::Receiver<bool>,
        timeout: Duration,
    ) -> Decision {
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(true)) => Decision::Confirmed,
            Ok(Ok(false)) | Ok(Err(_)) => Decision::Cancelled,
            Err(_) => {
                self.lock().remove(id);
                debug!(id = %id, "Confirmation timed out");
                Decision::TimedOut
            }
        }
    }

    #[cfg(test)]
    pub fn pending(&self) -> usize {
        self.lock().len()
    }
}

//! Host-side registration of the window action catalog
//!
//! Actions are registered while Rectangle is detected, and only on macOS
//! unless the configuration lifts that requirement.

use crate::macos::is_macos;
use crate::models::WindowAction;
use crate::services::detection::DetectionState;
use crate::services::notifications::{messages, Notification, Notifier};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegistrationOutcome {
    Registered(usize),
    AlreadyRegistered,
    NotDetected,
    UnsupportedPlatform,
}

pub struct ActionRegistry {
    registered: RwLock<BTreeSet<String>>,
    require_macos: bool,
    notifier: Arc<dyn Notifier>,
    unsupported_notified: AtomicBool,
}

impl ActionRegistry {
    pub fn new(notifier: Arc<dyn Notifier>, require_macos: bool) -> Self {
        Self {
            registered: RwLock::new(BTreeSet::new()),
            require_macos,
            notifier,
            unsupported_notified: AtomicBool::new(false),
        }
    }

    /// Register the whole catalog if `state` says Rectangle is there.
    /// Calling it again with everything registered changes nothing.
    pub fn sync(&self, state: &DetectionState) -> RegistrationOutcome {
        if self.require_macos && !is_macos() {
            if !self.unsupported_notified.swap(true, Ordering::SeqCst) {
                self.notifier
                    .notify(Notification::error(messages::NOT_AVAILABLE));
            }
            return RegistrationOutcome::UnsupportedPlatform;
        }
        if !state.detected() {
            return RegistrationOutcome::NotDetected;
        }

        let mut registered = self.registered.write().unwrap_or_else(|e| e.into_inner());
        let before = registered.len();
        registered.extend(WindowAction::all().map(WindowAction::action_id));
        let added = registered.len() - before;

        if added == 0 {
            RegistrationOutcome::AlreadyRegistered
        } else {
            info!(added, "Registered Rectangle actions");
            RegistrationOutcome::Registered(added)
        }
    }

    /// Drop every registration, returning how many there were
    pub fn unregister_all(&self) -> usize {
        let mut registered = self.registered.write().unwrap_or_else(|e| e.into_inner());
        let count = registered.len();
        registered.clear();
        if count > 0 {
            info!(count, "Unregistered Rectangle actions");
        }
        count
    }

    pub fn is_registered(&self, action_id: &str) -> bool {
        self.registered
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(action_id)
    }

    pub fn registered_ids(&self) -> Vec<String> {
        self.registered
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// Sync on every state change until `cancel` fires
    pub async fn watch(&self, mut state: watch::Receiver<DetectionState>, cancel: &CancellationToken) {
        loop {
            let current = state.borrow_and_update().clone();
            if !current.is_unknown() {
                let outcome = self.sync(&current);
                debug!(?outcome, generation = current.generation, "Registration synced");
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("require_macos", &self.require_macos)
            .field("registered", &self.registered_ids().len())
            .finish_non_exhaustive()
    }
}

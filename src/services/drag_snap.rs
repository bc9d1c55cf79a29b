//! Drag-snap suggestion for the host application
//!
//! Ignoring an app in Rectangle also disables drag-to-snap for it unless
//! `ignoreDragSnapToo` is turned off. Each time a Rectangle version is
//! detected the user is offered to turn it off, optionally ignoring the host
//! application in the same step.

use crate::macos::BundleIdResolver;
use crate::models::{AppVersion, IgnoreDragSnapToo, RectangleTask, APP_BUNDLE_ID_PARAM};
use crate::retry::{retry, RetryPolicy};
use crate::services::defaults::{DefaultsOp, RectangleDefaults};
use crate::services::detection::DetectionState;
use crate::services::notifications::{messages, Notification, Notifier, SuggestedAction};
use crate::services::remote::{RemoteInvoker, RemoteTarget};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{watch, OnceCell};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct DragSnapAdvisor {
    defaults: Arc<RectangleDefaults>,
    invoker: RemoteInvoker,
    notifier: Arc<dyn Notifier>,
    resolver: BundleIdResolver,
    host_app: Option<PathBuf>,
    retry: RetryPolicy,
    host_bundle_id: OnceCell<Option<String>>,
}

impl DragSnapAdvisor {
    pub fn new(
        defaults: Arc<RectangleDefaults>,
        invoker: RemoteInvoker,
        notifier: Arc<dyn Notifier>,
        resolver: BundleIdResolver,
        host_app: Option<PathBuf>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            defaults,
            invoker,
            notifier,
            resolver,
            host_app,
            retry,
            host_bundle_id: OnceCell::new(),
        }
    }

    /// Display name of the host, `IntelliJ IDEA` for `/Applications/IntelliJ IDEA.app`
    pub fn host_name(&self) -> String {
        self.host_app
            .as_deref()
            .and_then(|path| path.file_stem())
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "this application".to_string())
    }

    /// Bundle id of the host application, resolved once
    pub async fn host_bundle_id(&self) -> Option<String> {
        self.host_bundle_id
            .get_or_init(|| async {
                let path = self.host_app.as_deref()?;
                match retry(&self.retry, |_| true, || self.resolver.require(path)).await {
                    Ok(bundle_id) => Some(bundle_id),
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "Host bundle id unavailable");
                        None
                    }
                }
            })
            .await
            .clone()
    }

    /// Offer to allow drag-snap for ignored apps unless it already is.
    /// Returns the notification that was sent, if any.
    pub async fn suggest(&self, version: &AppVersion) -> Option<Notification> {
        let current = self.defaults.read(IgnoreDragSnapToo).await;
        if current.value() == Some(&false) {
            debug!("Drag-snap already allowed for ignored apps");
            return None;
        }

        let mut notification = Notification::info(messages::drag_snap_ignored(&self.host_name()));
        if version.supports_ignore_app_task() {
            if let Some(bundle_id) = self.host_bundle_id().await {
                notification = notification.with_action(SuggestedAction::AllowDragSnapForIgnoredApps {
                    also_ignore_app: Some(bundle_id),
                });
            }
        }
        notification = notification.with_action(SuggestedAction::AllowDragSnapForIgnoredApps {
            also_ignore_app: None,
        });

        self.notifier.notify(notification.clone());
        Some(notification)
    }

    /// Apply the suggestion: optionally ignore `also_ignore_app`, then turn
    /// `ignoreDragSnapToo` off. Returns whether the setting was written.
    pub async fn apply(&self, also_ignore_app: Option<String>, cancel: &CancellationToken) -> bool {
        if let Some(bundle_id) = also_ignore_app {
            let target = RemoteTarget::Task {
                task: RectangleTask::IgnoreApp,
                params: vec![(APP_BUNDLE_ID_PARAM.to_string(), bundle_id)],
            };
            if let Err(err) = self.invoker.invoke(&target, cancel).await {
                debug!(error = %err, "ignore-app interrupted");
                return false;
            }
        }

        let written = self.defaults.write(IgnoreDragSnapToo, false).await;
        if written.is_successful() {
            info!("Drag-snap allowed for ignored apps");
            self.notifier
                .notify(Notification::info(messages::DRAG_SNAP_ENABLED));
        }
        written.is_successful()
    }

    /// Suggest once for every newly detected version until `cancel` fires
    pub async fn watch(&self, mut state: watch::Receiver<DetectionState>, cancel: &CancellationToken) {
        let mut last: Option<AppVersion> = None;
        loop {
            let version = state.borrow_and_update().version.clone();
            match version {
                Some(version) if last.as_ref() != Some(&version) => {
                    last = Some(version.clone());
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = self.suggest(&version) => {}
                    }
                }
                Some(_) => {}
                None => last = None,
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

impl std::fmt::Debug for DragSnapAdvisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DragSnapAdvisor")
            .field("host_app", &self.host_app)
            .finish_non_exhaustive()
    }
}

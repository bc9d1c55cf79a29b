//! Application detection
//!
//! A single background loop decides whether Rectangle is installed, where, and
//! which version. Results go to a `watch` channel: one writer (the loop), any
//! number of readers, and late subscribers immediately see the latest state.

use crate::command::CommandRunner;
use crate::config::{AppConfig, BridgeConfig};
use crate::lifecycle::TaskScope;
use crate::macos::{BundleIdResolver, MetadataQuery, ProcessScanner, VERSION_ATTRIBUTE};
use crate::models::AppVersion;
use crate::retry::{retry, RetryPolicy};
use crate::services::installer::is_executable;
use crate::services::notifications::{messages, Notification, Notifier, SuggestedAction};
use crate::BridgeError;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Latest detection outcome. `generation` counts completed checks, so `0`
/// means no check has finished yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DetectionState {
    pub installed_path: Option<PathBuf>,
    pub version: Option<AppVersion>,
    pub generation: u64,
}

impl DetectionState {
    /// Rectangle counts as detected once its version is known
    pub fn detected(&self) -> bool {
        self.version.is_some()
    }

    pub fn is_unknown(&self) -> bool {
        self.generation == 0
    }
}

/// Finds the Rectangle bundle and reads its version
pub struct AppLocator {
    runner: Arc<dyn CommandRunner>,
    resolver: BundleIdResolver,
    scanner: ProcessScanner,
    query: MetadataQuery,
    app: AppConfig,
    retry: RetryPolicy,
}

impl AppLocator {
    pub fn new(runner: Arc<dyn CommandRunner>, config: &BridgeConfig) -> Self {
        let timeout = config.commands.timeout();
        let query = MetadataQuery::new(&config.tools.mdls).with_timeout(timeout);

        Self {
            resolver: BundleIdResolver::new(runner.clone(), query.clone()),
            scanner: ProcessScanner::new(&config.tools.ps).with_timeout(timeout),
            query,
            runner,
            app: config.app.clone(),
            retry: config.detection.retry.clone(),
        }
    }

    /// Path of the Rectangle bundle, checking the default install location
    /// first and running processes second. A candidate whose bundle id is not
    /// Rectangle's is discarded.
    pub async fn locate(&self, cancel: &CancellationToken) -> Result<Option<PathBuf>, BridgeError> {
        let candidate = match self.default_location().await? {
            Some(path) => Some(path),
            None => self.running_location(cancel).await?,
        };

        let Some(path) = candidate else {
            return Ok(None);
        };

        if self.has_expected_bundle_id(&path).await? {
            Ok(Some(path))
        } else {
            Ok(None)
        }
    }

    async fn default_location(&self) -> Result<Option<PathBuf>, BridgeError> {
        let path = &self.app.install_path;
        let exists = retry(&self.retry, |_| true, || async {
            tokio::fs::try_exists(path).await.map_err(|err| {
                BridgeError::NotFound(format!("cannot access {}: {err}", path.display()))
            })
        })
        .await;

        match exists {
            Ok(true) => Ok(Some(path.clone())),
            Ok(false) => Ok(None),
            Err(err) if err.is_cancelled() => Err(err),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Failed to check default install location");
                Ok(None)
            }
        }
    }

    async fn running_location(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<PathBuf>, BridgeError> {
        let found = retry(&self.retry, |_| true, || {
            self.scanner
                .find_running_bundle(self.runner.as_ref(), &self.app.bundle_name, cancel)
        })
        .await;

        match found {
            Ok(path) => Ok(path),
            Err(err) if err.is_cancelled() => Err(err),
            Err(err) => {
                warn!(error = %err, "Failed to scan running processes");
                Ok(None)
            }
        }
    }

    async fn has_expected_bundle_id(&self, path: &Path) -> Result<bool, BridgeError> {
        match retry(&self.retry, |_| true, || self.resolver.require(path)).await {
            Ok(bundle_id) if bundle_id == self.app.bundle_id => Ok(true),
            Ok(bundle_id) => {
                info!(path = %path.display(), %bundle_id, "Bundle is not Rectangle");
                Ok(false)
            }
            Err(err) if err.is_cancelled() => Err(err),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Failed to resolve bundle id");
                Ok(false)
            }
        }
    }

    /// Version reported by Spotlight. `Ok(None)` when the index has no value;
    /// an unparsable value is a [`BridgeError::Parse`].
    pub async fn version(&self, path: &Path) -> Result<Option<AppVersion>, BridgeError> {
        let raw = self
            .query
            .attribute(self.runner.as_ref(), path, VERSION_ATTRIBUTE)
            .await?;

        raw.map(|raw| AppVersion::parse(&raw).map_err(|err| BridgeError::Parse(err.to_string())))
            .transpose()
    }
}

impl std::fmt::Debug for AppLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppLocator")
            .field("install_path", &self.app.install_path)
            .field("bundle_id", &self.app.bundle_id)
            .finish_non_exhaustive()
    }
}

/// Read side of the detection state, cheap to clone
#[derive(Debug, Clone)]
pub struct DetectionHandle {
    state: watch::Receiver<DetectionState>,
    refresh: Arc<Notify>,
}

impl DetectionHandle {
    pub fn current(&self) -> DetectionState {
        self.state.borrow().clone()
    }

    pub fn is_detected(&self) -> bool {
        self.state.borrow().detected()
    }

    /// A receiver that starts with the latest state
    pub fn subscribe(&self) -> watch::Receiver<DetectionState> {
        self.state.clone()
    }

    /// Ask the loop for a check now. Requests made while a check runs
    /// collapse into one extra check.
    pub fn refresh(&self) {
        self.refresh.notify_one();
    }

    /// Wait for the first check completed after `generation`
    pub async fn wait_for_check_after(&self, generation: u64) -> Result<DetectionState, BridgeError> {
        let mut state = self.state.clone();
        let current = state
            .wait_for(|state| state.generation > generation)
            .await
            .map_err(|_| BridgeError::Cancelled)?;
        Ok(current.clone())
    }
}

/// Owns the detection loop and the writer side of the state channel
pub struct DetectionService {
    locator: AppLocator,
    notifier: Arc<dyn Notifier>,
    website_url: String,
    brew: PathBuf,
    interval: Duration,
    state: watch::Sender<DetectionState>,
    refresh: Arc<Notify>,
    cycle_lock: Mutex<()>,
    started: AtomicBool,
    absent_notified: AtomicBool,
    version_failure_notified: AtomicBool,
}

impl DetectionService {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        notifier: Arc<dyn Notifier>,
        config: &BridgeConfig,
    ) -> Self {
        let (state, _) = watch::channel(DetectionState::default());

        Self {
            locator: AppLocator::new(runner, config),
            notifier,
            website_url: config.app.website_url.clone(),
            brew: config.tools.brew.clone(),
            interval: config.detection.interval(),
            state,
            refresh: Arc::new(Notify::new()),
            cycle_lock: Mutex::new(()),
            started: AtomicBool::new(false),
            absent_notified: AtomicBool::new(false),
            version_failure_notified: AtomicBool::new(false),
        }
    }

    pub fn handle(&self) -> DetectionHandle {
        DetectionHandle {
            state: self.state.subscribe(),
            refresh: self.refresh.clone(),
        }
    }

    pub fn current(&self) -> DetectionState {
        self.state.borrow().clone()
    }

    /// Spawn the detection loop on `scope`. A service runs at most one loop.
    pub fn start(self: &Arc<Self>, scope: &TaskScope) -> Result<JoinHandle<Option<()>>, BridgeError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(BridgeError::Configuration(
                "detection loop already started".to_string(),
            ));
        }

        let service = self.clone();
        let token = scope.token().clone();
        Ok(scope.spawn("detection", async move { service.run(&token).await }))
    }

    /// Check now, then again after every interval or refresh request, until
    /// `cancel` fires. Checks never overlap.
    pub async fn run(&self, cancel: &CancellationToken) {
        info!(interval = ?self.interval, "Detection loop started");
        loop {
            if let Err(err) = self.cycle(cancel).await {
                debug!(error = %err, "Detection check interrupted");
                break;
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => debug!("Periodic detection"),
                _ = self.refresh.notified() => debug!("Detection requested"),
            }
        }
        info!("Detection loop stopped");
    }

    /// One full detection cycle: locate, read the version, publish, notify.
    /// Only for a service whose loop was never started; a running loop is
    /// the only writer, ask it through [`DetectionHandle::refresh`].
    pub async fn check(&self, cancel: &CancellationToken) -> Result<DetectionState, BridgeError> {
        if self.started.load(Ordering::SeqCst) {
            return Err(BridgeError::Configuration(
                "detection loop is running, request a refresh instead".to_string(),
            ));
        }
        self.cycle(cancel).await
    }

    /// Only cancellation is reported as an error
    #[instrument(skip_all, name = "detection_check")]
    async fn cycle(&self, cancel: &CancellationToken) -> Result<DetectionState, BridgeError> {
        let _writer = self.cycle_lock.lock().await;
        let (installed_path, version) = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BridgeError::Cancelled),
            found = self.detect(cancel) => found?,
        };

        self.state.send_modify(|state| {
            state.installed_path = installed_path;
            state.version = version;
            state.generation += 1;
        });
        let state = self.current();
        info!(
            path = ?state.installed_path,
            version = ?state.version.as_ref().map(ToString::to_string),
            detected = state.detected(),
            "Detection finished"
        );

        self.notify_if_absent(&state);
        Ok(state)
    }

    async fn detect(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(Option<PathBuf>, Option<AppVersion>), BridgeError> {
        let Some(path) = self.locator.locate(cancel).await? else {
            return Ok((None, None));
        };

        let version = match self.locator.version(&path).await {
            Ok(version) => {
                self.version_failure_notified.store(false, Ordering::SeqCst);
                if version.is_none() {
                    warn!(path = %path.display(), "Spotlight has no version for Rectangle");
                }
                version
            }
            Err(BridgeError::Parse(reason)) => {
                warn!(path = %path.display(), %reason, "Unparsable Rectangle version");
                None
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Failed to detect Rectangle version");
                if !self.version_failure_notified.swap(true, Ordering::SeqCst) {
                    self.notifier
                        .notify(Notification::error(messages::DETECT_VERSION_FAILED));
                }
                None
            }
        };

        Ok((Some(path), version))
    }

    fn notify_if_absent(&self, state: &DetectionState) {
        if state.installed_path.is_some() {
            self.absent_notified.store(false, Ordering::SeqCst);
            return;
        }
        if self.absent_notified.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("Rectangle not found");
        let mut notification = Notification::error(messages::NOT_FOUND).with_action(
            SuggestedAction::OpenWebsite {
                url: self.website_url.clone(),
            },
        );
        if is_executable(&self.brew) {
            notification = notification.with_action(SuggestedAction::BrewInstall);
        }
        self.notifier.notify(notification);
    }
}

impl std::fmt::Debug for DetectionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectionService")
            .field("locator", &self.locator)
            .field("interval", &self.interval)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

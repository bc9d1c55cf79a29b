//! Application lifecycle for rectangle-bridge
//!
//! [`RectangleBridge`] wires every service to one command runner and one
//! notifier, owns the root [`TaskScope`], and starts or stops the background
//! work explicitly.

pub mod scope;

pub use scope::TaskScope;

use crate::{
    command::{CommandRunner, SystemCommandRunner},
    config::BridgeConfig,
    macos::{BundleIdResolver, MetadataQuery},
    services::{
        ActionRegistry, BrewInstaller, DetectionHandle, DetectionService, DragSnapAdvisor,
        LogNotifier, Notifier, RectangleDefaults, RemoteInvoker, SuggestedAction,
    },
    BridgeError, Result,
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tokio::signal;
use tracing::{debug, info, instrument, warn};

/// How long [`RectangleBridge::shutdown`] waits for background tasks
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Composition root
pub struct RectangleBridge {
    config: BridgeConfig,
    scope: TaskScope,
    notifier: Arc<dyn Notifier>,
    detection: Arc<DetectionService>,
    invoker: RemoteInvoker,
    defaults: Arc<RectangleDefaults>,
    installer: Arc<BrewInstaller>,
    drag_snap: Arc<DragSnapAdvisor>,
    registry: Arc<ActionRegistry>,
    started: AtomicBool,
}

impl RectangleBridge {
    pub fn new(
        config: BridgeConfig,
        runner: Arc<dyn CommandRunner>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let scope = TaskScope::new("rectangle-bridge");
        let timeout = config.commands.timeout();

        let detection = Arc::new(DetectionService::new(
            runner.clone(),
            notifier.clone(),
            &config,
        ));
        let invoker = RemoteInvoker::new(
            runner.clone(),
            notifier.clone(),
            &config.tools.open,
            config.app.url_scheme.clone(),
            timeout,
            scope.child("remote"),
        );
        let defaults = Arc::new(RectangleDefaults::new(
            runner.clone(),
            notifier.clone(),
            &config.tools.defaults,
            config.app.defaults_domain.clone(),
            timeout,
        ));
        let installer = Arc::new(BrewInstaller::new(
            runner.clone(),
            notifier.clone(),
            &config.tools.brew,
            config.commands.install_timeout(),
        ));
        let resolver = BundleIdResolver::new(
            runner,
            MetadataQuery::new(&config.tools.mdls).with_timeout(timeout),
        );
        let drag_snap = Arc::new(DragSnapAdvisor::new(
            defaults.clone(),
            invoker.clone(),
            notifier.clone(),
            resolver,
            config.host.app_path.clone(),
            config.detection.retry.clone(),
        ));
        let registry = Arc::new(ActionRegistry::new(
            notifier.clone(),
            config.host.require_macos,
        ));

        Self {
            config,
            scope,
            notifier,
            detection,
            invoker,
            defaults,
            installer,
            drag_snap,
            registry,
            started: AtomicBool::new(false),
        }
    }

    /// Real processes, notifications written to the log
    pub fn with_system(config: BridgeConfig) -> Self {
        Self::new(
            config,
            Arc::new(SystemCommandRunner::new()),
            Arc::new(LogNotifier),
        )
    }

    /// Start detection and everything reacting to it
    #[instrument(skip_all)]
    pub fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(BridgeError::Configuration("bridge already started".to_string()).into());
        }
        info!("rectangle-bridge v{} starting", env!("CARGO_PKG_VERSION"));

        self.detection.start(&self.scope)?;

        let registry = self.registry.clone();
        let state = self.detection.handle().subscribe();
        let token = self.scope.token().clone();
        self.scope.child("registry").spawn("registry", async move {
            registry.watch(state, &token).await
        });

        if self.config.host.suggest_drag_snap {
            let drag_snap = self.drag_snap.clone();
            let state = self.detection.handle().subscribe();
            let token = self.scope.token().clone();
            self.scope.child("drag-snap").spawn("drag-snap", async move {
                drag_snap.watch(state, &token).await
            });
        }

        debug!("Background tasks started");
        Ok(())
    }

    /// Cancel background work, wait for it to finish, then unregister actions
    #[instrument(skip_all)]
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown...");
        let shutdown_start = Instant::now();

        if !self.scope.shutdown(SHUTDOWN_TIMEOUT).await {
            warn!("Shutdown timeout reached");
        }
        self.registry.unregister_all();

        info!("Shutdown completed in {:?}", shutdown_start.elapsed());
    }

    /// Run a follow-up picked from a notification
    pub async fn perform(&self, action: &SuggestedAction) -> Result<bool> {
        match action {
            SuggestedAction::OpenWebsite { url } => {
                self.invoker.open_url(url).await?;
                Ok(true)
            }
            SuggestedAction::BrewInstall => self.install().await,
            SuggestedAction::AllowDragSnapForIgnoredApps { also_ignore_app } => Ok(self
                .drag_snap
                .apply(also_ignore_app.clone(), self.scope.token())
                .await),
        }
    }

    /// `brew install rectangle`, then re-run detection on success
    pub async fn install(&self) -> Result<bool> {
        let installed = self.installer.install(self.scope.token()).await?;
        if installed {
            self.detection.handle().refresh();
        }
        Ok(installed)
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn scope(&self) -> &TaskScope {
        &self.scope
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    pub fn detection(&self) -> DetectionHandle {
        self.detection.handle()
    }

    pub fn detection_service(&self) -> &Arc<DetectionService> {
        &self.detection
    }

    pub fn invoker(&self) -> &RemoteInvoker {
        &self.invoker
    }

    pub fn defaults(&self) -> &RectangleDefaults {
        &self.defaults
    }

    pub fn installer(&self) -> &BrewInstaller {
        &self.installer
    }

    pub fn drag_snap(&self) -> &DragSnapAdvisor {
        &self.drag_snap
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }
}

impl std::fmt::Debug for RectangleBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RectangleBridge")
            .field("scope", &self.scope.name())
            .field("detection", &self.detection)
            .finish_non_exhaustive()
    }
}

/// Resolves on Ctrl+C, or SIGTERM on unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{InMemoryCommandRunner, ScriptedResponse};
    use crate::services::RecordingNotifier;

    fn bridge(runner: Arc<InMemoryCommandRunner>, notifier: Arc<RecordingNotifier>) -> RectangleBridge {
        let dir = std::env::temp_dir().join("rectangle-bridge-lifecycle-missing");
        let mut config = BridgeConfig::default();
        config.app.install_path = dir.join("Rectangle.app");
        config.tools.brew = dir.join("brew");
        config.host.require_macos = false;
        config.host.suggest_drag_snap = false;
        config.detection.retry.initial_delay = Duration::ZERO;
        config.detection.retry.max_delay = Duration::ZERO;
        RectangleBridge::new(config, runner, notifier)
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let runner = Arc::new(InMemoryCommandRunner::new());
        runner.push_response(&["/bin/ps"], ScriptedResponse::stdout("COMMAND\n"));
        let bridge = bridge(runner, Arc::new(RecordingNotifier::new()));

        bridge.start().unwrap();
        assert!(bridge.start().is_err());

        bridge.shutdown().await;
        assert!(bridge.scope().is_cancelled());
    }

    #[tokio::test]
    async fn test_absent_app_notifies_once_and_registers_nothing() {
        let runner = Arc::new(InMemoryCommandRunner::new());
        runner.push_response(&["/bin/ps"], ScriptedResponse::stdout("COMMAND\n"));
        let notifier = Arc::new(RecordingNotifier::new());
        let bridge = bridge(runner, notifier.clone());

        bridge.start().unwrap();
        let state = bridge.detection().wait_for_check_after(0).await.unwrap();
        bridge.detection().refresh();
        bridge
            .detection()
            .wait_for_check_after(state.generation)
            .await
            .unwrap();

        assert!(!state.detected());
        assert_eq!(notifier.count_containing("not found"), 1);
        assert!(bridge.registry().registered_ids().is_empty());

        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn test_perform_drag_snap_writes_setting() {
        let runner = Arc::new(InMemoryCommandRunner::new());
        runner.push_response(&["/usr/bin/defaults", "write"], ScriptedResponse::stdout(""));
        let bridge = bridge(runner.clone(), Arc::new(RecordingNotifier::new()));

        let applied = bridge
            .perform(&SuggestedAction::AllowDragSnapForIgnoredApps {
                also_ignore_app: None,
            })
            .await
            .unwrap();

        assert!(applied);
        assert_eq!(runner.count_matching(&["/usr/bin/defaults", "write"]), 1);
    }
}

//! User-facing notifications
//!
//! Services never talk to a UI directly; they hand a [`Notification`] to a
//! [`Notifier`]. The host decides how to render it and reports back which
//! [`SuggestedAction`] the user picked.

use serde::Serialize;
use std::sync::Mutex;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Information,
    Error,
}

/// Follow-up the user can trigger from a notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SuggestedAction {
    OpenWebsite { url: String },
    BrewInstall,
    AllowDragSnapForIgnoredApps { also_ignore_app: Option<String> },
}

impl SuggestedAction {
    pub fn label(&self) -> String {
        match self {
            SuggestedAction::OpenWebsite { url } => match website_host(url) {
                Some(host) => format!("Install from {host}"),
                None => "Install from website".to_string(),
            },
            SuggestedAction::BrewInstall => "Install with Homebrew".to_string(),
            SuggestedAction::AllowDragSnapForIgnoredApps {
                also_ignore_app: Some(_),
            } => "Ignore this app and allow drag-snap".to_string(),
            SuggestedAction::AllowDragSnapForIgnoredApps {
                also_ignore_app: None,
            } => "Allow drag-snap for ignored apps".to_string(),
        }
    }
}

/// `https://rectangleapp.com/` -> `rectangleapp.com`
fn website_host(url: &str) -> Option<&str> {
    let (_, rest) = url.split_once("://")?;
    let host = rest.split(['/', '?', '#']).next()?;
    let host = host.strip_prefix("www.").unwrap_or(host);
    (!host.is_empty()).then_some(host)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
    pub actions: Vec<SuggestedAction>,
}

impl Notification {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Information,
            message: message.into(),
            actions: Vec::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Error,
            message: message.into(),
            actions: Vec::new(),
        }
    }

    pub fn with_action(mut self, action: SuggestedAction) -> Self {
        self.actions.push(action);
        self
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the log; used when no UI is attached
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        let actions: Vec<String> = notification.actions.iter().map(SuggestedAction::label).collect();
        match notification.kind {
            NotificationKind::Information => {
                info!(message = %notification.message, ?actions, "Notification")
            }
            NotificationKind::Error => {
                error!(message = %notification.message, ?actions, "Notification")
            }
        }
    }
}

/// Keeps every notification in memory
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notifications: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn count_containing(&self, needle: &str) -> usize {
        self.notifications()
            .iter()
            .filter(|notification| notification.message.contains(needle))
            .count()
    }

    pub fn clear(&self) {
        self.notifications
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.notifications
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(notification);
    }
}

/// Notification texts
pub mod messages {
    pub const TITLE: &str = "Rectangle";
    pub const NOT_FOUND: &str =
        "Rectangle was not found. Install it to arrange windows from this application.";
    pub const DETECT_VERSION_FAILED: &str = "Failed to detect the version of Rectangle.";
    pub const NOT_AVAILABLE: &str = "Rectangle actions are only available on macOS.";
    pub const BREW_INSTALL_FAILED: &str = "Installing Rectangle with Homebrew failed.";
    pub const BREW_INSTALL_SUCCEEDED: &str = "Rectangle was installed with Homebrew.";
    pub const DRAG_SNAP_ENABLED: &str =
        "Drag-snap is now allowed for ignored apps. Rectangle may need a restart to apply it.";

    pub fn defaults_failed(operation: &str) -> String {
        format!("Rectangle settings operation {operation} failed.")
    }

    pub fn run_failed(name: &str) -> String {
        format!("Failed to run Rectangle {name}.")
    }

    pub fn drag_snap_ignored(host_name: &str) -> String {
        format!(
            "Rectangle disables drag-snap for ignored apps. If {host_name} is ignored in Rectangle, \
             windows cannot be snapped by dragging."
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_labels() {
        let notification = Notification::error(messages::NOT_FOUND)
            .with_action(SuggestedAction::OpenWebsite {
                url: "https://rectangleapp.com/".to_string(),
            })
            .with_action(SuggestedAction::BrewInstall);

        assert_eq!(notification.kind, NotificationKind::Error);
        assert_eq!(notification.actions.len(), 2);
        assert_eq!(notification.actions[1].label(), "Install with Homebrew");
    }

    #[test]
    fn test_website_label_follows_configured_url() {
        let label = |url: &str| SuggestedAction::OpenWebsite { url: url.to_string() }.label();

        assert_eq!(label("https://rectangleapp.com/"), "Install from rectangleapp.com");
        assert_eq!(
            label("https://www.example.org/rectangle?ref=bridge"),
            "Install from example.org"
        );
        assert_eq!(label("not a url"), "Install from website");
    }

    #[test]
    fn test_defaults_failure_message_fits_reads_and_writes() {
        for operation in ["read-ignoreDragSnapToo", "write-ignoreDragSnapToo"] {
            let message = messages::defaults_failed(operation);
            assert_eq!(message, format!("Rectangle settings operation {operation} failed."));
            assert!(!message.contains("update"));
        }
    }

    #[test]
    fn test_recording_notifier() {
        let notifier = RecordingNotifier::new();
        notifier.notify(Notification::info("one"));
        notifier.notify(Notification::error(messages::run_failed("left-half")));

        assert_eq!(notifier.notifications().len(), 2);
        assert_eq!(notifier.count_containing("left-half"), 1);

        notifier.clear();
        assert!(notifier.notifications().is_empty());
    }

    #[test]
    fn test_suggested_action_serialization() {
        let json = serde_json::to_value(SuggestedAction::AllowDragSnapForIgnoredApps {
            also_ignore_app: Some("com.example.Host".to_string()),
        })
        .unwrap();

        assert_eq!(json["type"], "allow-drag-snap-for-ignored-apps");
        assert_eq!(json["also_ignore_app"], "com.example.Host");
    }
}

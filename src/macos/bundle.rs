use super::mdls::{MetadataQuery, BUNDLE_IDENTIFIER_ATTRIBUTE};
use crate::command::CommandRunner;
use crate::BridgeError;
use plist::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

const BUNDLE_IDENTIFIER_KEY: &str = "CFBundleIdentifier";

/// Resolves the bundle identifier of an application bundle.
///
/// Spotlight is asked first; when it has no answer the bundle's `Info.plist`
/// is read directly.
#[derive(Clone)]
pub struct BundleIdResolver {
    runner: Arc<dyn CommandRunner>,
    query: MetadataQuery,
}

impl BundleIdResolver {
    pub fn new(runner: Arc<dyn CommandRunner>, query: MetadataQuery) -> Self {
        Self { runner, query }
    }

    pub async fn resolve(&self, app_path: &Path) -> Option<String> {
        match self
            .query
            .attribute(self.runner.as_ref(), app_path, BUNDLE_IDENTIFIER_ATTRIBUTE)
            .await
        {
            Ok(Some(bundle_id)) => return Some(bundle_id),
            Ok(None) => {
                debug!(path = %app_path.display(), "Spotlight has no bundle id, reading Info.plist");
            }
            Err(err) => {
                warn!(path = %app_path.display(), error = %err, "Failed to get bundle id via Spotlight");
            }
        }

        bundle_id_from_info_plist(app_path).await
    }

    /// Like [`resolve`](Self::resolve) but reports an absent id as an error,
    /// which makes it usable with [`retry`](crate::retry::retry)
    pub async fn require(&self, app_path: &Path) -> Result<String, BridgeError> {
        self.resolve(app_path)
            .await
            .ok_or_else(|| BridgeError::NotFound(format!("bundle id of {}", app_path.display())))
    }
}

impl std::fmt::Debug for BundleIdResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleIdResolver")
            .field("query", &self.query)
            .finish_non_exhaustive()
    }
}

/// `Info.plist` at the bundle root, or under `Contents/`
pub fn info_plist_path(app_path: &Path) -> Option<PathBuf> {
    [
        app_path.join("Info.plist"),
        app_path.join("Contents").join("Info.plist"),
    ]
    .into_iter()
    .find(|candidate| candidate.is_file())
}

/// Read `CFBundleIdentifier` from a property list file.
///
/// Both XML and binary plists are accepted. DTDs and external entities are
/// never loaded.
pub fn read_bundle_id(plist_path: &Path) -> Result<Option<String>, BridgeError> {
    let value = Value::from_file(plist_path).map_err(|err| {
        BridgeError::Parse(format!("{}: {err}", plist_path.display()))
    })?;

    Ok(value
        .as_dictionary()
        .and_then(|dict| dict.get(BUNDLE_IDENTIFIER_KEY))
        .and_then(Value::as_string)
        .map(str::trim)
        .filter(|bundle_id| !bundle_id.is_empty())
        .map(str::to_string))
}

/// Fallback lookup through the bundle's `Info.plist`; any failure is `None`
pub async fn bundle_id_from_info_plist(app_path: &Path) -> Option<String> {
    let plist_path = info_plist_path(app_path)?;

    let parsed = tokio::task::spawn_blocking(move || read_bundle_id(&plist_path)).await;
    match parsed {
        Ok(Ok(bundle_id)) => bundle_id,
        Ok(Err(err)) => {
            debug!(error = %err, "Could not read bundle id from Info.plist");
            None
        }
        Err(err) => {
            warn!(error = %err, "Info.plist reader task failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{InMemoryCommandRunner, ScriptedResponse};
    use std::fs;
    use tempfile::TempDir;

    const INFO_PLIST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>CFBundleName</key>
    <string>Rectangle</string>
    <key>CFBundleIdentifier</key>
    <string>com.knollsoft.Rectangle</string>
    <key>CFBundleShortVersionString</key>
    <string>0.85</string>
</dict>
</plist>
"#;

    fn fake_bundle(contents_dir: bool, plist: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        let target = if contents_dir {
            let contents = dir.path().join("Contents");
            fs::create_dir_all(&contents).unwrap();
            contents
        } else {
            dir.path().to_path_buf()
        };
        fs::write(target.join("Info.plist"), plist).unwrap();
        dir
    }

    fn null_spotlight() -> Arc<InMemoryCommandRunner> {
        let runner = Arc::new(InMemoryCommandRunner::new());
        runner.push_response(&["/usr/bin/mdls"], ScriptedResponse::stdout("(null)\n"));
        runner
    }

    #[test]
    fn test_reads_identifier_from_xml_plist() {
        let bundle = fake_bundle(true, INFO_PLIST);
        let path = info_plist_path(bundle.path()).unwrap();
        assert_eq!(
            read_bundle_id(&path).unwrap().as_deref(),
            Some("com.knollsoft.Rectangle")
        );
    }

    #[test]
    fn test_malformed_plist_is_a_parse_error() {
        let bundle = fake_bundle(false, "<plist><dict><key>CFBundleIdentifier</key>");
        let path = info_plist_path(bundle.path()).unwrap();
        assert!(matches!(read_bundle_id(&path), Err(BridgeError::Parse(_))));
    }

    #[tokio::test]
    async fn test_spotlight_answer_wins() {
        let runner = Arc::new(InMemoryCommandRunner::new());
        runner.push_response(&["/usr/bin/mdls"], ScriptedResponse::stdout("com.example.Spotlight\n"));
        let bundle = fake_bundle(true, INFO_PLIST);

        let resolver = BundleIdResolver::new(runner, MetadataQuery::default());
        assert_eq!(
            resolver.resolve(bundle.path()).await.as_deref(),
            Some("com.example.Spotlight")
        );
    }

    #[tokio::test]
    async fn test_null_sentinel_falls_back_to_plist() {
        let bundle = fake_bundle(true, INFO_PLIST);
        let resolver = BundleIdResolver::new(null_spotlight(), MetadataQuery::default());

        let resolved = resolver.resolve(bundle.path()).await;
        assert_eq!(resolved.as_deref(), Some("com.knollsoft.Rectangle"));
    }

    #[tokio::test]
    async fn test_root_level_plist_is_found() {
        let bundle = fake_bundle(false, INFO_PLIST);
        let resolver = BundleIdResolver::new(null_spotlight(), MetadataQuery::default());
        assert!(resolver.resolve(bundle.path()).await.is_some());
    }

    #[tokio::test]
    async fn test_unresolvable_bundle_is_none() {
        let bundle = fake_bundle(true, "not a plist at all");
        let resolver = BundleIdResolver::new(null_spotlight(), MetadataQuery::default());

        assert_eq!(resolver.resolve(bundle.path()).await, None);
        assert!(matches!(
            resolver.require(bundle.path()).await,
            Err(BridgeError::NotFound(_))
        ));

        let empty = TempDir::new().unwrap();
        assert_eq!(resolver.resolve(empty.path()).await, None);
    }
}

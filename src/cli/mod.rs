//! Command-line interface for rectangle-bridge
//!
//! Every subcommand maps onto one bridge operation: detection, window actions,
//! tasks, preference reads and writes, and the Homebrew install.

use crate::{
    config::{default_config_path, BridgeConfig},
    lifecycle::{shutdown_signal, RectangleBridge},
    models::{
        BoolKey, Category, IgnoreDragSnapToo, IntKey, RectangleTask, SettingsKey, WindowAction,
    },
    services::{DefaultsOp, DetectionState, RemoteTarget},
    Result,
};
use anyhow::{anyhow, bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// rectangle-bridge command-line interface
#[derive(Parser, Debug)]
#[command(name = "rectangle-bridge")]
#[command(about = "Detect and drive the Rectangle window manager on macOS")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct BridgeCli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable JSON output for machine-readable results
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one detection check and print the result
    Detect,

    /// Keep detecting and print every state change until interrupted
    Watch,

    /// Window action catalog
    Actions(ActionsCommands),

    /// Ask Rectangle to perform a window action, e.g. `left-half`
    Action {
        name: String,
    },

    /// Ask Rectangle to run a task, e.g. `ignore-app`
    Task {
        name: String,

        /// Task parameter as key=value, repeatable
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },

    /// Read or write Rectangle preferences
    Settings(SettingsCommands),

    /// Install Rectangle with Homebrew
    Install,

    /// Configuration file management
    Config(ConfigCommands),
}

#[derive(Args, Debug)]
pub struct ActionsCommands {
    #[command(subcommand)]
    pub action: ActionsActions,
}

#[derive(Subcommand, Debug)]
pub enum ActionsActions {
    /// List window actions with their host ids
    List {
        /// Only list one category, e.g. `halves`
        #[arg(long)]
        category: Option<String>,
    },
}

#[derive(Args, Debug)]
pub struct SettingsCommands {
    #[command(subcommand)]
    pub action: SettingsActions,
}

#[derive(Subcommand, Debug)]
pub enum SettingsActions {
    /// Read a preference key
    Read {
        key: String,

        /// Value type of keys other than `ignoreDragSnapToo`
        #[arg(long, value_enum, default_value_t = SettingsKind::Bool)]
        kind: SettingsKind,
    },

    /// Write a preference key
    Write {
        key: String,
        value: String,

        #[arg(long, value_enum, default_value_t = SettingsKind::Bool)]
        kind: SettingsKind,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsKind {
    Bool,
    Int,
}

#[derive(Args, Debug)]
pub struct ConfigCommands {
    #[command(subcommand)]
    pub action: ConfigActions,
}

#[derive(Subcommand, Debug)]
pub enum ConfigActions {
    /// Print the effective configuration
    Show,

    /// Print the configuration file path
    Path,

    /// Write the default configuration unless the file exists
    Init,
}

/// Parse `key=value`; the value may itself contain `=`
pub fn parse_param(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{raw}'")),
    }
}

#[derive(Serialize)]
struct ActionRow {
    name: &'static str,
    id: String,
    title: String,
    category: Option<Category>,
    orientable: bool,
}

#[derive(Serialize)]
struct SettingRow<'a, T: Serialize> {
    domain: &'a str,
    key: &'a str,
    value: Option<T>,
    successful: bool,
}

/// CLI command executor
pub struct BridgeCliExecutor {
    bridge: Arc<RectangleBridge>,
    config_path: PathBuf,
    json_output: bool,
}

impl BridgeCliExecutor {
    pub fn new(bridge: Arc<RectangleBridge>, config_path: PathBuf, json_output: bool) -> Self {
        Self {
            bridge,
            config_path,
            json_output,
        }
    }

    /// Execute a CLI command
    pub async fn execute(&self, command: Commands) -> Result<()> {
        debug!(?command, "Executing command");
        match command {
            Commands::Detect => self.detect().await,
            Commands::Watch => self.watch().await,
            Commands::Actions(cmd) => self.execute_actions_command(cmd),
            Commands::Action { name } => {
                let action: WindowAction = name.parse()?;
                self.invoke(RemoteTarget::Action(action)).await
            }
            Commands::Task { name, params } => {
                let task: RectangleTask = name.parse()?;
                self.invoke(RemoteTarget::Task { task, params }).await
            }
            Commands::Settings(cmd) => self.execute_settings_command(cmd).await,
            Commands::Install => self.install().await,
            Commands::Config(cmd) => self.execute_config_command(cmd),
        }
    }

    async fn detect(&self) -> Result<()> {
        let state = self
            .bridge
            .detection_service()
            .check(self.bridge.scope().token())
            .await?;
        self.print_state(&state)
    }

    async fn watch(&self) -> Result<()> {
        self.bridge.start()?;
        let mut states = self.bridge.detection().subscribe();
        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                changed = states.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = states.borrow_and_update().clone();
                    self.print_state(&state)?;
                }
            }
        }

        self.bridge.shutdown().await;
        Ok(())
    }

    fn execute_actions_command(&self, cmd: ActionsCommands) -> Result<()> {
        match cmd.action {
            ActionsActions::List { category } => {
                let category = category
                    .map(|name| {
                        Category::ALL
                            .into_iter()
                            .find(|c| c.to_string().eq_ignore_ascii_case(&name))
                            .ok_or_else(|| anyhow!("Unknown category: {name}"))
                    })
                    .transpose()?;

                let rows: Vec<ActionRow> = WindowAction::all()
                    .filter(|action| category.is_none() || action.category() == category)
                    .map(|action| ActionRow {
                        name: action.name(),
                        id: action.action_id(),
                        title: action.title(),
                        category: action.category(),
                        orientable: action.is_orientable(),
                    })
                    .collect();

                if self.json_output {
                    println!("{}", serde_json::to_string_pretty(&rows)?);
                } else {
                    for row in rows {
                        println!("  {:<28} {:<36} {}", row.name, row.id, row.title);
                    }
                }
            }
        }
        Ok(())
    }

    async fn invoke(&self, target: RemoteTarget) -> Result<()> {
        info!(name = target.name(), "Invoking Rectangle");
        let succeeded = self
            .bridge
            .invoker()
            .invoke(&target, self.bridge.scope().token())
            .await?;

        if !succeeded {
            bail!("Failed to run Rectangle {}", target.name());
        }
        if self.json_output {
            println!(
                "{}",
                serde_json::json!({ "name": target.name(), "url": target.url(&self.bridge.config().app.url_scheme) })
            );
        }
        Ok(())
    }

    async fn execute_settings_command(&self, cmd: SettingsCommands) -> Result<()> {
        match cmd.action {
            SettingsActions::Read { key, kind } => {
                if key == IgnoreDragSnapToo.key() {
                    self.read_setting(IgnoreDragSnapToo).await
                } else {
                    match kind {
                        SettingsKind::Bool => self.read_setting(BoolKey::new(key)).await,
                        SettingsKind::Int => self.read_setting(IntKey::new(key)).await,
                    }
                }
            }
            SettingsActions::Write { key, value, kind } => {
                if key == IgnoreDragSnapToo.key() {
                    let parsed = parse_bool(&value)?;
                    self.write_setting(IgnoreDragSnapToo, parsed).await
                } else {
                    match kind {
                        SettingsKind::Bool => {
                            let parsed = parse_bool(&value)?;
                            self.write_setting(BoolKey::new(key), parsed).await
                        }
                        SettingsKind::Int => {
                            let parsed: i64 = value
                                .parse()
                                .with_context(|| format!("'{value}' is not an integer"))?;
                            self.write_setting(IntKey::new(key), parsed).await
                        }
                    }
                }
            }
        }
    }

    async fn read_setting<K>(&self, key: K) -> Result<()>
    where
        K: SettingsKey,
        K::Value: Serialize,
    {
        let name = key.key().to_string();
        let op = self.bridge.defaults().read(key).await;
        if !op.is_successful() {
            bail!("Failed to read {name}");
        }

        let row = SettingRow {
            domain: self.bridge.defaults().domain(),
            key: &name,
            value: op.value(),
            successful: true,
        };
        if self.json_output {
            println!("{}", serde_json::to_string_pretty(&row)?);
        } else if let Some(value) = op.value() {
            println!("{name} = {value:?}");
        }
        Ok(())
    }

    async fn write_setting<K>(&self, key: K, value: K::Value) -> Result<()>
    where
        K: SettingsKey,
        K::Value: Serialize,
    {
        let name = key.key().to_string();
        let op = self.bridge.defaults().write(key, value).await;
        if !op.is_successful() {
            bail!("Failed to write {name}");
        }

        if self.json_output {
            let row = SettingRow {
                domain: self.bridge.defaults().domain(),
                key: &name,
                value: Some(op.value()),
                successful: true,
            };
            println!("{}", serde_json::to_string_pretty(&row)?);
        } else {
            println!("{name} updated");
        }
        Ok(())
    }

    async fn install(&self) -> Result<()> {
        let installer = self.bridge.installer();
        if !installer.is_available() {
            bail!(
                "Homebrew not found at {}, install Rectangle from {}",
                installer.brew_path().display(),
                self.bridge.config().app.website_url
            );
        }
        if !self.bridge.install().await? {
            bail!("brew install rectangle failed");
        }
        println!("Rectangle installed");
        Ok(())
    }

    fn execute_config_command(&self, cmd: ConfigCommands) -> Result<()> {
        match cmd.action {
            ConfigActions::Show => {
                let config = self.bridge.config();
                if self.json_output {
                    println!("{}", serde_json::to_string_pretty(config)?);
                } else {
                    println!("{}", toml::to_string_pretty(config)?);
                }
            }
            ConfigActions::Path => println!("{}", self.config_path.display()),
            ConfigActions::Init => {
                if self.config_path.exists() {
                    bail!("{} already exists", self.config_path.display());
                }
                BridgeConfig::default().save(&self.config_path)?;
                println!("Wrote {}", self.config_path.display());
            }
        }
        Ok(())
    }

    fn print_state(&self, state: &DetectionState) -> Result<()> {
        if self.json_output {
            println!(
                "{}",
                serde_json::json!({
                    "detected": state.detected(),
                    "installed_path": state.installed_path,
                    "version": state.version,
                    "generation": state.generation,
                })
            );
        } else if let (Some(path), Some(version)) = (&state.installed_path, &state.version) {
            println!("Rectangle {version} at {}", path.display());
        } else if let Some(path) = &state.installed_path {
            println!("Rectangle at {} (version unknown)", path.display());
        } else {
            println!("Rectangle not found");
        }
        Ok(())
    }
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(anyhow!("'{raw}' is not a boolean")),
    }
}

/// Load configuration for `cli` and run its command
pub async fn run_cli(cli: BridgeCli) -> Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = BridgeConfig::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    config.apply_env_overrides();
    config.validate()?;

    let bridge = Arc::new(RectangleBridge::with_system(config));
    let executor = BridgeCliExecutor::new(bridge, config_path, cli.json);
    executor.execute(cli.command).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{InMemoryCommandRunner, ScriptedResponse};
    use crate::services::RecordingNotifier;

    fn executor(runner: Arc<InMemoryCommandRunner>, dir: &std::path::Path) -> BridgeCliExecutor {
        let mut config = BridgeConfig::default();
        config.app.install_path = dir.join("Rectangle.app");
        config.tools.brew = dir.join("brew");
        let bridge = RectangleBridge::new(config, runner, Arc::new(RecordingNotifier::new()));
        BridgeCliExecutor::new(Arc::new(bridge), dir.join("config.toml"), true)
    }

    #[test]
    fn test_cli_parsing() {
        let cli = BridgeCli::try_parse_from(["rectangle-bridge", "action", "left-half"]).unwrap();
        match cli.command {
            Commands::Action { name } => assert_eq!(name, "left-half"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_flags() {
        let cli = BridgeCli::try_parse_from([
            "rectangle-bridge",
            "detect",
            "--verbose",
            "--json",
            "--config",
            "/tmp/bridge.toml",
        ])
        .unwrap();

        assert!(cli.verbose);
        assert!(cli.json);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/bridge.toml")));
    }

    #[test]
    fn test_task_params() {
        let cli = BridgeCli::try_parse_from([
            "rectangle-bridge",
            "task",
            "ignore-app",
            "--param",
            "app-bundle-id=com.example.App",
            "-p",
            "note=a=b",
        ])
        .unwrap();

        match cli.command {
            Commands::Task { name, params } => {
                assert_eq!(name, "ignore-app");
                assert_eq!(
                    params,
                    vec![
                        ("app-bundle-id".to_string(), "com.example.App".to_string()),
                        ("note".to_string(), "a=b".to_string()),
                    ]
                );
            }
            other => panic!("unexpected command: {other:?}"),
        }

        assert!(BridgeCli::try_parse_from(["rectangle-bridge", "task", "ignore-app", "-p", "novalue"]).is_err());
    }

    #[test]
    fn test_settings_commands() {
        let cli = BridgeCli::try_parse_from([
            "rectangle-bridge",
            "settings",
            "write",
            "almostMaximizeHeight",
            "90",
            "--kind",
            "int",
        ])
        .unwrap();

        match cli.command {
            Commands::Settings(SettingsCommands {
                action: SettingsActions::Write { key, value, kind },
            }) => {
                assert_eq!(key, "almostMaximizeHeight");
                assert_eq!(value, "90");
                assert_eq!(kind, SettingsKind::Int);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("YES").unwrap());
        assert!(!parse_bool("0").unwrap());
        assert!(parse_bool("maybe").is_err());
    }

    #[tokio::test]
    async fn test_unknown_action_is_rejected_before_running() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(InMemoryCommandRunner::new());

        let result = executor(runner.clone(), dir.path())
            .execute(Commands::Action {
                name: "upside-down".to_string(),
            })
            .await;

        assert!(result.is_err());
        assert!(runner.invocations().is_empty());
    }

    #[tokio::test]
    async fn test_failed_action_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(InMemoryCommandRunner::new());
        runner.push_response(&["/usr/bin/open"], ScriptedResponse::failure(1, ""));

        let result = executor(runner, dir.path())
            .execute(Commands::Action {
                name: "left-half".to_string(),
            })
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_settings_write_runs_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(InMemoryCommandRunner::new());
        runner.push_response(&["/usr/bin/defaults", "write"], ScriptedResponse::stdout(""));

        executor(runner.clone(), dir.path())
            .execute(Commands::Settings(SettingsCommands {
                action: SettingsActions::Write {
                    key: "ignoreDragSnapToo".to_string(),
                    value: "false".to_string(),
                    kind: SettingsKind::Bool,
                },
            }))
            .await
            .unwrap();

        let tokens = runner.invocations()[0].tokens();
        assert_eq!(tokens[3..], ["ignoreDragSnapToo", "-int", "2"]);
    }

    #[tokio::test]
    async fn test_config_init_writes_once() {
        let dir = tempfile::tempdir().unwrap();
        let executor = executor(Arc::new(InMemoryCommandRunner::new()), dir.path());
        let init = || Commands::Config(ConfigCommands {
            action: ConfigActions::Init,
        });

        executor.execute(init()).await.unwrap();
        assert!(dir.path().join("config.toml").exists());
        assert!(executor.execute(init()).await.is_err());
    }
}

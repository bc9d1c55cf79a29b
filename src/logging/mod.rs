//! Structured logging configuration for rectangle-bridge

use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;
use tracing_subscriber::{
    fmt::{self, time::UtcTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

const ENV_PREFIX: &str = "RECTANGLE_BRIDGE_LOG";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Logging configuration for rectangle-bridge
#[derive(Debug, Clone, PartialEq)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Required for file output
    pub file_path: Option<PathBuf>,
    /// Include source file and line numbers
    pub include_source: bool,
    /// Trace every process invocation
    pub trace_commands: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(format!("Invalid log level: {}", s)),
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Invalid log format: {}", s)),
        }
    }
}

/// Log destinations. Logs go to stderr by default so command output on
/// stdout stays machine readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Stderr,
    Stdout,
    File,
    /// Stderr and file
    Both,
}

impl FromStr for LogOutput {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stderr" => Ok(LogOutput::Stderr),
            "stdout" => Ok(LogOutput::Stdout),
            "file" => Ok(LogOutput::File),
            "both" => Ok(LogOutput::Both),
            _ => Err(format!("Invalid log output: {}", s)),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Warn,
            format: LogFormat::Compact,
            output: LogOutput::Stderr,
            file_path: None,
            include_source: false,
            trace_commands: false,
        }
    }
}

impl LogConfig {
    /// Configuration behind `--verbose`
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            format: LogFormat::Pretty,
            include_source: true,
            ..Self::default()
        }
    }

    /// Defaults overridden by `RECTANGLE_BRIDGE_LOG_*` variables
    pub fn from_env() -> Self {
        Self::default().with_overrides(|name| std::env::var(format!("{ENV_PREFIX}_{name}")).ok())
    }

    /// Apply overrides looked up by suffix (`LEVEL`, `FORMAT`, `OUTPUT`,
    /// `FILE`, `SOURCE`, `COMMANDS`). Unparsable values are ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(level) = lookup("LEVEL").and_then(|v| v.parse().ok()) {
            self.level = level;
        }
        if let Some(format) = lookup("FORMAT").and_then(|v| v.parse().ok()) {
            self.format = format;
        }
        if let Some(output) = lookup("OUTPUT").and_then(|v| v.parse().ok()) {
            self.output = output;
        }
        if let Some(file_path) = lookup("FILE") {
            self.file_path = Some(PathBuf::from(file_path));
        }
        if let Some(include_source) = lookup("SOURCE") {
            self.include_source = include_source.eq_ignore_ascii_case("true");
        }
        if let Some(trace_commands) = lookup("COMMANDS") {
            self.trace_commands = trace_commands.eq_ignore_ascii_case("true");
        }
        self
    }
}

/// Initialize the global tracing subscriber with the given configuration
pub fn init_logging(config: &LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter = create_filter(config);

    let layers: Vec<BoxedLayer> = match (config.output, &config.file_path) {
        (LogOutput::Stderr, _) => vec![create_layer(config, std::io::stderr)],
        (LogOutput::Stdout, _) => vec![create_layer(config, std::io::stdout)],
        (LogOutput::File, Some(file_path)) => vec![create_layer(config, open_log_file(file_path)?)],
        (LogOutput::Both, Some(file_path)) => vec![
            create_layer(config, std::io::stderr),
            create_layer(config, open_log_file(file_path)?),
        ],
        (LogOutput::File, None) | (LogOutput::Both, None) => {
            return Err("File path required for file output".into());
        }
    };

    tracing_subscriber::registry()
        .with(layers.with_filter(filter))
        .try_init()?;

    info!("Logging initialized with config: {:?}", config);
    Ok(())
}

/// `RUST_LOG` wins over the configured level
fn create_filter(config: &LogConfig) -> EnvFilter {
    let mut directives = format!("rectangle_bridge={}", config.level.as_str());
    if config.trace_commands {
        directives.push_str(",rectangle_bridge::command=trace");
    }

    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives))
}

fn open_log_file(path: &Path) -> std::io::Result<std::sync::Mutex<std::fs::File>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
    Ok(std::sync::Mutex::new(file))
}

fn create_layer<W>(config: &LogConfig, writer: W) -> BoxedLayer
where
    W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_timer(UtcTime::rfc_3339())
        .with_file(config.include_source)
        .with_line_number(config.include_source);

    match config.format {
        LogFormat::Pretty => Box::new(layer.pretty()),
        LogFormat::Compact => Box::new(layer.compact()),
        LogFormat::Json => Box::new(layer.json()),
    }
}

/// Initialize logging for tests; safe to call from every test
#[cfg(test)]
pub fn init_test_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let config = LogConfig {
            level: LogLevel::Debug,
            trace_commands: true,
            ..LogConfig::default()
        };

        if let Err(e) = init_logging(&config) {
            eprintln!("Failed to initialize test logging: {}", e);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(LogLevel::from_str("info").unwrap(), LogLevel::Info);
        assert_eq!(LogLevel::from_str("DEBUG").unwrap(), LogLevel::Debug);
        assert!(LogLevel::from_str("invalid").is_err());
    }

    #[test]
    fn test_log_output_parsing() {
        assert_eq!(LogOutput::from_str("stderr").unwrap(), LogOutput::Stderr);
        assert_eq!(LogOutput::from_str("BOTH").unwrap(), LogOutput::Both);
        assert!(LogFormat::from_str("xml").is_err());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("LEVEL", "trace"),
            ("FORMAT", "json"),
            ("OUTPUT", "file"),
            ("FILE", "/tmp/rectangle-bridge.log"),
            ("SOURCE", "TRUE"),
            ("COMMANDS", "nope"),
        ]
        .into_iter()
        .collect();

        let config = LogConfig::default().with_overrides(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.level, LogLevel::Trace);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.output, LogOutput::File);
        assert_eq!(config.file_path, Some(PathBuf::from("/tmp/rectangle-bridge.log")));
        assert!(config.include_source);
        assert!(!config.trace_commands);
    }

    #[test]
    fn test_invalid_override_keeps_default() {
        let config = LogConfig::default().with_overrides(|name| (name == "LEVEL").then(|| "loud".to_string()));
        assert_eq!(config.level, LogLevel::Warn);
    }

    #[test]
    fn test_verbose_preset() {
        let config = LogConfig::verbose();
        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.output, LogOutput::Stderr);
    }

    #[test]
    fn test_file_output_requires_path() {
        let config = LogConfig {
            output: LogOutput::File,
            ..LogConfig::default()
        };
        assert!(init_logging(&config).is_err());
    }

    #[test]
    fn test_test_logging_is_reentrant() {
        init_test_logging();
        init_test_logging();
    }
}

//! Configuration management for rectangle-bridge

pub mod bridge;

pub use bridge::{
    default_config_path, AppConfig, BridgeConfig, CommandConfig, ConfigError, DetectionConfig,
    HostConfig, ToolPaths,
};

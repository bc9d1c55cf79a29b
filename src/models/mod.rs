//! Data models shared by the rectangle-bridge services

pub mod settings;
pub mod task;
pub mod version;
pub mod window_action;

pub use settings::*;
pub use task::*;
pub use version::*;
pub use window_action::*;

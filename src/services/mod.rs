//! Services built on the command runner

pub mod defaults;
pub mod detection;
pub mod drag_snap;
pub mod installer;
pub mod notifications;
pub mod registry;
pub mod remote;

pub use defaults::*;
pub use detection::*;
pub use drag_snap::*;
pub use installer::*;
pub use notifications::*;
pub use registry::*;
pub use remote::*;

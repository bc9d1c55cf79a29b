//! macOS integration layer for rectangle-bridge
//!
//! Thin, testable wrappers over the system tools used to find applications:
//! Spotlight metadata (`mdls`), bundle `Info.plist` files and the process
//! list (`ps`). All process work goes through a
//! [`CommandRunner`](crate::command::CommandRunner) so tests can script it.

pub mod bundle;
pub mod mdls;
pub mod processes;

pub use bundle::*;
pub use mdls::*;
pub use processes::*;

/// Whether the current process runs on macOS
pub fn is_macos() -> bool {
    cfg!(target_os = "macos")
}

//! Stable exit codes for gachabot CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid config, ring, or other errors.
pub const INVALID: i32 = 1;
/// `gachabot init` refused to overwrite an existing config.
pub const EXISTS: i32 = 2;
/// `gachabot run` stopped because shutdown was requested.
pub const SHUTDOWN: i32 = 3;

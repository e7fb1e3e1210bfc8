//! Stable exit codes for webrunner CLI commands.

/// Command succeeded; for `check-stop`, the run may continue.
pub const OK: i32 = 0;
/// Command failed due to invalid input, config or other errors.
pub const INVALID: i32 = 1;
/// `webrunner check-stop` found that the run must stop.
pub const STOP: i32 = 2;

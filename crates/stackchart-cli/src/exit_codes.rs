//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// General error - unspecified failure, or a chart that drifted from disk
pub const ERROR: i32 = 1;

/// Validation error - the project configuration breaks an invariant
pub const VALIDATION_ERROR: i32 = 2;

/// Template error - an emitted template failed its checks
pub const TEMPLATE_ERROR: i32 = 3;

/// Config error - unparsable project file or unresolvable reference
pub const CONFIG_ERROR: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

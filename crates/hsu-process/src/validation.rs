//! Process validation utilities.
//!
//! Checks performed before anything is handed to the OS.

use hsu_common::LaunchError;
use std::path::Path;

/// Validate that `path` names an existing regular file.
///
/// A missing binary is an ordinary condition (the target may not be deployed
/// yet), so this reports [`LaunchError::NotFound`] instead of letting the
/// spawn fail. Whether the file is actually executable is left to the OS.
pub fn validate_executable(path: &Path) -> Result<(), LaunchError> {
    if path.as_os_str().is_empty() {
        return Err(LaunchError::not_found("<empty path>"));
    }

    match std::fs::metadata(path) {
        Ok(metadata) if metadata.is_file() => Ok(()),
        _ => Err(LaunchError::not_found(path.display().to_string())),
    }
}

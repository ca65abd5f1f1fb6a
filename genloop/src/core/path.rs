//! Validation of generated file paths.

use std::path::{Component, Path, PathBuf};

/// Normalize a unit filename into a path that stays inside its base directory.
///
/// Rejects empty names, absolute paths and any `..` component. `.` components
/// are dropped.
pub fn contained_relative_path(filename: &str) -> Result<PathBuf, String> {
    if filename.trim().is_empty() {
        return Err("filename must not be empty".to_string());
    }
    let mut normalized = PathBuf::new();
    for component in Path::new(filename).components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(format!("'{filename}' must not contain '..'"));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(format!("'{filename}' must be a relative path"));
            }
        }
    }
    if normalized.as_os_str().is_empty() {
        return Err(format!("'{filename}' does not name a file"));
    }
    Ok(normalized)
}

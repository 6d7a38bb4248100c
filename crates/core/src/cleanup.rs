//! Removal of per-request filesystem artifacts.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::CleanupWarning;

/// What a cleanup pass did.
#[derive(Debug, Default)]
pub struct CleanupReport {
    /// Paths that existed and were deleted.
    pub removed: Vec<PathBuf>,

    /// Paths that were already gone.
    pub missing: Vec<PathBuf>,

    /// Paths that could not be deleted.
    pub warnings: Vec<CleanupWarning>,
}

impl CleanupReport {
    /// True when every listed artifact is gone.
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Delete every path that exists.
///
/// Missing files are not an error, so calling this twice with the same set
/// is harmless. Removal failures are logged and collected, never returned as
/// an error.
pub fn cleanup_all<I, P>(paths: I) -> CleanupReport
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut report = CleanupReport::default();

    for path in paths {
        let path = path.as_ref();
        match std::fs::remove_file(path) {
            Ok(()) => {
                log::debug!("Removed {}", path.display());
                report.removed.push(path.to_path_buf());
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                report.missing.push(path.to_path_buf());
            }
            Err(e) => {
                let warning = CleanupWarning {
                    path: path.to_path_buf(),
                    source: e,
                };
                log::warn!("{}", warning);
                report.warnings.push(warning);
            }
        }
    }

    report
}

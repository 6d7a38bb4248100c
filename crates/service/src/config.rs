//! Service configuration.

use std::path::PathBuf;

use deckbg_core::UserId;
use serde::{Deserialize, Serialize};

/// Where per-user files live and how many transforms may run at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Directory holding uploaded decks, images and rendered output.
    pub work_dir: PathBuf,
    /// Upper bound on transforms running on the blocking pool.
    pub max_concurrent_transforms: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("deckbg"),
            max_concurrent_transforms: default_workers(),
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
}

impl ServiceConfig {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_max_concurrent_transforms(mut self, workers: usize) -> Self {
        self.max_concurrent_transforms = workers.max(1);
        self
    }

    /// Create the work directory if it does not exist yet.
    pub fn prepare(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.work_dir)
    }

    pub fn deck_path(&self, user_id: UserId) -> PathBuf {
        self.work_dir.join(format!("input_{}.pptx", user_id))
    }

    /// The image keeps this name whatever its format; the transform sniffs
    /// the bytes.
    pub fn image_path(&self, user_id: UserId) -> PathBuf {
        self.work_dir.join(format!("bg_{}.jpg", user_id))
    }

    pub fn output_path(&self, user_id: UserId) -> PathBuf {
        self.work_dir.join(format!("output_{}.pptx", user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_per_user() {
        let config = ServiceConfig::new("/work");

        assert_eq!(
            config.deck_path(UserId(7)),
            PathBuf::from("/work/input_7.pptx")
        );
        assert_eq!(config.image_path(UserId(7)), PathBuf::from("/work/bg_7.jpg"));
        assert_eq!(
            config.output_path(UserId(-3)),
            PathBuf::from("/work/output_-3.pptx")
        );
        assert_ne!(config.deck_path(UserId(1)), config.deck_path(UserId(2)));
    }

    #[test]
    fn test_partial_config_file_keeps_defaults() {
        let config: ServiceConfig =
            serde_json::from_str(r#"{"work_dir": "/srv/deckbg"}"#).unwrap();

        assert_eq!(config.work_dir, PathBuf::from("/srv/deckbg"));
        assert_eq!(
            config.max_concurrent_transforms,
            ServiceConfig::default().max_concurrent_transforms
        );
    }

    #[test]
    fn test_worker_bound_is_at_least_one() {
        let config = ServiceConfig::new("/work").with_max_concurrent_transforms(0);
        assert_eq!(config.max_concurrent_transforms, 1);
        assert!(ServiceConfig::default().max_concurrent_transforms >= 1);
    }
}

use directories::ProjectDirs;
use std::path::PathBuf;

const APP_NAME: &str = "schulte";

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    /// State directory: `$HOME/.local/state/schulte`, falling back to the
    /// platform data dir, then the working directory.
    pub fn state_dir() -> PathBuf {
        if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home)
                .join(".local")
                .join("state")
                .join(APP_NAME)
        } else if let Some(proj_dirs) = ProjectDirs::from("", "", APP_NAME) {
            proj_dirs.data_local_dir().to_path_buf()
        } else {
            PathBuf::from(".")
        }
    }

    /// Level progress and preferences.
    pub fn store_path() -> PathBuf {
        Self::state_dir().join("store.json")
    }

    pub fn db_path() -> PathBuf {
        Self::state_dir().join("history.db")
    }

    pub fn log_path() -> PathBuf {
        Self::state_dir().join("schulte.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn files_share_the_state_dir() {
        let dir = AppDirs::state_dir();
        assert_eq!(AppDirs::store_path().parent(), Some(dir.as_path()));
        assert_eq!(AppDirs::db_path().parent(), Some(dir.as_path()));
        assert!(AppDirs::log_path().ends_with("schulte.log"));
    }
}

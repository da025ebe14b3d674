//! Platform-aware data storage directory management
//!
//! ## Platform Paths
//!
//! | Type | Windows | macOS | Linux |
//! |------|---------|-------|-------|
//! | Data | `%APPDATA%\Mart\` | `~/Library/Application Support/Mart/` | `$XDG_DATA_HOME/mart/` |

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;

use super::config::SinkConfig;
use super::constants::{APP_DOT_FOLDER, APP_NAME, ENV_DATA_DIR, SINK_DB_FILENAME};
use crate::utils::file::expand_path;

/// Subdirectory holding the sink database
const SQLITE_SUBDIR: &str = "sqlite";

/// Application storage manager
#[derive(Debug, Clone)]
pub struct AppStorage {
    data_dir: PathBuf,
    sink_path: PathBuf,
}

impl AppStorage {
    /// Resolve the data directory and make sure the sink's parent exists
    pub async fn init(sink: &SinkConfig) -> Result<Self> {
        Self::init_in(Self::resolve_data_dir(), sink).await
    }

    async fn init_in(data_dir: PathBuf, sink: &SinkConfig) -> Result<Self> {
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        // Canonicalize for clean logging (requires the path to exist)
        let data_dir = data_dir.canonicalize().unwrap_or(data_dir);

        let sink_path = sink
            .path
            .clone()
            .unwrap_or_else(|| data_dir.join(SQLITE_SUBDIR).join(SINK_DB_FILENAME));
        if let Some(parent) = sink_path.parent() {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create sink directory: {}", parent.display())
            })?;
        }

        tracing::debug!(
            data_dir = %data_dir.display(),
            sink = %sink_path.display(),
            "Storage initialized"
        );

        Ok(Self {
            data_dir,
            sink_path,
        })
    }

    /// Resolve data directory from env var or platform default
    pub fn resolve_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var(ENV_DATA_DIR) {
            return expand_path(&dir);
        }

        if let Some(proj_dirs) = ProjectDirs::from("", "", APP_NAME) {
            return proj_dirs.data_dir().to_path_buf();
        }

        // Fallback to local .mart
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        cwd.join(APP_DOT_FOLDER)
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Sink database file
    pub fn sink_path(&self) -> &Path {
        &self.sink_path
    }
}

//! Data directory layout for Cortex.
//!
//! The data directory holds `cortex.db` and an optional `config.toml`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "CORTEX_DATA_DIR";

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `CORTEX_DATA_DIR` environment variable
/// 2. Home directory fallback: `~/.cortex`
/// 3. `.cortex` in the current directory
pub fn resolve_data_dir() -> PathBuf {
    data_dir_from(std::env::var_os(DATA_DIR_ENV), dirs::home_dir())
}

fn data_dir_from(env_dir: Option<OsString>, home: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = env_dir.filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }

    if let Some(home) = home {
        return home.join(".cortex");
    }

    PathBuf::from(".cortex")
}

/// Create the data directory (and parents) if it does not exist yet.
pub async fn ensure_data_dir(data_dir: &Path) -> Result<(), std::io::Error> {
    tokio::fs::create_dir_all(data_dir).await
}

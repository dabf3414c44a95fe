// ABOUTME: XDG Base Directory paths for config, logs, and the default registry location
// ABOUTME: Falls back to the working directory when no home directory can be resolved

use directories::ProjectDirs;
use std::path::PathBuf;

const QUALIFIER: &str = "com";
const ORGANIZATION: &str = "kiddzone";
const APPLICATION: &str = "herald";

/// File name used for the subscriber registry when no path is configured
pub const REGISTRY_FILE_NAME: &str = "users.json";

pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
}

/// Data directory (e.g., ~/.local/share/herald/), or ./data without XDG
pub fn data_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./data"))
}

/// Rolling log files live here when file logging is enabled
pub fn log_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Config directory (e.g., ~/.config/herald/), or . without XDG
pub fn config_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

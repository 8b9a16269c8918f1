use crate::index::types::{IndexError, Result};
use std::fs;
use std::io;
use std::path::PathBuf;

const APP_NAME: &str = "fsi";
const STORE_FILE: &str = "index.db";
const CONFIG_FILE: &str = "config.toml";

/// Get the application data directory for the index store and config.
pub fn get_app_data_dir() -> Result<PathBuf> {
    let base = if cfg!(target_os = "macos") {
        dirs::home_dir().map(|h| h.join("Library").join("Application Support"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
    } else {
        // Linux/Unix: XDG_DATA_HOME or ~/.local/share
        dirs::data_dir()
    };

    let base = base.ok_or_else(|| {
        IndexError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            "could not determine app data directory",
        ))
    })?;
    let app_dir = base.join(APP_NAME);

    fs::create_dir_all(&app_dir)?;
    Ok(app_dir)
}

/// The single per-user store file everything persists to.
pub fn store_path() -> Result<PathBuf> {
    Ok(get_app_data_dir()?.join(STORE_FILE))
}

/// Path to the optional config file.
pub fn config_path() -> Result<PathBuf> {
    Ok(get_app_data_dir()?.join(CONFIG_FILE))
}

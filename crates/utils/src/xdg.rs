use std::env;
use std::path::PathBuf;

/// XDG Base Directory paths for scour
pub struct XdgPaths;

impl XdgPaths {
    /// Get XDG_CACHE_HOME/scour or fallback
    pub fn cache_dir() -> PathBuf {
        env::var("XDG_CACHE_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .map(|home| home.join(".cache"))
                    .unwrap_or_else(|| PathBuf::from(".cache"))
            })
            .join("scour")
    }

    /// Get XDG_STATE_HOME/scour or fallback
    pub fn state_dir() -> PathBuf {
        env::var("XDG_STATE_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .map(|home| home.join(".local/state"))
                    .unwrap_or_else(|| PathBuf::from(".local/state"))
            })
            .join("scour")
    }
}

//! Store path resolution.

use std::path::PathBuf;

/// Environment variable overriding the store location.
pub const STORE_ENV: &str = "PRECACHE_STORE";

/// Resolve the store file: explicit path, then `$PRECACHE_STORE`, then
/// `./.precache/store.json` if present, then the per-user default.
pub fn resolve_store_path(explicit: Option<&str>) -> PathBuf {
    if let Some(path) = explicit {
        return PathBuf::from(path);
    }

    if let Ok(env_path) = std::env::var(STORE_ENV) {
        if !env_path.is_empty() {
            return PathBuf::from(env_path);
        }
    }

    let cwd_store = PathBuf::from(".precache/store.json");
    if cwd_store.exists() {
        return cwd_store;
    }

    default_store_path()
}

fn default_store_path() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());

    PathBuf::from(home).join(".precache-predictor").join("store.json")
}

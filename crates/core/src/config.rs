//! Config file parsing for `~/.config/books/config.toml`.
//!
//! Use `open_options_from_config` and `collection_path_from_config` to turn
//! the loaded config into the options the reader and the collection take.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::epub::{ExtractionMode, OpenOptions};
use crate::security::SecurityLimits;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub collection: CollectionConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Extraction cache root. Defaults to `<user cache dir>/books`.
    pub dir: Option<String>,
    #[serde(default)]
    pub mode: ExtractionMode,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Collection table. Defaults to `<user cache dir>/books/meta.json`.
    pub database: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub max_file_size_mb: Option<u64>,
    pub max_compression_ratio: Option<u64>,
    pub max_entry_count: Option<u64>,
}

/// Load config from the default path (`~/.config/books/config.toml`).
pub fn load_config() -> AppConfig {
    match config_path() {
        Some(path) => load_config_from(&path),
        None => AppConfig::default(),
    }
}

/// Load config from `path`, falling back to defaults if it is missing or malformed.
pub fn load_config_from(path: &Path) -> AppConfig {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return AppConfig::default(),
    };

    match toml::from_str::<AppConfig>(&content) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!("Ignoring malformed config {}: {}", path.display(), e);
            AppConfig::default()
        }
    }
}

/// Return the default config file path (for init and show).
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|mut p| {
        p.push("books");
        p.push("config.toml");
        p
    })
}

/// `<user cache dir>/books`, or `./.books-cache` where there is no cache dir.
pub fn default_cache_dir() -> PathBuf {
    match dirs::cache_dir() {
        Some(mut p) => {
            p.push("books");
            p
        }
        None => PathBuf::from(".books-cache"),
    }
}

/// Build security limits from config. Uses defaults for any unset values.
pub fn security_limits_from_config(c: &SecurityConfig) -> SecurityLimits {
    let mut limits = SecurityLimits::default();
    if let Some(mb) = c.max_file_size_mb {
        limits.max_total_size_bytes = mb.saturating_mul(1024).saturating_mul(1024);
    }
    if let Some(r) = c.max_compression_ratio {
        limits.max_compression_ratio = r;
    }
    if let Some(n) = c.max_entry_count {
        limits.max_entry_count = n;
    }
    limits
}

/// Build open options from full app config (cache + security).
pub fn open_options_from_config(cfg: &AppConfig) -> OpenOptions {
    OpenOptions {
        cache_dir: cfg
            .cache
            .dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(default_cache_dir),
        mode: cfg.cache.mode,
        limits: security_limits_from_config(&cfg.security),
    }
}

pub fn collection_path_from_config(cfg: &AppConfig) -> PathBuf {
    cfg.collection
        .database
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| default_cache_dir().join("meta.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_config_from(&dir.path().join("none.toml")), AppConfig::default());
    }

    #[test]
    fn malformed_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[cache\nmode = ").unwrap();
        assert_eq!(load_config_from(&path), AppConfig::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[cache]\ndir = \"/tmp/books\"\nmode = \"memory\"\n\n[security]\nmax_compression_ratio = 50\n",
        )
        .unwrap();

        let cfg = load_config_from(&path);
        assert_eq!(cfg.cache.dir.as_deref(), Some("/tmp/books"));
        assert_eq!(cfg.cache.mode, ExtractionMode::Memory);
        assert_eq!(cfg.collection, CollectionConfig::default());

        let opts = open_options_from_config(&cfg);
        assert_eq!(opts.cache_dir, PathBuf::from("/tmp/books"));
        assert_eq!(opts.mode, ExtractionMode::Memory);
        assert_eq!(opts.limits.max_compression_ratio, 50);
        assert_eq!(opts.limits.max_entry_count, SecurityLimits::default().max_entry_count);
    }

    #[test]
    fn security_overrides_apply() {
        let limits = security_limits_from_config(&SecurityConfig {
            max_file_size_mb: Some(2),
            max_compression_ratio: None,
            max_entry_count: Some(7),
        });
        assert_eq!(limits.max_total_size_bytes, 2 * 1024 * 1024);
        assert_eq!(limits.max_entry_count, 7);
        assert_eq!(limits.max_compression_ratio, SecurityLimits::default().max_compression_ratio);
    }

    #[test]
    fn collection_path_defaults_under_cache_dir() {
        let cfg = AppConfig::default();
        assert_eq!(collection_path_from_config(&cfg), default_cache_dir().join("meta.json"));

        let cfg = AppConfig {
            collection: CollectionConfig {
                database: Some("/data/books.json".into()),
            },
            ..AppConfig::default()
        };
        assert_eq!(collection_path_from_config(&cfg), PathBuf::from("/data/books.json"));
    }

    #[test]
    fn default_config_round_trips_through_toml() {
        let text = toml::to_string_pretty(&AppConfig::default()).unwrap();
        let back: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, AppConfig::default());
    }
}

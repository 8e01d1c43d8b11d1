pub mod sources;

use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub anilist: AnilistConfig,
    pub tmdb: TmdbConfig,
    pub kitsu: KitsuConfig,
    pub offline: OfflineConfig,
    pub metadata: ConfigMetadata,
}

impl Config {
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        self.cache.ensure_directories()
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache.root
    }

    pub fn snapshot_dir(&self) -> &Path {
        &self.cache.snapshots
    }

    pub fn offline_dir(&self) -> &Path {
        &self.cache.offline
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Externally reachable base URL, used in the manifest when set.
    pub public_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub root: PathBuf,
    pub snapshots: PathBuf,
    pub offline: PathBuf,
    pub meta_ttl: Duration,
    pub sweep_interval: Duration,
    /// Restore and save warm-start snapshots of the in-memory caches.
    pub persist: bool,
}

impl CacheConfig {
    fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(&self.snapshots)?;
        std::fs::create_dir_all(&self.offline)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AnilistConfig {
    pub endpoint: String,
    pub max_attempts: u32,
    pub rate_limit_floor: Duration,
    pub low_water_mark: u32,
}

#[derive(Clone)]
pub struct TmdbConfig {
    pub api_key: Option<String>,
    pub language: Option<String>,
    pub base_url: String,
}

impl TmdbConfig {
    pub fn is_enabled(&self) -> bool {
        self.api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }
}

impl std::fmt::Debug for TmdbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TmdbConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("language", &self.language)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct KitsuConfig {
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct OfflineConfig {
    pub fribb_url: String,
    pub manami_url: String,
    /// A local snapshot younger than this is used without downloading.
    pub freshness: Duration,
    pub fribb_refresh: Duration,
    pub manami_refresh: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}

pub mod error;

use once_cell::sync::Lazy;
use std::{fs, path::PathBuf, time::Duration};
use tracing::debug;

use crate::constants::*;
use crate::models::{
    AnilistConfig, CacheConfig, Config, ConfigMetadata, KitsuConfig,
    OfflineConfig, ServerConfig, TmdbConfig,
    sources::{EnvConfig, FileConfig},
};
use crate::validation::{self, ConfigWarnings};

pub use error::ConfigLoadError;

static DEFAULT_CONFIG_LOCATIONS: Lazy<Vec<PathBuf>> = Lazy::new(|| {
    vec![
        PathBuf::from("anicat.toml"),
        PathBuf::from("config/anicat.toml"),
    ]
});

/// Result of a successful load: the composed config plus anything worth
/// telling the operator about it.
#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
}

/// Layers configuration as built-in defaults, then the TOML file, then
/// environment variables (including those read from `.env`).
#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true).or_else(
                |err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                },
            )?,
            None => {
                dotenvy::dotenv().map(|_| true).or_else(|err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                })?
            }
        };

        let mut load = self.load_with_env(EnvConfig::gather())?;
        load.config.metadata.env_file_loaded = env_file_loaded;
        Ok(load)
    }

    /// Compose from an already gathered environment without touching `.env`.
    pub fn load_with_env(
        &self,
        env: EnvConfig,
    ) -> Result<ConfigLoad, ConfigLoadError> {
        let (file_config, config_path) = self.load_file_config(&env)?;
        let (config, warnings) = compose_config(file_config, env, config_path)?;

        config.ensure_directories().map_err(|source| {
            ConfigLoadError::Filesystem {
                path: config.cache_root().to_path_buf(),
                source,
            }
        })?;

        Ok(ConfigLoad { config, warnings })
    }

    fn load_file_config(
        &self,
        env: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        // An explicitly named file must exist; default locations are optional.
        let (path, explicit) = match (&self.options.config_path, &env.config_path)
        {
            (Some(path), _) | (None, Some(path)) => (Some(path.clone()), true),
            (None, None) => (
                DEFAULT_CONFIG_LOCATIONS
                    .iter()
                    .find(|candidate| candidate.exists())
                    .cloned(),
                false,
            ),
        };

        let Some(path) = path else {
            return Ok((None, None));
        };

        if !path.exists() {
            if explicit {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            return Ok((None, None));
        }

        let contents = fs::read_to_string(&path).map_err(|source| {
            ConfigLoadError::Io {
                path: path.clone(),
                source,
            }
        })?;
        let file_config: FileConfig =
            toml::from_str(&contents).map_err(|source| {
                ConfigLoadError::Parse {
                    path: path.clone(),
                    source,
                }
            })?;

        debug!(path = %path.display(), "loaded config file");
        Ok((Some(file_config), Some(path)))
    }
}

fn compose_config(
    file_config: Option<FileConfig>,
    env: EnvConfig,
    config_path: Option<PathBuf>,
) -> Result<(Config, ConfigWarnings), ConfigLoadError> {
    let mut warnings = ConfigWarnings::default();

    if config_path.is_none() {
        warnings.push_with_hint(
            "No anicat.toml detected; using defaults and environment variables",
            "Create anicat.toml or point ANICAT_CONFIG at a config file",
        );
    }

    let FileConfig {
        server: file_server,
        cache: file_cache,
        anilist: file_anilist,
        tmdb: file_tmdb,
        kitsu: file_kitsu,
        offline: file_offline,
    } = file_config.unwrap_or_default();

    let server = ServerConfig {
        host: env
            .server_host
            .or(file_server.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_string()),
        port: env.server_port.or(file_server.port).unwrap_or(DEFAULT_PORT),
        public_url: env
            .public_url
            .or(file_server.public_url)
            .map(|url| url.trim_end_matches('/').to_string()),
    };

    let cache_root = env
        .cache_root
        .or(file_cache.root)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_ROOT));
    let snapshots = env
        .snapshot_dir
        .or(file_cache.snapshots)
        .unwrap_or_else(|| cache_root.join("snapshots"));
    let offline_dir = env
        .offline_dir
        .or(file_cache.offline)
        .unwrap_or_else(|| cache_root.join("offline"));
    let cache = CacheConfig {
        root: cache_root,
        snapshots,
        offline: offline_dir,
        meta_ttl: env
            .meta_ttl
            .or(file_cache.meta_ttl)
            .unwrap_or(DEFAULT_META_TTL),
        sweep_interval: non_zero(
            env.sweep_interval.or(file_cache.sweep_interval),
            DEFAULT_SWEEP_INTERVAL,
            "cache.sweep_interval",
            &mut warnings,
        ),
        persist: env.cache_persist.or(file_cache.persist).unwrap_or(true),
    };

    let mut max_attempts = env
        .anilist_max_attempts
        .or(file_anilist.max_attempts)
        .unwrap_or(DEFAULT_MAX_ATTEMPTS);
    if max_attempts == 0 {
        warnings.push("anilist.max_attempts must be at least 1; using 1");
        max_attempts = 1;
    }
    let anilist = AnilistConfig {
        endpoint: env
            .anilist_endpoint
            .or(file_anilist.endpoint)
            .unwrap_or_else(|| DEFAULT_ANILIST_ENDPOINT.to_string()),
        max_attempts,
        rate_limit_floor: file_anilist
            .rate_limit_floor
            .unwrap_or(DEFAULT_RATE_LIMIT_FLOOR),
        low_water_mark: env
            .anilist_low_water_mark
            .or(file_anilist.low_water_mark)
            .unwrap_or(DEFAULT_LOW_WATER_MARK),
    };

    let tmdb = TmdbConfig {
        api_key: env.tmdb_api_key.or(file_tmdb.api_key),
        language: env.tmdb_language.or(file_tmdb.language),
        base_url: env
            .tmdb_base_url
            .or(file_tmdb.base_url)
            .unwrap_or_else(|| DEFAULT_TMDB_BASE_URL.to_string()),
    };

    let kitsu = KitsuConfig {
        base_url: env
            .kitsu_base_url
            .or(file_kitsu.base_url)
            .unwrap_or_else(|| DEFAULT_KITSU_BASE_URL.to_string()),
    };

    let offline = OfflineConfig {
        fribb_url: env
            .fribb_url
            .or(file_offline.fribb_url)
            .unwrap_or_else(|| DEFAULT_FRIBB_URL.to_string()),
        manami_url: env
            .manami_url
            .or(file_offline.manami_url)
            .unwrap_or_else(|| DEFAULT_MANAMI_URL.to_string()),
        freshness: env
            .offline_freshness
            .or(file_offline.freshness)
            .unwrap_or(DEFAULT_OFFLINE_FRESHNESS),
        fribb_refresh: non_zero(
            file_offline.fribb_refresh,
            DEFAULT_FRIBB_REFRESH,
            "offline.fribb_refresh",
            &mut warnings,
        ),
        manami_refresh: non_zero(
            file_offline.manami_refresh,
            DEFAULT_MANAMI_REFRESH,
            "offline.manami_refresh",
            &mut warnings,
        ),
    };

    let config = Config {
        server,
        cache,
        anilist,
        tmdb,
        kitsu,
        offline,
        metadata: ConfigMetadata {
            config_path,
            env_file_loaded: false,
        },
    };

    warnings.extend(validation::check(&config));
    Ok((config, warnings))
}

/// Intervals drive periodic tasks and cannot be zero.
fn non_zero(
    value: Option<Duration>,
    default: Duration,
    field: &str,
    warnings: &mut ConfigWarnings,
) -> Duration {
    match value {
        Some(interval) if interval.is_zero() => {
            warnings.push(format!(
                "{field} must be greater than zero; using {}",
                humantime::format_duration(default)
            ));
            default
        }
        Some(interval) => interval,
        None => default,
    }
}

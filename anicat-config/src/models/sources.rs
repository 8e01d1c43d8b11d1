use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::util::{parse_bool, parse_duration};

/// Raw configuration as defined in a TOML file.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(default)]
    pub server: FileServerConfig,
    #[serde(default)]
    pub cache: FileCacheConfig,
    #[serde(default)]
    pub anilist: FileAnilistConfig,
    #[serde(default)]
    pub tmdb: FileTmdbConfig,
    #[serde(default)]
    pub kitsu: FileKitsuConfig,
    #[serde(default)]
    pub offline: FileOfflineConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileCacheConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshots: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offline: Option<PathBuf>,
    #[serde(
        default,
        with = "humantime_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub meta_ttl: Option<Duration>,
    #[serde(
        default,
        with = "humantime_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub sweep_interval: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persist: Option<bool>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileAnilistConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(
        default,
        with = "humantime_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub rate_limit_floor: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low_water_mark: Option<u32>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileTmdbConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileKitsuConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileOfflineConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fribb_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manami_url: Option<String>,
    #[serde(
        default,
        with = "humantime_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub freshness: Option<Duration>,
    #[serde(
        default,
        with = "humantime_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub fribb_refresh: Option<Duration>,
    #[serde(
        default,
        with = "humantime_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub manami_refresh: Option<Duration>,
}

/// `"6h"`, `"30min"`, `"7days"` style durations in the config file.
mod humantime_value {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};
    use std::time::Duration;

    pub fn serialize<S>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(duration) => serializer.serialize_str(
                &humantime::format_duration(*duration).to_string(),
            ),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.map(|value| {
            humantime::parse_duration(value.trim()).map_err(|err| {
                D::Error::custom(format!("invalid duration '{value}': {err}"))
            })
        })
        .transpose()
    }
}

/// Environment-derived configuration values.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub server_host: Option<String>,
    pub server_port: Option<u16>,
    pub public_url: Option<String>,
    pub cache_root: Option<PathBuf>,
    pub snapshot_dir: Option<PathBuf>,
    pub offline_dir: Option<PathBuf>,
    pub meta_ttl: Option<Duration>,
    pub sweep_interval: Option<Duration>,
    pub cache_persist: Option<bool>,
    pub anilist_endpoint: Option<String>,
    pub anilist_max_attempts: Option<u32>,
    pub anilist_low_water_mark: Option<u32>,
    pub tmdb_api_key: Option<String>,
    pub tmdb_language: Option<String>,
    pub tmdb_base_url: Option<String>,
    pub kitsu_base_url: Option<String>,
    pub fribb_url: Option<String>,
    pub manami_url: Option<String>,
    pub offline_freshness: Option<Duration>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup; unparsable values are
    /// treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |name: &str| {
            lookup(name).filter(|value| !value.trim().is_empty())
        };
        let path = |name: &str| text(name).map(PathBuf::from);
        let number = |name: &str| text(name).and_then(|s| s.trim().parse().ok());
        let duration = |name: &str| text(name).and_then(|s| parse_duration(&s));

        Self {
            config_path: path("ANICAT_CONFIG"),
            server_host: text("SERVER_HOST"),
            server_port: text("SERVER_PORT").and_then(|s| s.trim().parse().ok()),
            public_url: text("PUBLIC_URL"),
            cache_root: path("CACHE_DIR"),
            snapshot_dir: path("SNAPSHOT_CACHE_DIR"),
            offline_dir: path("OFFLINE_DB_DIR"),
            meta_ttl: duration("META_TTL"),
            sweep_interval: duration("CACHE_SWEEP_INTERVAL"),
            cache_persist: text("CACHE_PERSIST").and_then(|s| parse_bool(&s)),
            anilist_endpoint: text("ANILIST_ENDPOINT"),
            anilist_max_attempts: number("ANILIST_MAX_ATTEMPTS"),
            anilist_low_water_mark: number("ANILIST_LOW_WATER_MARK"),
            tmdb_api_key: text("TMDB_API_KEY"),
            tmdb_language: text("TMDB_LANGUAGE"),
            tmdb_base_url: text("TMDB_BASE_URL"),
            kitsu_base_url: text("KITSU_BASE_URL"),
            fribb_url: text("FRIBB_ANIME_LIST_URL"),
            manami_url: text("MANAMI_DATABASE_URL"),
            offline_freshness: duration("OFFLINE_DB_FRESHNESS"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> EnvConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EnvConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn env_values_are_parsed_and_blank_ones_ignored() {
        let env = env(&[
            ("SERVER_PORT", "7000"),
            ("META_TTL", "2h 30m"),
            ("CACHE_PERSIST", "off"),
            ("TMDB_API_KEY", "   "),
            ("ANILIST_MAX_ATTEMPTS", "five"),
        ]);

        assert_eq!(env.server_port, Some(7000));
        assert_eq!(env.meta_ttl, Some(Duration::from_secs(9000)));
        assert_eq!(env.cache_persist, Some(false));
        assert_eq!(env.tmdb_api_key, None);
        assert_eq!(env.anilist_max_attempts, None);
    }

    #[test]
    fn file_durations_use_humantime_strings() {
        let file: FileConfig = toml::from_str(
            r#"
            [cache]
            meta_ttl = "6h"

            [offline]
            manami_refresh = "7days"
            "#,
        )
        .unwrap();

        assert_eq!(file.cache.meta_ttl, Some(Duration::from_secs(6 * 3600)));
        assert_eq!(
            file.offline.manami_refresh,
            Some(Duration::from_secs(7 * 86_400))
        );
        assert_eq!(file.server.port, None);
    }

    #[test]
    fn malformed_file_durations_are_rejected() {
        let parsed = toml::from_str::<FileConfig>(
            r#"
            [cache]
            sweep_interval = "every so often"
            "#,
        );
        assert!(parsed.is_err());
    }
}

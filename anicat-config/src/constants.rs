//! Built-in defaults applied when neither the config file nor the
//! environment sets a value.

use std::time::Duration;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 7000;
pub const DEFAULT_CACHE_ROOT: &str = "./cache";

pub const DEFAULT_ANILIST_ENDPOINT: &str = "https://graphql.anilist.co";
pub const DEFAULT_TMDB_BASE_URL: &str = "https://api.themoviedb.org/3";
pub const DEFAULT_KITSU_BASE_URL: &str = "https://kitsu.io/api/edge";
pub const DEFAULT_FRIBB_URL: &str = "https://raw.githubusercontent.com/Fribb/anime-lists/master/anime-list-full.json";
pub const DEFAULT_MANAMI_URL: &str = "https://github.com/manami-project/anime-offline-database/releases/latest/download/anime-offline-database-minified.json";

pub const DEFAULT_META_TTL: Duration = Duration::from_secs(6 * 3600);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RATE_LIMIT_FLOOR: Duration = Duration::from_secs(60);
pub const DEFAULT_LOW_WATER_MARK: u32 = 10;

pub const DEFAULT_OFFLINE_FRESHNESS: Duration = Duration::from_secs(7 * 24 * 3600);
pub const DEFAULT_FRIBB_REFRESH: Duration = Duration::from_secs(24 * 3600);
pub const DEFAULT_MANAMI_REFRESH: Duration = Duration::from_secs(7 * 24 * 3600);

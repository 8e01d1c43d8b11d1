//! Configuration loading for anicat.
//!
//! [`ConfigLoader`] layers built-in defaults, an optional `anicat.toml` and
//! environment variables (optionally seeded from `.env`) into one [`Config`].
//! Problems that do not prevent startup, such as a missing TMDB key, are
//! returned as [`ConfigWarnings`] next to the config instead of failing.

pub mod constants;
pub mod loader;
pub mod models;
pub mod util;
pub mod validation;

pub use loader::{ConfigLoad, ConfigLoader, ConfigLoaderOptions, error::ConfigLoadError};
pub use models::sources::{EnvConfig, FileConfig};
pub use models::{
    AnilistConfig, CacheConfig, Config, ConfigMetadata, KitsuConfig,
    OfflineConfig, ServerConfig, TmdbConfig,
};
pub use validation::{ConfigWarning, ConfigWarnings};

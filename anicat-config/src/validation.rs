use crate::models::Config;

#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(
        &mut self,
        message: S,
        hint: H,
    ) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigWarning> {
        self.items.iter()
    }
}

/// Soft checks on a composed config. Nothing here is fatal; the server runs
/// with reduced functionality instead.
pub fn check(config: &Config) -> ConfigWarnings {
    let mut warnings = ConfigWarnings::default();

    if !config.tmdb.is_enabled() {
        warnings.push_with_hint(
            "TMDB_API_KEY not configured; detail records will come from AniList and Kitsu only",
            "Set TMDB_API_KEY or add an api_key to the [tmdb] section",
        );
    }

    if config.anilist.low_water_mark == 0 {
        warnings.push(
            "anilist.low_water_mark is 0; the queue will only pause after AniList starts rejecting requests",
        );
    }

    let longest_refresh = config
        .offline
        .fribb_refresh
        .max(config.offline.manami_refresh);
    if config.offline.freshness > longest_refresh {
        warnings.push_with_hint(
            "offline freshness window exceeds every table refresh interval",
            "Periodic refreshes always download; freshness only applies at startup",
        );
    }

    warnings
}

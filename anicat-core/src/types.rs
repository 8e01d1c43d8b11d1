//! Records handed to addon clients.

use serde::{Deserialize, Serialize};

use crate::identifier::MediaIdentifier;
use crate::providers::anilist::AnimeItem;
use crate::providers::kitsu::KitsuEpisode;
use crate::providers::tmdb::{
    TmdbAggregateCredits, TmdbApiProvider, TmdbEpisode, TmdbExternalIds,
    TmdbSeries,
};

const MAX_CAST: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Series,
    Movie,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Series => "series",
            Self::Movie => "movie",
        }
    }

    fn of(item: &AnimeItem) -> Self {
        if item.is_movie() {
            Self::Movie
        } else {
            Self::Series
        }
    }
}

/// Catalog row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    pub id: MediaIdentifier,
    #[serde(rename = "type")]
    pub kind: ContentType,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poster: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub genres: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imdb_rating: Option<String>,
}

impl CatalogItem {
    pub fn from_anime(id: MediaIdentifier, item: &AnimeItem) -> Self {
        Self {
            id,
            kind: ContentType::of(item),
            name: display_name(item),
            poster: item.poster().map(str::to_owned),
            background: item.banner_image.clone(),
            description: item.description.as_deref().map(strip_markup),
            genres: item.genres.clone(),
            release_info: release_year(item).map(|y| y.to_string()),
            imdb_rating: item
                .average_score
                .map(|score| format!("{:.1}", f64::from(score) / 10.0)),
        }
    }
}

/// One playable entry in a detail record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeRecord {
    /// `{identifier}:{season}:{episode}`.
    pub id: String,
    pub title: String,
    pub season: u32,
    pub episode: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub released: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overview: Option<String>,
}

impl EpisodeRecord {
    fn new(id: MediaIdentifier, season: u32, episode: u32) -> Self {
        Self {
            id: format!("{id}:{season}:{episode}"),
            title: format!("Episode {episode}"),
            season,
            episode,
            released: None,
            thumbnail: None,
            overview: None,
        }
    }

    fn from_tmdb(id: MediaIdentifier, episode: &TmdbEpisode) -> Self {
        let mut record =
            Self::new(id, episode.season_number, episode.episode_number);
        if let Some(name) = episode.name.as_deref().filter(|n| !n.is_empty()) {
            record.title = name.to_owned();
        }
        record.released = episode.air_date.map(midnight_utc);
        record.thumbnail = episode
            .still_path
            .as_deref()
            .map(|p| TmdbApiProvider::image_url(p, "w500"));
        record.overview = episode.overview.clone().filter(|o| !o.is_empty());
        record
    }

    fn from_kitsu(id: MediaIdentifier, episode: &KitsuEpisode) -> Self {
        let mut record = Self::new(id, episode.season, episode.number);
        if let Some(title) = &episode.title {
            record.title = title.clone();
        }
        record.released = episode.airdate.map(midnight_utc);
        record.thumbnail = episode.thumbnail.clone();
        record.overview = episode.synopsis.clone();
        record
    }
}

/// Detail record for one identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaRecord {
    pub id: MediaIdentifier,
    #[serde(rename = "type")]
    pub kind: ContentType,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poster: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub genres: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cast: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub studios: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imdb_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trailer: Option<String>,
    #[serde(default, rename = "videos")]
    pub episodes: Vec<EpisodeRecord>,
}

/// TMDB pieces gathered for one series.
#[derive(Debug, Clone)]
pub struct TmdbBundle {
    pub series: TmdbSeries,
    pub external_ids: TmdbExternalIds,
    pub credits: TmdbAggregateCredits,
    pub episodes: Vec<TmdbEpisode>,
}

impl MetaRecord {
    pub fn from_tmdb(id: MediaIdentifier, bundle: &TmdbBundle) -> Self {
        let series = &bundle.series;
        Self {
            id,
            kind: ContentType::Series,
            name: series.name.clone(),
            poster: series
                .poster_path
                .as_deref()
                .map(|p| TmdbApiProvider::image_url(p, "w500")),
            background: series
                .backdrop_path
                .as_deref()
                .map(|p| TmdbApiProvider::image_url(p, "original")),
            description: series.overview.clone().filter(|o| !o.is_empty()),
            genres: series.genres.iter().map(|g| g.name.clone()).collect(),
            release_info: series
                .first_air_date
                .map(|d| chrono::Datelike::year(&d).to_string()),
            runtime: series
                .episode_run_time
                .first()
                .map(|minutes| format!("{minutes} min")),
            cast: bundle
                .credits
                .cast
                .iter()
                .take(MAX_CAST)
                .map(|member| member.name.clone())
                .collect(),
            studios: Vec::new(),
            imdb_id: bundle.external_ids.imdb_id.clone(),
            trailer: None,
            episodes: bundle
                .episodes
                .iter()
                .map(|e| EpisodeRecord::from_tmdb(id, e))
                .collect(),
        }
    }

    /// Detail from AniList alone. Kitsu episodes are used when available;
    /// otherwise numbered placeholders cover the announced episode count.
    pub fn from_anilist(
        id: MediaIdentifier,
        item: &AnimeItem,
        kitsu_episodes: &[KitsuEpisode],
    ) -> Self {
        let kind = ContentType::of(item);
        let episodes = if !kitsu_episodes.is_empty() {
            kitsu_episodes
                .iter()
                .map(|e| EpisodeRecord::from_kitsu(id, e))
                .collect()
        } else if kind == ContentType::Series {
            (1..=item.episodes.unwrap_or(0))
                .map(|n| EpisodeRecord::new(id, 1, n))
                .collect()
        } else {
            Vec::new()
        };

        Self {
            id,
            kind,
            name: display_name(item),
            poster: item.poster().map(str::to_owned),
            background: item.banner_image.clone(),
            description: item.description.as_deref().map(strip_markup),
            genres: item.genres.clone(),
            release_info: release_year(item).map(|y| y.to_string()),
            runtime: item.duration.map(|minutes| format!("{minutes} min")),
            cast: Vec::new(),
            studios: item
                .studios
                .as_ref()
                .map(|s| s.nodes.iter().map(|n| n.name.clone()).collect())
                .unwrap_or_default(),
            imdb_id: None,
            trailer: item
                .trailer
                .as_ref()
                .filter(|t| t.site.as_deref() == Some("youtube"))
                .and_then(|t| t.id.clone()),
            episodes,
        }
    }
}

fn display_name(item: &AnimeItem) -> String {
    item.title
        .display()
        .map(str::to_owned)
        .unwrap_or_else(|| format!("AniList #{}", item.id))
}

fn release_year(item: &AnimeItem) -> Option<i32> {
    item.season_year
        .or_else(|| item.start_date.and_then(|d| d.year))
}

fn midnight_utc(date: chrono::NaiveDate) -> String {
    format!("{}T00:00:00.000Z", date.format("%Y-%m-%d"))
}

/// AniList descriptions carry a handful of inline HTML tags; line breaks
/// are kept, everything else is dropped.
fn strip_markup(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut tag = String::new();
    let mut in_tag = false;
    for ch in raw.chars() {
        if in_tag {
            if ch == '>' {
                in_tag = false;
                if tag.trim().eq_ignore_ascii_case("br")
                    || tag.trim().eq_ignore_ascii_case("br/")
                {
                    out.push('\n');
                }
                tag.clear();
            } else {
                tag.push(ch);
            }
        } else if ch == '<' {
            in_tag = true;
        } else {
            out.push(ch);
        }
    }
    out.trim().to_owned()
}

use std::fmt;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::SeriesDetailSource;
use crate::error::ProviderError;

pub const TMDB_V3_BASE: &str = "https://api.themoviedb.org/3";
pub const TMDB_IMAGE_BASE: &str = "https://image.tmdb.org/t/p";

fn parse_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").ok()
}

fn deserialize_optional_date<'de, D>(
    deserializer: D,
) -> Result<Option<NaiveDate>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_date))
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TmdbGenre {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TmdbSeasonSummary {
    pub season_number: u32,
    #[serde(default)]
    pub episode_count: u32,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbSeries {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub backdrop_path: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_date")]
    pub first_air_date: Option<NaiveDate>,
    #[serde(default)]
    pub genres: Vec<TmdbGenre>,
    #[serde(default)]
    pub episode_run_time: Vec<u32>,
    #[serde(default)]
    pub seasons: Vec<TmdbSeasonSummary>,
    #[serde(default)]
    pub vote_average: Option<f32>,
}

impl TmdbSeries {
    /// Regular seasons in ascending order; season 0 holds specials.
    pub fn regular_seasons(&self) -> impl Iterator<Item = u32> + '_ {
        self.seasons
            .iter()
            .map(|s| s.season_number)
            .filter(|n| *n > 0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbEpisode {
    pub episode_number: u32,
    pub season_number: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_date")]
    pub air_date: Option<NaiveDate>,
    #[serde(default)]
    pub still_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbSeason {
    pub season_number: u32,
    #[serde(default)]
    pub episodes: Vec<TmdbEpisode>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TmdbExternalIds {
    #[serde(default)]
    pub imdb_id: Option<String>,
    #[serde(default)]
    pub tvdb_id: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbRole {
    #[serde(default)]
    pub character: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbCastMember {
    pub name: String,
    #[serde(default)]
    pub roles: Vec<TmdbRole>,
    #[serde(default)]
    pub total_episode_count: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TmdbAggregateCredits {
    #[serde(default)]
    pub cast: Vec<TmdbCastMember>,
}

#[derive(Debug, Clone, Serialize)]
struct TmdbQuery<'a> {
    api_key: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<&'a str>,
}

/// TMDB v3 client for the series endpoints used to build detail records.
pub struct TmdbApiProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    language: Option<String>,
}

impl fmt::Debug for TmdbApiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TmdbApiProvider")
            .field("base_url", &self.base_url)
            .field("has_api_key", &!self.api_key.is_empty())
            .field("language", &self.language)
            .finish()
    }
}

impl TmdbApiProvider {
    pub fn new(
        http: reqwest::Client,
        api_key: impl Into<String>,
        language: Option<String>,
    ) -> Self {
        Self::with_base_url(http, TMDB_V3_BASE, api_key, language)
    }

    pub fn with_base_url(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        language: Option<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_key: api_key.into(),
            language,
        }
    }

    /// Without a key every call would be rejected, so callers skip TMDB.
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn query(&self) -> TmdbQuery<'_> {
        TmdbQuery {
            api_key: &self.api_key,
            language: self.language.as_deref(),
        }
    }

    async fn get_tmdb_json<T>(&self, path: &str) -> Result<T, ProviderError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{path}", self.base_url);
        let response = self.http.get(&url).query(&self.query()).send().await?;

        let status = response.status();
        if status.is_success() {
            return response.json::<T>().await.map_err(ProviderError::from);
        }

        #[derive(Debug, Deserialize)]
        struct TmdbErrorBody {
            #[serde(default)]
            status_message: Option<String>,
        }

        let message = response
            .json::<TmdbErrorBody>()
            .await
            .ok()
            .and_then(|body| body.status_message)
            .unwrap_or_else(|| {
                format!("TMDB request failed with status {}", status)
            });

        match status.as_u16() {
            401 => Err(ProviderError::InvalidApiKey),
            404 => Err(ProviderError::NotFound),
            429 => Err(ProviderError::RateLimited),
            _ => Err(ProviderError::ApiError(message)),
        }
    }

    pub async fn get_series(
        &self,
        tmdb_id: u32,
    ) -> Result<TmdbSeries, ProviderError> {
        self.get_tmdb_json(&format!("/tv/{tmdb_id}")).await
    }

    pub async fn get_season(
        &self,
        tmdb_id: u32,
        season_number: u32,
    ) -> Result<TmdbSeason, ProviderError> {
        self.get_tmdb_json(&format!("/tv/{tmdb_id}/season/{season_number}"))
            .await
    }

    pub async fn get_external_ids(
        &self,
        tmdb_id: u32,
    ) -> Result<TmdbExternalIds, ProviderError> {
        self.get_tmdb_json(&format!("/tv/{tmdb_id}/external_ids"))
            .await
    }

    pub async fn get_aggregate_credits(
        &self,
        tmdb_id: u32,
    ) -> Result<TmdbAggregateCredits, ProviderError> {
        self.get_tmdb_json(&format!("/tv/{tmdb_id}/aggregate_credits"))
            .await
    }

    pub fn image_url(path: &str, size: &str) -> String {
        format!("{}/{}{}", TMDB_IMAGE_BASE, size, path)
    }
}

#[async_trait]
impl SeriesDetailSource for TmdbApiProvider {
    async fn series(&self, tmdb_id: u32) -> Result<TmdbSeries, ProviderError> {
        self.get_series(tmdb_id).await
    }

    async fn season(
        &self,
        tmdb_id: u32,
        season_number: u32,
    ) -> Result<TmdbSeason, ProviderError> {
        self.get_season(tmdb_id, season_number).await
    }

    async fn external_ids(
        &self,
        tmdb_id: u32,
    ) -> Result<TmdbExternalIds, ProviderError> {
        self.get_external_ids(tmdb_id).await
    }

    async fn aggregate_credits(
        &self,
        tmdb_id: u32,
    ) -> Result<TmdbAggregateCredits, ProviderError> {
        self.get_aggregate_credits(tmdb_id).await
    }
}

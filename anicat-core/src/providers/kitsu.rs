use std::fmt;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::EpisodeSource;
use crate::error::ProviderError;
use crate::resolver::TitleSearch;

pub const KITSU_API_BASE: &str = "https://kitsu.io/api/edge";

/// Episodes requested per page. Kitsu caps `page[limit]` at 20.
const EPISODE_PAGE_LIMIT: u32 = 20;
/// Upper bound on followed `links.next` pages for a single listing.
const MAX_EPISODE_PAGES: usize = 100;

#[derive(Debug, Deserialize)]
struct Document<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
    #[serde(default)]
    links: Links,
}

#[derive(Debug, Default, Deserialize)]
struct Links {
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Resource<A> {
    id: String,
    #[serde(default)]
    attributes: Option<A>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnimeAttributes {
    #[serde(default)]
    canonical_title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EpisodeAttributes {
    #[serde(default)]
    number: Option<u32>,
    #[serde(default)]
    season_number: Option<u32>,
    #[serde(default)]
    canonical_title: Option<String>,
    #[serde(default)]
    synopsis: Option<String>,
    #[serde(default)]
    airdate: Option<String>,
    #[serde(default)]
    thumbnail: Option<Thumbnail>,
}

#[derive(Debug, Default, Deserialize)]
struct Thumbnail {
    #[serde(default)]
    original: Option<String>,
}

/// One episode as listed by Kitsu.
#[derive(Debug, Clone, PartialEq)]
pub struct KitsuEpisode {
    pub id: String,
    pub number: u32,
    pub season: u32,
    pub title: Option<String>,
    pub synopsis: Option<String>,
    pub airdate: Option<NaiveDate>,
    pub thumbnail: Option<String>,
}

impl KitsuEpisode {
    fn from_resource(resource: Resource<EpisodeAttributes>) -> Option<Self> {
        let attributes = resource.attributes.unwrap_or_default();
        Some(Self {
            id: resource.id,
            number: attributes.number?,
            season: attributes.season_number.unwrap_or(1),
            title: attributes.canonical_title.filter(|t| !t.is_empty()),
            synopsis: attributes.synopsis.filter(|s| !s.is_empty()),
            airdate: attributes
                .airdate
                .as_deref()
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()),
            thumbnail: attributes.thumbnail.and_then(|t| t.original),
        })
    }
}

/// Kitsu JSON:API client: title search and episode listings.
pub struct KitsuProvider {
    http: reqwest::Client,
    base_url: String,
}

impl fmt::Debug for KitsuProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KitsuProvider")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl KitsuProvider {
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_base_url(http, KITSU_API_BASE)
    }

    pub fn with_base_url(
        http: reqwest::Client,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        }
    }

    async fn get_json<T>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, ProviderError>
    where
        T: DeserializeOwned,
    {
        let response = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT, "application/vnd.api+json")
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let body = response.bytes().await?;
            return serde_json::from_slice(&body)
                .map_err(|e| ProviderError::ParseError(e.to_string()));
        }

        match status.as_u16() {
            404 => Err(ProviderError::NotFound),
            429 => Err(ProviderError::RateLimited),
            _ => Err(ProviderError::ApiError(format!(
                "Kitsu request failed with status {status}"
            ))),
        }
    }

    /// Best text match for `title`, if Kitsu has any.
    pub async fn search_anime(
        &self,
        title: &str,
    ) -> Result<Option<u32>, ProviderError> {
        let url = format!("{}/anime", self.base_url);
        let query = [
            ("filter[text]", title.to_owned()),
            ("page[limit]", "1".to_owned()),
        ];
        let document: Document<Resource<AnimeAttributes>> =
            self.get_json(&url, &query).await?;

        let Some(hit) = document.data.into_iter().next() else {
            return Ok(None);
        };
        debug!(
            title,
            kitsu_id = %hit.id,
            matched = hit
                .attributes
                .and_then(|a| a.canonical_title)
                .as_deref()
                .unwrap_or(""),
            "kitsu title search hit"
        );
        hit.id.parse().map(Some).map_err(|_| {
            ProviderError::ParseError(format!("non-numeric kitsu id {}", hit.id))
        })
    }

    /// Every episode of `kitsu_id`, following `links.next` to the end.
    pub async fn list_episodes(
        &self,
        kitsu_id: u32,
    ) -> Result<Vec<KitsuEpisode>, ProviderError> {
        let first = format!("{}/anime/{kitsu_id}/episodes", self.base_url);
        let first_query = [
            ("page[limit]", EPISODE_PAGE_LIMIT.to_string()),
            ("page[offset]", "0".to_owned()),
            ("sort", "number".to_owned()),
        ];

        let mut episodes = Vec::new();
        let mut document: Document<Resource<EpisodeAttributes>> =
            self.get_json(&first, &first_query).await?;
        let mut pages = 1;

        loop {
            episodes.extend(
                document
                    .data
                    .into_iter()
                    .filter_map(KitsuEpisode::from_resource),
            );

            let Some(next) = document.links.next else {
                break;
            };
            if pages >= MAX_EPISODE_PAGES {
                warn!(
                    kitsu_id,
                    pages, "episode listing truncated at page limit"
                );
                break;
            }
            document = self.get_json(&next, &[]).await?;
            pages += 1;
        }

        Ok(episodes)
    }
}

#[async_trait]
impl TitleSearch for KitsuProvider {
    async fn search_title(
        &self,
        title: &str,
    ) -> Result<Option<u32>, ProviderError> {
        self.search_anime(title).await
    }
}

#[async_trait]
impl EpisodeSource for KitsuProvider {
    async fn episodes(
        &self,
        kitsu_id: u32,
    ) -> Result<Vec<KitsuEpisode>, ProviderError> {
        self.list_episodes(kitsu_id).await
    }
}

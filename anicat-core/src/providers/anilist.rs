use std::{fmt, time::Duration};

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Deserializer, Serialize};

use crate::queue::{GraphqlRequest, GraphqlTransport, TransportResponse};

pub const ANILIST_ENDPOINT: &str = "https://graphql.anilist.co";

const MEDIA_FIELDS: &str = r#"
    id
    idMal
    title { romaji english native }
    format
    status
    description(asHtml: false)
    season
    seasonYear
    episodes
    duration
    genres
    averageScore
    coverImage { extraLarge large }
    bannerImage
    startDate { year month day }
"#;

/// Sorted/filtered listing used by most catalogs.
pub fn media_page_query() -> String {
    format!(
        r#"query ($page: Int, $perPage: Int, $sort: [MediaSort], $status: MediaStatus, $genre: String, $format: MediaFormat, $year: String) {{
  Page(page: $page, perPage: $perPage) {{
    pageInfo {{ currentPage hasNextPage }}
    media(type: ANIME, isAdult: false, sort: $sort, status: $status, genre: $genre, format: $format, startDate_like: $year) {{ {MEDIA_FIELDS} }}
  }}
}}"#
    )
}

/// Listing restricted to one broadcast season.
pub fn seasonal_page_query() -> String {
    format!(
        r#"query ($page: Int, $perPage: Int, $sort: [MediaSort], $season: MediaSeason, $seasonYear: Int, $genre: String, $format: MediaFormat) {{
  Page(page: $page, perPage: $perPage) {{
    pageInfo {{ currentPage hasNextPage }}
    media(type: ANIME, isAdult: false, sort: $sort, season: $season, seasonYear: $seasonYear, genre: $genre, format: $format) {{ {MEDIA_FIELDS} }}
  }}
}}"#
    )
}

/// Free-text search listing.
pub fn search_page_query() -> String {
    format!(
        r#"query ($page: Int, $perPage: Int, $search: String!, $genre: String, $format: MediaFormat) {{
  Page(page: $page, perPage: $perPage) {{
    pageInfo {{ currentPage hasNextPage }}
    media(type: ANIME, isAdult: false, search: $search, sort: [SEARCH_MATCH], genre: $genre, format: $format) {{ {MEDIA_FIELDS} }}
  }}
}}"#
    )
}

/// Single item by AniList id or MyAnimeList id, with detail-only fields.
pub fn media_detail_query() -> String {
    format!(
        r#"query ($id: Int, $idMal: Int) {{
  Media(id: $id, idMal: $idMal, type: ANIME) {{
    {MEDIA_FIELDS}
    studios(isMain: true) {{ nodes {{ name }} }}
    trailer {{ id site }}
    streamingEpisodes {{ title thumbnail url }}
  }}
}}"#
    )
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct MediaTitle {
    #[serde(default)]
    pub romaji: Option<String>,
    #[serde(default)]
    pub english: Option<String>,
    #[serde(default)]
    pub native: Option<String>,
}

impl MediaTitle {
    /// Preferred display title: English, then romaji, then native.
    pub fn display(&self) -> Option<&str> {
        self.english
            .as_deref()
            .or(self.romaji.as_deref())
            .or(self.native.as_deref())
            .filter(|t| !t.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CoverImage {
    #[serde(default)]
    pub extra_large: Option<String>,
    #[serde(default)]
    pub large: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq)]
pub struct FuzzyDate {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
}

impl FuzzyDate {
    /// `YYYY-MM-DD` when the date is complete.
    pub fn to_iso(self) -> Option<String> {
        match (self.year, self.month, self.day) {
            (Some(y), Some(m), Some(d)) => Some(format!("{y:04}-{m:02}-{d:02}")),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct StudioNode {
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Studios {
    #[serde(default, deserialize_with = "null_as_default")]
    pub nodes: Vec<StudioNode>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Trailer {
    pub id: Option<String>,
    pub site: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct StreamingEpisode {
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    pub url: Option<String>,
}

/// One AniList media record. Listing queries leave the detail-only fields
/// at their defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnimeItem {
    pub id: u32,
    #[serde(default)]
    pub id_mal: Option<u32>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: MediaTitle,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub season: Option<String>,
    #[serde(default)]
    pub season_year: Option<i32>,
    #[serde(default)]
    pub episodes: Option<u32>,
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub genres: Vec<String>,
    #[serde(default)]
    pub average_score: Option<u32>,
    #[serde(default)]
    pub cover_image: Option<CoverImage>,
    #[serde(default)]
    pub banner_image: Option<String>,
    #[serde(default)]
    pub start_date: Option<FuzzyDate>,
    #[serde(default)]
    pub studios: Option<Studios>,
    #[serde(default)]
    pub trailer: Option<Trailer>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub streaming_episodes: Vec<StreamingEpisode>,
}

impl AnimeItem {
    pub fn poster(&self) -> Option<&str> {
        self.cover_image
            .as_ref()
            .and_then(|c| c.extra_large.as_deref().or(c.large.as_deref()))
    }

    /// Movies and one-shot specials are surfaced as movies.
    pub fn is_movie(&self) -> bool {
        matches!(self.format.as_deref(), Some("MOVIE"))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    #[serde(default)]
    pub current_page: Option<u32>,
    #[serde(default)]
    pub has_next_page: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaPage {
    #[serde(default)]
    pub page_info: PageInfo,
    #[serde(default, deserialize_with = "null_as_default")]
    pub media: Vec<AnimeItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageData {
    #[serde(rename = "Page")]
    pub page: MediaPage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaData {
    #[serde(rename = "Media")]
    pub media: Option<AnimeItem>,
}

/// reqwest-backed [`GraphqlTransport`] for the AniList endpoint.
pub struct AnilistTransport {
    http: reqwest::Client,
    endpoint: String,
}

impl fmt::Debug for AnilistTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnilistTransport")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl AnilistTransport {
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }
}

fn header_number<T: std::str::FromStr>(
    headers: &HeaderMap,
    name: &str,
) -> Option<T> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

#[async_trait]
impl GraphqlTransport for AnilistTransport {
    async fn post(
        &self,
        request: &GraphqlRequest,
    ) -> Result<TransportResponse, String> {
        let response = self
            .http
            .post(&self.endpoint)
            .timeout(Duration::from_secs(30))
            .header(reqwest::header::ACCEPT, "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status().as_u16();
        let headers = response.headers();
        let retry_after = header_number(headers, "retry-after");
        let remaining = header_number(headers, "x-ratelimit-remaining");
        let reset_at = header_number(headers, "x-ratelimit-reset");
        let body = response.text().await.map_err(|e| e.to_string())?;

        Ok(TransportResponse {
            status,
            retry_after,
            remaining,
            reset_at,
            body,
        })
    }
}

use serde::Deserialize;
use serde_json::Value;

use super::{ParsedSnapshot, SnapshotFormat};
use crate::error::SnapshotError;

pub const FRIBB_ANIME_LIST_URL: &str = "https://raw.githubusercontent.com/Fribb/anime-lists/master/anime-list-full.json";

/// Fribb's `anime-list-full.json`: a flat array of cross-reference rows.
/// Maps AniList ids to TMDB series ids.
///
/// `MOVIE` rows carry a TMDB movie id, which the series endpoints cannot
/// serve, so they are left out and those items resolve through the later
/// steps instead.
#[derive(Debug, Clone, Copy)]
pub struct FribbAnimeList;

#[derive(Debug, Deserialize)]
struct FribbEntry {
    #[serde(default)]
    anilist_id: Option<Value>,
    #[serde(default)]
    themoviedb_id: Option<Value>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

impl FribbEntry {
    fn is_movie(&self) -> bool {
        self.kind
            .as_deref()
            .is_some_and(|kind| kind.trim().eq_ignore_ascii_case("movie"))
    }
}

/// Ids show up as numbers in most rows and as strings in a few.
fn lenient_id(value: Option<&Value>) -> Option<u32> {
    match value? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl SnapshotFormat for FribbAnimeList {
    const NAME: &'static str = "fribb-anime-list";
    const FILE_NAME: &'static str = "anime-list-full.json";

    fn parse(bytes: &[u8]) -> Result<ParsedSnapshot, SnapshotError> {
        let rows: Vec<Value> = serde_json::from_slice(bytes)
            .map_err(|e| SnapshotError::Parse(e.to_string()))?;

        let mut parsed = ParsedSnapshot::default();
        for row in rows {
            match serde_json::from_value::<FribbEntry>(row) {
                Ok(entry) if entry.is_movie() => parsed.excluded += 1,
                Ok(entry) => parsed.record(
                    lenient_id(entry.anilist_id.as_ref()),
                    lenient_id(entry.themoviedb_id.as_ref()),
                ),
                Err(_) => parsed.malformed += 1,
            }
        }
        Ok(parsed)
    }
}

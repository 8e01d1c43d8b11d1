use serde::Deserialize;
use serde_json::Value;
use url::Url;

use super::{ParsedSnapshot, SnapshotFormat};
use crate::error::SnapshotError;

pub const MANAMI_OFFLINE_DATABASE_URL: &str = "https://github.com/manami-project/anime-offline-database/releases/latest/download/anime-offline-database-minified.json";

/// manami's anime-offline-database. Each entry lists the pages it is known
/// by on every tracker; the AniList and MyAnimeList ids are read out of
/// those URLs.
#[derive(Debug, Clone, Copy)]
pub struct ManamiOfflineDatabase;

#[derive(Debug, Deserialize)]
struct ManamiDocument {
    data: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ManamiEntry {
    #[serde(default)]
    sources: Vec<String>,
}

/// Extract the numeric id from `https://{host}/anime/{id}`.
fn anime_id_for_host(source: &str, host: &str) -> Option<u32> {
    let url = Url::parse(source).ok()?;
    if url.host_str()?.trim_start_matches("www.") != host {
        return None;
    }
    let mut segments = url.path_segments()?;
    if segments.next()? != "anime" {
        return None;
    }
    segments.next()?.parse().ok()
}

impl SnapshotFormat for ManamiOfflineDatabase {
    const NAME: &'static str = "manami-offline-database";
    const FILE_NAME: &'static str = "anime-offline-database.json";

    fn parse(bytes: &[u8]) -> Result<ParsedSnapshot, SnapshotError> {
        let document: ManamiDocument = serde_json::from_slice(bytes)
            .map_err(|e| SnapshotError::Parse(e.to_string()))?;

        let mut parsed = ParsedSnapshot::default();
        for raw in document.data {
            let Ok(entry) = serde_json::from_value::<ManamiEntry>(raw) else {
                parsed.malformed += 1;
                continue;
            };
            let anilist = entry
                .sources
                .iter()
                .find_map(|s| anime_id_for_host(s, "anilist.co"));
            let mal = entry
                .sources
                .iter()
                .find_map(|s| anime_id_for_host(s, "myanimelist.net"));
            parsed.record(anilist, mal);
        }
        Ok(parsed)
    }
}

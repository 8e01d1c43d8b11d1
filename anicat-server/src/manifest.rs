use serde::Serialize;

use anicat_core::orchestrator::{CatalogDefinition, GENRES};

pub const ADDON_ID: &str = "org.anicat.addon";
pub const ID_PREFIXES: [&str; 4] = ["anilist", "tmdb", "mal", "kitsu"];

/// Addon manifest served at `/manifest.json` and written by the static build.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub id: &'static str,
    pub version: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub resources: Vec<&'static str>,
    pub types: Vec<&'static str>,
    pub id_prefixes: Vec<&'static str>,
    pub catalogs: Vec<ManifestCatalog>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManifestCatalog {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: &'static str,
    pub name: &'static str,
    pub extra: Vec<ManifestExtra>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestExtra {
    pub name: &'static str,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_required: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<&'static str>,
}

impl ManifestExtra {
    fn optional(name: &'static str) -> Self {
        Self {
            name,
            is_required: false,
            options: Vec::new(),
        }
    }
}

impl ManifestCatalog {
    fn from_definition(definition: &CatalogDefinition) -> Self {
        let extra = if definition.is_search() {
            vec![
                ManifestExtra {
                    name: "search",
                    is_required: true,
                    options: Vec::new(),
                },
                ManifestExtra::optional("skip"),
            ]
        } else {
            vec![
                ManifestExtra {
                    options: GENRES.to_vec(),
                    ..ManifestExtra::optional("genre")
                },
                ManifestExtra::optional("skip"),
            ]
        };

        Self {
            kind: "anime",
            id: definition.id,
            name: definition.name,
            extra,
        }
    }
}

impl Manifest {
    pub fn new(catalogs: &[CatalogDefinition], public_url: Option<&str>) -> Self {
        Self {
            id: ADDON_ID,
            version: env!("CARGO_PKG_VERSION"),
            name: "anicat",
            description: "Anime catalogs from AniList with TMDB and Kitsu details",
            resources: vec!["catalog", "meta"],
            types: vec!["anime", "series", "movie"],
            id_prefixes: ID_PREFIXES.to_vec(),
            catalogs: catalogs
                .iter()
                .map(ManifestCatalog::from_definition)
                .collect(),
            logo: public_url.map(|base| format!("{base}/logo.png")),
        }
    }
}

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::IdentifierError;

/// The externally-visible identifier of a media item, rendered as
/// `"{prefix}:{id}"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaIdentifier {
    /// AniList's own id; the fallback every resolution can produce.
    Anilist(u32),
    Tmdb(u32),
    Mal(u32),
    Kitsu(u32),
}

impl MediaIdentifier {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Anilist(_) => "anilist",
            Self::Tmdb(_) => "tmdb",
            Self::Mal(_) => "mal",
            Self::Kitsu(_) => "kitsu",
        }
    }

    pub fn id(&self) -> u32 {
        match *self {
            Self::Anilist(id) | Self::Tmdb(id) | Self::Mal(id) | Self::Kitsu(id) => {
                id
            }
        }
    }

    /// Cache key used for meta records of this identifier.
    pub fn meta_cache_key(&self) -> String {
        format!("meta:{self}")
    }
}

impl fmt::Display for MediaIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.prefix(), self.id())
    }
}

impl FromStr for MediaIdentifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, id) = s
            .split_once(':')
            .ok_or_else(|| IdentifierError::MissingPrefix(s.to_owned()))?;
        let id: u32 = id
            .parse()
            .map_err(|_| IdentifierError::InvalidId(s.to_owned()))?;

        match prefix {
            "anilist" => Ok(Self::Anilist(id)),
            "tmdb" => Ok(Self::Tmdb(id)),
            "mal" => Ok(Self::Mal(id)),
            "kitsu" => Ok(Self::Kitsu(id)),
            other => Err(IdentifierError::UnknownPrefix(other.to_owned())),
        }
    }
}

impl Serialize for MediaIdentifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MediaIdentifier {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

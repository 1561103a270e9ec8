use std::num::NonZeroU32;

use snafu::Snafu;

use super::*;

/// Identifier of a map in the schedule. Always positive.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, new,
)]
#[serde(transparent)]
pub struct MapId(NonZeroU32);

impl MapId {
    pub fn get(self) -> u32 {
        self.0.get()
    }

    /// Extract the map id at the start of a line such as `379 - Some Map`.
    pub fn from_leading_digits(text: &str) -> Option<MapId> {
        let text = text.trim_start();
        let end = text
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(text.len());

        text[..end].parse().ok()
    }
}

impl std::str::FromStr for MapId {
    type Err = ParseMapId;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        input
            .trim()
            .parse::<NonZeroU32>()
            .map(MapId)
            .map_err(|_| ParseMapId::new(input.to_string()))
    }
}

impl TryFrom<u32> for MapId {
    type Error = ParseMapId;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        NonZeroU32::new(value)
            .map(MapId)
            .ok_or_else(|| ParseMapId::new(value.to_string()))
    }
}

impl std::fmt::Display for MapId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Snafu, new)]
#[snafu(display("invalid map id: {text:?}"))]
pub struct ParseMapId {
    pub text: String,
}

/// Label of a server exposed by the schedule page, e.g. `Server 3`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(String);

impl ServerId {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// Server label for the numbered badge shown in the schedule table.
    pub fn numbered(number: u32) -> Self {
        Self(format!("Server {number}"))
    }
}

impl AsRef<str> for ServerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ServerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

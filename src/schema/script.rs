use serde::{Deserialize, Serialize};

use super::prompt::CharacterId;

/// Wire identity of the Script contract.
pub const SCRIPT_SCHEMA_ID: &str = "Script";
pub const SCRIPT_SCHEMA_VERSION: &str = "1.0.0";

/// Lighting of a scene, derived from its location text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeOfDay {
    Day,
    Night,
    Dawn,
    Dusk,
}

impl TimeOfDay {
    /// Infer the time of day from words in a location description.
    pub fn from_location(location: &str) -> Self {
        let lower = location.to_lowercase();
        let mentions = |words: &[&str]| words.iter().any(|w| lower.contains(w));
        if mentions(&["night", "midnight"]) {
            Self::Night
        } else if mentions(&["dawn", "sunrise"]) {
            Self::Dawn
        } else if mentions(&["dusk", "sunset", "evening"]) {
            Self::Dusk
        } else {
            Self::Day
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Night => "night",
            Self::Dawn => "dawn",
            Self::Dusk => "dusk",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BeatKind {
    Dialogue,
    Action,
}

/// One dialogue or action unit, attributed to a single character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Beat {
    #[serde(rename = "type")]
    pub kind: BeatKind,
    #[serde(rename = "speaker")]
    pub character_id: CharacterId,
    pub line: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scene {
    pub scene_id: String,
    pub location: String,
    pub time_of_day: TimeOfDay,
    #[serde(rename = "actions")]
    pub beats: Vec<Beat>,
}

/// The generated script document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Script {
    pub schema_id: String,
    pub schema_version: String,
    /// Back-reference to the originating Prompt's `prompt_id`.
    pub script_id: String,
    pub title: String,
    pub project_id: String,
    pub genre: String,
    pub scenes: Vec<Scene>,
}

impl Script {
    /// All beats across all scenes, in document order.
    pub fn beats(&self) -> impl Iterator<Item = &Beat> {
        self.scenes.iter().flat_map(|s| s.beats.iter())
    }

    pub fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// Identifier of the 1-based `ordinal`th scene.
pub fn scene_id(ordinal: usize) -> String {
    format!("scene_{}", ordinal)
}

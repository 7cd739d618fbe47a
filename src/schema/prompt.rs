use serde::{Deserialize, Serialize};
use std::fmt;

use super::role::Role;

/// Wire identity of the Prompt contract.
pub const PROMPT_SCHEMA_ID: &str = "StoryPrompt";
pub const PROMPT_SCHEMA_VERSION: &str = "1.0";

/// Newtype wrapper for character IDs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CharacterId(pub String);

impl CharacterId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CharacterId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A character declared by the brief.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Character {
    pub id: CharacterId,
    /// Free text such as "protagonist" or "antagonist".
    pub role: String,
}

impl Character {
    pub fn new(id: &str, role: &str) -> Self {
        Self {
            id: CharacterId::from(id),
            role: role.to_string(),
        }
    }

    pub fn role_kind(&self) -> Role {
        Role::parse(&self.role)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Series {
    pub title: String,
    pub genre: String,
    pub tone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Setting {
    pub primary_location: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Constraints {
    pub max_scenes: u64,
}

/// The structured episode brief. Produced upstream, read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Prompt {
    pub schema_id: String,
    pub schema_version: String,
    pub prompt_id: String,
    pub episode_goal: String,
    /// The only entropy source for generation.
    pub generation_seed: u64,
    pub series: Series,
    pub setting: Setting,
    pub characters: Vec<Character>,
    pub constraints: Constraints,
}

impl Prompt {
    /// Returns true if `id` is declared in `characters`.
    pub fn declares(&self, id: &str) -> bool {
        self.characters.iter().any(|c| c.id.as_str() == id)
    }

    pub fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

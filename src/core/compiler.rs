/// Story-text compiler: parses the line-oriented story format into a Prompt.
///
/// One `key: value` directive per line. Blank lines and `#` comments are
/// skipped. Scalar keys may appear once each; `character: <id> <role...>`
/// may repeat and keeps declaration order.
///
/// ```text
/// prompt_id:        ep001
/// episode_goal:     Find the hidden treasure
/// generation_seed:  42
/// series_title:     Western Tales
/// series_genre:     Western
/// series_tone:      Adventurous
/// primary_location: Old West Town
/// max_scenes:       3
/// character:        sheriff protagonist
/// character:        bandit antagonist
/// ```

use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::schema::prompt::{
    Character, Constraints, Prompt, Series, Setting, PROMPT_SCHEMA_ID, PROMPT_SCHEMA_VERSION,
};

/// Scalar directives, in the order missing ones are reported.
const SCALAR_KEYS: &[&str] = &[
    "prompt_id",
    "episode_goal",
    "generation_seed",
    "series_title",
    "series_genre",
    "series_tone",
    "primary_location",
    "max_scenes",
];

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("cannot read story file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: expected 'key: value', got '{text}'")]
    Syntax { line: usize, text: String },
    #[error("line {line}: unknown field '{key}'")]
    UnknownField { line: usize, key: String },
    #[error("line {line}: duplicate field '{key}'")]
    DuplicateField { line: usize, key: String },
    #[error("line {line}: field '{key}' must not be empty")]
    EmptyField { line: usize, key: String },
    #[error("line {line}: 'character' requires '<id> <role>', got '{value}'")]
    Character { line: usize, value: String },
    #[error("missing required field(s): {}", .0.join(", "))]
    MissingFields(Vec<String>),
    #[error("at least one 'character:' line is required")]
    NoCharacters,
    #[error("'{key}' must be a non-negative integer, got '{value}'")]
    NotAnInteger { key: String, value: String },
    #[error("'max_scenes' must be a positive integer, got {0}")]
    NonPositiveScenes(u64),
}

/// Parse story text into a Prompt. The result still needs contract validation.
pub fn parse_story(text: &str) -> Result<Prompt, CompileError> {
    let mut fields: FxHashMap<&str, &str> = FxHashMap::default();
    let mut characters = Vec::new();

    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let stripped = raw.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }

        let (key, value) = stripped.split_once(':').ok_or_else(|| CompileError::Syntax {
            line,
            text: stripped.to_string(),
        })?;
        let key = key.trim().to_lowercase();
        let value = value.trim();

        if key == "character" {
            let mut parts = value.split_whitespace();
            let id = parts.next();
            let role: Vec<&str> = parts.collect();
            match id {
                Some(id) if !role.is_empty() => {
                    characters.push(Character::new(id, &role.join(" ")));
                }
                _ => {
                    return Err(CompileError::Character {
                        line,
                        value: value.to_string(),
                    })
                }
            }
            continue;
        }

        let Some(known) = SCALAR_KEYS.iter().copied().find(|k| *k == key) else {
            return Err(CompileError::UnknownField { line, key });
        };
        if fields.contains_key(known) {
            return Err(CompileError::DuplicateField { line, key });
        }
        if value.is_empty() {
            return Err(CompileError::EmptyField { line, key });
        }
        fields.insert(known, value);
    }

    let missing: Vec<String> = SCALAR_KEYS
        .iter()
        .filter(|k| !fields.contains_key(*k))
        .map(|k| k.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(CompileError::MissingFields(missing));
    }
    if characters.is_empty() {
        return Err(CompileError::NoCharacters);
    }

    let field = |key: &str| fields.get(key).copied().unwrap_or_default().to_string();
    let generation_seed = parse_integer("generation_seed", &field("generation_seed"))?;
    let max_scenes = parse_integer("max_scenes", &field("max_scenes"))?;
    if max_scenes == 0 {
        return Err(CompileError::NonPositiveScenes(max_scenes));
    }

    tracing::debug!(
        prompt_id = %field("prompt_id"),
        characters = characters.len(),
        "story text compiled"
    );

    Ok(Prompt {
        schema_id: PROMPT_SCHEMA_ID.to_string(),
        schema_version: PROMPT_SCHEMA_VERSION.to_string(),
        prompt_id: field("prompt_id"),
        episode_goal: field("episode_goal"),
        generation_seed,
        series: Series {
            title: field("series_title"),
            genre: field("series_genre"),
            tone: field("series_tone"),
        },
        setting: Setting {
            primary_location: field("primary_location"),
        },
        characters,
        constraints: Constraints { max_scenes },
    })
}

/// Read and parse a story file.
pub fn compile_file(path: &Path) -> Result<Prompt, CompileError> {
    let text = std::fs::read_to_string(path).map_err(|source| CompileError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_story(&text)
}

fn parse_integer(key: &str, value: &str) -> Result<u64, CompileError> {
    value.parse().map_err(|_| CompileError::NotAnInteger {
        key: key.to_string(),
        value: value.to_string(),
    })
}

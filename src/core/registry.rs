/// Schema registry: versioned contract definitions loaded from RON.
///
/// Structural rules are data: each schema file declares its identity, a
/// shape tree and the semantic rules that apply on top of it. The built-in
/// registry is embedded at compile time and parsed once per process.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use thiserror::Error;

use crate::schema::prompt::{PROMPT_SCHEMA_ID, PROMPT_SCHEMA_VERSION};
use crate::schema::script::{SCRIPT_SCHEMA_ID, SCRIPT_SCHEMA_VERSION};

const BUILTIN_SOURCES: &[(&str, &str)] = &[
    (
        "StoryPrompt.v1.ron",
        include_str!("../../contracts/StoryPrompt.v1.ron"),
    ),
    ("Script.v1.ron", include_str!("../../contracts/Script.v1.ron")),
];

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("schema file {name}: {source}")]
    Parse {
        name: String,
        #[source]
        source: ron::error::SpannedError,
    },
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("schema {0} is defined more than once")]
    Duplicate(SchemaKey),
    #[error("built-in schema registry is unusable: {0}")]
    Builtin(String),
}

/// Composite registry key: `(schema_id, schema_version)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SchemaKey {
    pub id: String,
    pub version: String,
}

impl SchemaKey {
    pub fn new(id: &str, version: &str) -> Self {
        Self {
            id: id.to_string(),
            version: version.to_string(),
        }
    }

    pub fn story_prompt() -> Self {
        Self::new(PROMPT_SCHEMA_ID, PROMPT_SCHEMA_VERSION)
    }

    pub fn script() -> Self {
        Self::new(SCRIPT_SCHEMA_ID, SCRIPT_SCHEMA_VERSION)
    }
}

impl fmt::Display for SchemaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{}", self.id, self.version)
    }
}

/// Structural shape of a JSON value.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub enum Shape {
    String {
        #[serde(default)]
        non_blank: bool,
        #[serde(default)]
        one_of: Vec<String>,
    },
    Integer {
        #[serde(default)]
        minimum: Option<i64>,
        #[serde(default)]
        maximum: Option<i64>,
    },
    Array {
        items: Box<Shape>,
        #[serde(default)]
        min_items: usize,
    },
    Object {
        fields: Vec<FieldRule>,
        /// Reject keys not listed in `fields`.
        #[serde(default)]
        closed: bool,
    },
}

impl Shape {
    /// JSON type name this shape expects.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String { .. } => "string",
            Self::Integer { .. } => "integer",
            Self::Array { .. } => "array",
            Self::Object { .. } => "object",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FieldRule {
    pub name: String,
    #[serde(default = "default_required")]
    pub required: bool,
    pub shape: Shape,
}

fn default_required() -> bool {
    true
}

/// Cross-field rules a schema can opt into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum SemanticRule {
    /// `characters[*].id` is unique.
    UniqueCharacterIds,
    /// Every beat speaker is declared by the reference Prompt.
    DeclaredSpeakers,
    /// Scene count does not exceed the reference Prompt's `max_scenes`.
    SceneBound,
    /// `script_id` equals the reference Prompt's `prompt_id`.
    PromptReference,
    /// `scenes[i].scene_id` is `scene_<i+1>`.
    SequentialSceneIds,
}

impl SemanticRule {
    pub fn needs_reference(&self) -> bool {
        matches!(
            self,
            Self::DeclaredSpeakers | Self::SceneBound | Self::PromptReference
        )
    }
}

/// One versioned contract.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SchemaDefinition {
    pub id: String,
    pub version: String,
    #[serde(default)]
    pub semantic: Vec<SemanticRule>,
    pub root: Shape,
}

impl SchemaDefinition {
    pub fn key(&self) -> SchemaKey {
        SchemaKey::new(&self.id, &self.version)
    }

    pub fn parse_ron(name: &str, input: &str) -> Result<SchemaDefinition, RegistryError> {
        ron::from_str(input).map_err(|source| RegistryError::Parse {
            name: name.to_string(),
            source,
        })
    }
}

/// Immutable map from `(schema_id, schema_version)` to definitions.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<SchemaKey, SchemaDefinition>,
}

static BUILTIN: OnceLock<Result<Arc<SchemaRegistry>, String>> = OnceLock::new();

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The embedded `StoryPrompt` v1 / `Script` v1 registry, parsed on first use.
    pub fn builtin() -> Result<Arc<SchemaRegistry>, RegistryError> {
        BUILTIN
            .get_or_init(|| {
                let mut registry = SchemaRegistry::new();
                for (name, source) in BUILTIN_SOURCES {
                    let definition =
                        SchemaDefinition::parse_ron(name, source).map_err(|e| e.to_string())?;
                    registry.register(definition).map_err(|e| e.to_string())?;
                }
                tracing::debug!(schemas = registry.len(), "built-in schema registry loaded");
                Ok(Arc::new(registry))
            })
            .clone()
            .map_err(RegistryError::Builtin)
    }

    /// Add a definition. Keys are write-once.
    pub fn register(&mut self, definition: SchemaDefinition) -> Result<(), RegistryError> {
        let key = definition.key();
        if self.schemas.contains_key(&key) {
            return Err(RegistryError::Duplicate(key));
        }
        self.schemas.insert(key, definition);
        Ok(())
    }

    /// Load every `.ron` file in `dir`, in file-name order.
    pub fn load_dir(dir: &Path) -> Result<SchemaRegistry, RegistryError> {
        let io_err = |source| RegistryError::Io {
            path: dir.to_path_buf(),
            source,
        };
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.extension().and_then(|s| s.to_str()) == Some("ron") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut registry = SchemaRegistry::new();
        for path in paths {
            let contents = std::fs::read_to_string(&path).map_err(|source| RegistryError::Io {
                path: path.clone(),
                source,
            })?;
            let name = path.display().to_string();
            registry.register(SchemaDefinition::parse_ron(&name, &contents)?)?;
        }
        Ok(registry)
    }

    pub fn get(&self, key: &SchemaKey) -> Option<&SchemaDefinition> {
        self.schemas.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &SchemaKey> {
        self.schemas.keys()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

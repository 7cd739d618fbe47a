/// The Prompt → Script pipeline.
///
/// Wires together contract validation, deterministic generation and the
/// canonical writer. Every stage boundary is a hard stop: an invalid Prompt
/// never reaches the generator and an invalid Script is never written.

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::core::canonical::{self, WriteError, WriteReceipt};
use crate::core::compiler::{self, CompileError};
use crate::core::contract::{ContractError, Validator};
use crate::core::generator::{GenerateError, Generator};
use crate::core::phrases::{PhraseError, PhraseTable};
use crate::core::registry::{RegistryError, SchemaKey, SchemaRegistry};
use crate::schema::prompt::Prompt;
use crate::schema::script::Script;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("contract error: {0}")]
    Contract(#[from] ContractError),
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("generation error: {0}")]
    Generate(#[from] GenerateError),
    #[error("phrase table error: {0}")]
    Phrases(#[from] PhraseError),
    #[error("write error: {0}")]
    Write(#[from] WriteError),
    #[error("compile error: {0}")]
    Compile(#[from] CompileError),
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} is not valid JSON: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Validator + generator bundle. Built via `ScriptPipeline::builder()`.
#[derive(Debug, Clone)]
pub struct ScriptPipeline {
    validator: Validator,
    generator: Generator,
}

/// Builder for constructing a `ScriptPipeline`.
#[derive(Debug, Default)]
pub struct ScriptPipelineBuilder {
    schemas_dir: Option<PathBuf>,
    phrase_table_path: Option<PathBuf>,
    /// Directly provided registry (for testing without files).
    registry: Option<Arc<SchemaRegistry>>,
    /// Directly provided phrase table (for testing without files).
    phrases: Option<Arc<PhraseTable>>,
}

impl ScriptPipeline {
    pub fn builder() -> ScriptPipelineBuilder {
        ScriptPipelineBuilder::default()
    }

    /// Pipeline over the embedded contracts and phrase table.
    pub fn builtin() -> Result<Self, PipelineError> {
        Self::builder().build()
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    /// Validate a Prompt document and return the typed record.
    pub fn check_prompt(&self, document: &Value) -> Result<Prompt, PipelineError> {
        let prompt = self.validator.check_prompt(document)?;
        tracing::debug!(prompt_id = %prompt.prompt_id, "prompt accepted");
        Ok(prompt)
    }

    /// Generate a Script and validate it against its Prompt.
    pub fn generate(&self, prompt: &Prompt) -> Result<Script, PipelineError> {
        let candidate = self.generator.generate(prompt)?;
        let document = candidate.to_value().map_err(WriteError::Encode)?;
        Ok(self.validator.check_script(&document, prompt)?)
    }

    /// Re-check `script` against the registry, then commit it canonically.
    pub fn write(
        &self,
        script: &Script,
        prompt: &Prompt,
        path: &Path,
    ) -> Result<WriteReceipt, PipelineError> {
        let document = script.to_value().map_err(WriteError::Encode)?;
        let key = SchemaKey::script();
        self.validator
            .validate(&document, &key, Some(prompt))?
            .into_result(&key)?;
        Ok(canonical::write(&document, path)?)
    }

    /// Validate, generate, re-validate and write.
    pub fn run(&self, prompt_document: &Value, out: &Path) -> Result<WriteReceipt, PipelineError> {
        let prompt = self.check_prompt(prompt_document)?;
        let script = self.generate(&prompt)?;
        let receipt = self.write(&script, &prompt, out)?;
        tracing::info!(
            prompt_id = %prompt.prompt_id,
            seed = prompt.generation_seed,
            scenes = script.scenes.len(),
            path = %receipt.path.display(),
            "script written"
        );
        Ok(receipt)
    }

    /// `run` with the Prompt read from a JSON file.
    pub fn run_file(&self, prompt_path: &Path, out: &Path) -> Result<WriteReceipt, PipelineError> {
        let document = read_json(prompt_path)?;
        self.run(&document, out)
    }

    /// Compile story text from `story_path` into a validated Prompt.
    pub fn compile(&self, story_path: &Path) -> Result<Prompt, PipelineError> {
        let compiled = compiler::compile_file(story_path)?;
        let document = compiled.to_value().map_err(WriteError::Encode)?;
        self.check_prompt(&document)
    }
}

impl ScriptPipelineBuilder {
    /// Load contracts from a directory of `.ron` files instead of the embedded set.
    pub fn schemas_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.schemas_dir = Some(path.into());
        self
    }

    /// Load the phrase table from a RON file instead of the embedded one.
    pub fn phrase_table_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.phrase_table_path = Some(path.into());
        self
    }

    /// Provide a registry directly (for testing without files).
    pub fn with_registry(mut self, registry: SchemaRegistry) -> Self {
        self.registry = Some(Arc::new(registry));
        self
    }

    /// Provide a phrase table directly (for testing without files).
    pub fn with_phrase_table(mut self, phrases: PhraseTable) -> Self {
        self.phrases = Some(Arc::new(phrases));
        self
    }

    pub fn build(self) -> Result<ScriptPipeline, PipelineError> {
        let registry = match (self.registry, self.schemas_dir) {
            (Some(registry), _) => registry,
            (None, Some(dir)) => Arc::new(SchemaRegistry::load_dir(&dir)?),
            (None, None) => SchemaRegistry::builtin()?,
        };
        let phrases = match (self.phrases, self.phrase_table_path) {
            (Some(phrases), _) => phrases,
            (None, Some(path)) => Arc::new(PhraseTable::load_from_ron(&path)?),
            (None, None) => PhraseTable::builtin()?,
        };
        tracing::debug!(
            schemas = registry.len(),
            phrases = %phrases.version,
            "pipeline built"
        );
        Ok(ScriptPipeline {
            validator: Validator::new(registry),
            generator: Generator::new(phrases),
        })
    }
}

/// Read and parse a JSON document.
pub fn read_json(path: &Path) -> Result<Value, PipelineError> {
    let contents = std::fs::read_to_string(path).map_err(|source| PipelineError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| PipelineError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

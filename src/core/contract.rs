/// Contract validation: structural and semantic tiers.
///
/// Both tiers collect every violation they find; nothing fails fast. A
/// document is only converted into a typed record after it validates.

use rustc_hash::FxHashSet;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::core::registry::{
    FieldRule, RegistryError, SchemaDefinition, SchemaKey, SchemaRegistry, SemanticRule, Shape,
};
use crate::schema::prompt::Prompt;
use crate::schema::script::{scene_id, Script};

#[derive(Debug, Error)]
pub enum ContractError {
    #[error("schema not found: {0}")]
    SchemaNotFound(SchemaKey),
    #[error("{schema} validation failed: {}", summarize(.violations))]
    ValidationFailure {
        schema: SchemaKey,
        violations: Vec<Violation>,
    },
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
}

impl ContractError {
    /// The collected violations, if this is a validation failure.
    pub fn violations(&self) -> &[Violation] {
        match self {
            Self::ValidationFailure { violations, .. } => violations,
            _ => &[],
        }
    }
}

fn summarize(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(Violation::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// One broken rule: where, which rule, and what was observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub path: String,
    pub rule: String,
    pub actual: String,
}

impl Violation {
    fn new(path: &str, rule: impl Into<String>, actual: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            rule: rule.into(),
            actual: actual.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} (got {})", self.path, self.rule, self.actual)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Valid,
    Invalid(Vec<Violation>),
}

impl ValidationResult {
    fn from_violations(violations: Vec<Violation>) -> Self {
        if violations.is_empty() {
            Self::Valid
        } else {
            Self::Invalid(violations)
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    pub fn violations(&self) -> &[Violation] {
        match self {
            Self::Valid => &[],
            Self::Invalid(violations) => violations,
        }
    }

    /// Turn `Invalid` into a hard `ValidationFailure` error.
    pub fn into_result(self, schema: &SchemaKey) -> Result<(), ContractError> {
        match self {
            Self::Valid => Ok(()),
            Self::Invalid(violations) => Err(ContractError::ValidationFailure {
                schema: schema.clone(),
                violations,
            }),
        }
    }
}

/// Validates documents against a registry.
#[derive(Debug, Clone)]
pub struct Validator {
    registry: Arc<SchemaRegistry>,
}

impl Validator {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self { registry }
    }

    /// A validator over the embedded contracts.
    pub fn builtin() -> Result<Self, ContractError> {
        Ok(Self::new(SchemaRegistry::builtin()?))
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Validate `document` against the schema named by `key`.
    ///
    /// `reference` is the originating Prompt; rules that relate a Script to
    /// its Prompt report a violation when it is absent.
    pub fn validate(
        &self,
        document: &Value,
        key: &SchemaKey,
        reference: Option<&Prompt>,
    ) -> Result<ValidationResult, ContractError> {
        let definition = self
            .registry
            .get(key)
            .ok_or_else(|| ContractError::SchemaNotFound(key.clone()))?;

        let mut violations = Vec::new();
        check_shape(document, &definition.root, "$", &mut violations);
        check_identity(document, definition, &mut violations);
        for rule in &definition.semantic {
            check_semantic(*rule, document, reference, &mut violations);
        }

        if !violations.is_empty() {
            tracing::debug!(
                schema = %key,
                violations = violations.len(),
                "document failed validation"
            );
        }
        Ok(ValidationResult::from_violations(violations))
    }

    /// Validate a Prompt document and convert it to the typed record.
    pub fn check_prompt(&self, document: &Value) -> Result<Prompt, ContractError> {
        let key = SchemaKey::story_prompt();
        self.validate(document, &key, None)?.into_result(&key)?;
        into_record(document, &key)
    }

    /// Validate a Script document against `prompt` and convert it.
    pub fn check_script(&self, document: &Value, prompt: &Prompt) -> Result<Script, ContractError> {
        let key = SchemaKey::script();
        self.validate(document, &key, Some(prompt))?
            .into_result(&key)?;
        into_record(document, &key)
    }
}

/// Validate against the built-in registry.
pub fn validate(
    document: &Value,
    key: &SchemaKey,
    reference: Option<&Prompt>,
) -> Result<ValidationResult, ContractError> {
    Validator::builtin()?.validate(document, key, reference)
}

fn into_record<T: serde::de::DeserializeOwned>(
    document: &Value,
    key: &SchemaKey,
) -> Result<T, ContractError> {
    T::deserialize(document).map_err(|e| ContractError::ValidationFailure {
        schema: key.clone(),
        violations: vec![Violation::new("$", "typed_record", e.to_string())],
    })
}

fn child_path(parent: &str, field: &str) -> String {
    if parent == "$" {
        field.to_string()
    } else {
        format!("{}.{}", parent, field)
    }
}

fn index_path(parent: &str, index: usize) -> String {
    format!("{}[{}]", parent, index)
}

/// Short description of an observed value for violation reports.
fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("{:?}", s),
        Value::Array(items) => format!("array of {}", items.len()),
        Value::Object(_) => "object".to_string(),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn check_shape(value: &Value, shape: &Shape, path: &str, out: &mut Vec<Violation>) {
    match (shape, value) {
        (Shape::String { non_blank, one_of }, Value::String(s)) => {
            if *non_blank && s.trim().is_empty() {
                out.push(Violation::new(path, "non_blank", describe(value)));
            }
            if !one_of.is_empty() && !one_of.iter().any(|allowed| allowed == s) {
                out.push(Violation::new(
                    path,
                    format!("one_of({})", one_of.join("|")),
                    describe(value),
                ));
            }
        }
        (Shape::Integer { minimum, maximum }, Value::Number(n)) if n.is_i64() || n.is_u64() => {
            // Anything beyond i64 is above every representable bound.
            let observed = n.as_i64();
            if let (Some(min), Some(v)) = (minimum, observed) {
                if v < *min {
                    out.push(Violation::new(path, format!("minimum({})", min), n.to_string()));
                }
            }
            if let Some(max) = maximum {
                if observed.map_or(true, |v| v > *max) {
                    out.push(Violation::new(path, format!("maximum({})", max), n.to_string()));
                }
            }
        }
        (Shape::Array { items, min_items }, Value::Array(elements)) => {
            if elements.len() < *min_items {
                out.push(Violation::new(
                    path,
                    format!("min_items({})", min_items),
                    elements.len().to_string(),
                ));
            }
            for (i, element) in elements.iter().enumerate() {
                check_shape(element, items, &index_path(path, i), out);
            }
        }
        (Shape::Object { fields, closed }, Value::Object(map)) => {
            for FieldRule {
                name,
                required,
                shape,
            } in fields
            {
                let field_path = child_path(path, name);
                match map.get(name) {
                    Some(child) => check_shape(child, shape, &field_path, out),
                    None if *required => out.push(Violation::new(&field_path, "required", "missing")),
                    None => {}
                }
            }
            if *closed {
                for key in map.keys() {
                    if !fields.iter().any(|f| &f.name == key) {
                        out.push(Violation::new(
                            &child_path(path, key),
                            "additional_property",
                            "present",
                        ));
                    }
                }
            }
        }
        (shape, value) => {
            out.push(Violation::new(
                path,
                format!("type({})", shape.type_name()),
                json_type(value),
            ));
        }
    }
}

/// The document must declare the contract it is validated against.
fn check_identity(document: &Value, definition: &SchemaDefinition, out: &mut Vec<Violation>) {
    let declared = [
        ("schema_id", definition.id.as_str()),
        ("schema_version", definition.version.as_str()),
    ];
    for (field, expected) in declared {
        if let Some(actual) = document.get(field).and_then(Value::as_str) {
            if actual != expected {
                out.push(Violation::new(
                    field,
                    format!("schema_identity({})", expected),
                    describe(&Value::from(actual)),
                ));
            }
        }
    }
}

fn check_semantic(
    rule: SemanticRule,
    document: &Value,
    reference: Option<&Prompt>,
    out: &mut Vec<Violation>,
) {
    let prompt = match (rule.needs_reference(), reference) {
        (true, None) => {
            out.push(Violation::new(
                "$",
                "reference_prompt",
                format!("none supplied for {:?}", rule),
            ));
            return;
        }
        (_, prompt) => prompt,
    };

    match rule {
        SemanticRule::UniqueCharacterIds => {
            let mut seen = FxHashSet::default();
            for (i, character) in array_at(document, "characters").iter().enumerate() {
                if let Some(id) = character.get("id").and_then(Value::as_str) {
                    if !seen.insert(id) {
                        out.push(Violation::new(
                            &format!("characters[{}].id", i),
                            "unique_character_id",
                            describe(&Value::from(id)),
                        ));
                    }
                }
            }
        }
        SemanticRule::DeclaredSpeakers => {
            let Some(prompt) = prompt else { return };
            for (s, scene) in array_at(document, "scenes").iter().enumerate() {
                for (a, beat) in array_at(scene, "actions").iter().enumerate() {
                    if let Some(speaker) = beat.get("speaker").and_then(Value::as_str) {
                        if !prompt.declares(speaker) {
                            out.push(Violation::new(
                                &format!("scenes[{}].actions[{}].speaker", s, a),
                                "declared_speaker",
                                describe(&Value::from(speaker)),
                            ));
                        }
                    }
                }
            }
        }
        SemanticRule::SceneBound => {
            let Some(prompt) = prompt else { return };
            let count = array_at(document, "scenes").len();
            let bound = usize::try_from(prompt.constraints.max_scenes).unwrap_or(usize::MAX);
            if count > bound {
                out.push(Violation::new(
                    "scenes",
                    format!("scene_bound({})", bound),
                    count.to_string(),
                ));
            }
        }
        SemanticRule::PromptReference => {
            let Some(prompt) = prompt else { return };
            if let Some(script_id) = document.get("script_id").and_then(Value::as_str) {
                if script_id != prompt.prompt_id {
                    out.push(Violation::new(
                        "script_id",
                        format!("prompt_reference({})", prompt.prompt_id),
                        describe(&Value::from(script_id)),
                    ));
                }
            }
        }
        SemanticRule::SequentialSceneIds => {
            for (i, scene) in array_at(document, "scenes").iter().enumerate() {
                if let Some(id) = scene.get("scene_id").and_then(Value::as_str) {
                    let expected = scene_id(i + 1);
                    if id != expected {
                        out.push(Violation::new(
                            &format!("scenes[{}].scene_id", i),
                            format!("sequential_scene_id({})", expected),
                            describe(&Value::from(id)),
                        ));
                    }
                }
            }
        }
    }
}

/// Array under `field`, or empty when absent or mistyped (the structural
/// tier reports those).
fn array_at<'a>(value: &'a Value, field: &str) -> &'a [Value] {
    value
        .get(field)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn prompt_doc() -> Value {
        json!({
            "schema_id": "StoryPrompt",
            "schema_version": "1.0",
            "prompt_id": "ep001",
            "episode_goal": "Find the hidden treasure",
            "generation_seed": 42,
            "series": {"title": "Western Tales", "genre": "Western", "tone": "Adventurous"},
            "setting": {"primary_location": "Old West Town"},
            "characters": [
                {"id": "sheriff", "role": "protagonist"},
                {"id": "bandit", "role": "antagonist"}
            ],
            "constraints": {"max_scenes": 3}
        })
    }

    fn script_doc() -> Value {
        json!({
            "schema_id": "Script",
            "schema_version": "1.0.0",
            "script_id": "ep001",
            "title": "Find the hidden treasure",
            "project_id": "Western Tales",
            "genre": "Western",
            "scenes": [{
                "scene_id": "scene_1",
                "location": "Old West Town",
                "time_of_day": "day",
                "actions": [
                    {"type": "dialogue", "speaker": "sheriff", "line": "You came."},
                    {"type": "dialogue", "speaker": "bandit", "line": "I said I would."}
                ]
            }]
        })
    }

    fn validator() -> Validator {
        Validator::builtin().unwrap()
    }

    fn rules(result: &ValidationResult) -> Vec<(String, String)> {
        result
            .violations()
            .iter()
            .map(|v| (v.path.clone(), v.rule.clone()))
            .collect()
    }

    #[test]
    fn valid_prompt_passes() {
        let result = validator()
            .validate(&prompt_doc(), &SchemaKey::story_prompt(), None)
            .unwrap();
        assert_eq!(result, ValidationResult::Valid);
    }

    #[test]
    fn check_prompt_returns_record() {
        let prompt = validator().check_prompt(&prompt_doc()).unwrap();
        assert_eq!(prompt.prompt_id, "ep001");
        assert_eq!(prompt.generation_seed, 42);
        assert_eq!(prompt.characters.len(), 2);
    }

    #[test]
    fn unknown_schema_is_an_error() {
        let err = validator()
            .validate(&prompt_doc(), &SchemaKey::new("StoryPrompt", "9.9"), None)
            .unwrap_err();
        assert!(matches!(err, ContractError::SchemaNotFound(key) if key.version == "9.9"));
    }

    #[test]
    fn all_structural_violations_collected() {
        let mut doc = prompt_doc();
        doc.as_object_mut().unwrap().remove("episode_goal");
        doc["generation_seed"] = json!(-1);
        doc["series"]["tone"] = json!("   ");
        doc["constraints"]["max_scenes"] = json!(0);
        doc["extra"] = json!(true);

        let result = validator()
            .validate(&doc, &SchemaKey::story_prompt(), None)
            .unwrap();
        let found = rules(&result);
        assert!(found.contains(&("episode_goal".into(), "required".into())));
        assert!(found.contains(&("generation_seed".into(), "minimum(0)".into())));
        assert!(found.contains(&("series.tone".into(), "non_blank".into())));
        assert!(found.contains(&("constraints.max_scenes".into(), "minimum(1)".into())));
        assert!(found.contains(&("extra".into(), "additional_property".into())));
        assert_eq!(found.len(), 5);
    }

    #[test]
    fn type_mismatches_reported_with_observed_type() {
        let mut doc = prompt_doc();
        doc["generation_seed"] = json!("42");
        doc["constraints"]["max_scenes"] = json!(true);
        doc["characters"][0]["id"] = json!(7);

        let result = validator()
            .validate(&doc, &SchemaKey::story_prompt(), None)
            .unwrap();
        let violations = result.violations();
        assert_eq!(violations.len(), 3);
        assert_eq!(violations[0].path, "generation_seed");
        assert_eq!(violations[0].rule, "type(integer)");
        assert_eq!(violations[0].actual, "string");
        assert_eq!(violations[1].path, "characters[0].id");
        assert_eq!(violations[1].actual, "integer");
        assert_eq!(violations[2].path, "constraints.max_scenes");
        assert_eq!(violations[2].actual, "boolean");
    }

    #[test]
    fn fractional_numbers_are_not_integers() {
        let mut doc = prompt_doc();
        doc["constraints"]["max_scenes"] = json!(2.5);
        let result = validator()
            .validate(&doc, &SchemaKey::story_prompt(), None)
            .unwrap();
        assert_eq!(
            rules(&result),
            vec![("constraints.max_scenes".into(), "type(integer)".into())]
        );
    }

    #[test]
    fn max_scenes_has_no_ceiling() {
        for max in [100, u64::MAX] {
            let mut doc = prompt_doc();
            doc["constraints"]["max_scenes"] = json!(max);
            let prompt = validator().check_prompt(&doc).unwrap();
            assert_eq!(prompt.constraints.max_scenes, max);
        }
    }

    #[test]
    fn integer_bounds_checked() {
        let shape = Shape::Integer {
            minimum: Some(1),
            maximum: Some(10),
        };
        let mut out = Vec::new();
        for value in [json!(0), json!(5), json!(11), json!(u64::MAX)] {
            check_shape(&value, &shape, "n", &mut out);
        }
        let found: Vec<&str> = out.iter().map(|v| v.rule.as_str()).collect();
        assert_eq!(found, vec!["minimum(1)", "maximum(10)", "maximum(10)"]);
    }

    #[test]
    fn huge_seed_is_still_valid() {
        let mut doc = prompt_doc();
        doc["generation_seed"] = json!(u64::MAX);
        let prompt = validator().check_prompt(&doc).unwrap();
        assert_eq!(prompt.generation_seed, u64::MAX);
    }

    #[test]
    fn duplicate_character_ids_rejected() {
        let mut doc = prompt_doc();
        doc["characters"][1]["id"] = json!("sheriff");
        let result = validator()
            .validate(&doc, &SchemaKey::story_prompt(), None)
            .unwrap();
        assert_eq!(
            rules(&result),
            vec![("characters[1].id".into(), "unique_character_id".into())]
        );
    }

    #[test]
    fn empty_characters_pass_structurally() {
        let mut doc = prompt_doc();
        doc["characters"] = json!([]);
        assert!(validator().check_prompt(&doc).is_ok());
    }

    #[test]
    fn script_validated_against_prompt_schema_is_rejected() {
        let result = validator()
            .validate(&script_doc(), &SchemaKey::story_prompt(), None)
            .unwrap();
        let found = rules(&result);
        assert!(found.contains(&("schema_id".into(), "schema_identity(StoryPrompt)".into())));
        assert!(found.contains(&("schema_version".into(), "schema_identity(1.0)".into())));
    }

    #[test]
    fn valid_script_passes_against_prompt() {
        let prompt = validator().check_prompt(&prompt_doc()).unwrap();
        let script = validator().check_script(&script_doc(), &prompt).unwrap();
        assert_eq!(script.scenes.len(), 1);
        assert_eq!(script.beats().count(), 2);
    }

    #[test]
    fn undeclared_speaker_rejected() {
        let prompt = validator().check_prompt(&prompt_doc()).unwrap();
        let mut doc = script_doc();
        doc["scenes"][0]["actions"][1]["speaker"] = json!("deputy");
        let err = validator().check_script(&doc, &prompt).unwrap_err();
        let violations = err.violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, "scenes[0].actions[1].speaker");
        assert_eq!(violations[0].rule, "declared_speaker");
        assert_eq!(violations[0].actual, "\"deputy\"");
    }

    #[test]
    fn scene_bound_and_sequence_enforced() {
        let mut prompt = validator().check_prompt(&prompt_doc()).unwrap();
        prompt.constraints.max_scenes = 1;
        let mut doc = script_doc();
        let mut second = doc["scenes"][0].clone();
        second["scene_id"] = json!("scene_7");
        doc["scenes"].as_array_mut().unwrap().push(second);

        let result = validator()
            .validate(&doc, &SchemaKey::script(), Some(&prompt))
            .unwrap();
        let found = rules(&result);
        assert!(found.contains(&("scenes".into(), "scene_bound(1)".into())));
        assert!(found.contains(&(
            "scenes[1].scene_id".into(),
            "sequential_scene_id(scene_2)".into()
        )));
    }

    #[test]
    fn script_reference_required() {
        let result = validator()
            .validate(&script_doc(), &SchemaKey::script(), None)
            .unwrap();
        assert!(!result.is_valid());
        assert!(result
            .violations()
            .iter()
            .all(|v| v.path == "$" && v.rule == "reference_prompt"));
        assert_eq!(result.violations().len(), 3);
    }

    #[test]
    fn script_id_must_reference_prompt() {
        let prompt = validator().check_prompt(&prompt_doc()).unwrap();
        let mut doc = script_doc();
        doc["script_id"] = json!("ep002");
        let err = validator().check_script(&doc, &prompt).unwrap_err();
        assert_eq!(err.violations()[0].rule, "prompt_reference(ep001)");
    }

    #[test]
    fn empty_scene_list_rejected() {
        let prompt = validator().check_prompt(&prompt_doc()).unwrap();
        let mut doc = script_doc();
        doc["scenes"] = json!([]);
        let err = validator().check_script(&doc, &prompt).unwrap_err();
        assert_eq!(err.violations()[0].rule, "min_items(1)");
    }

    #[test]
    fn failure_message_lists_violations() {
        let mut doc = prompt_doc();
        doc["constraints"]["max_scenes"] = json!(0);
        let err = validator().check_prompt(&doc).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("StoryPrompt v1.0"));
        assert!(message.contains("constraints.max_scenes: minimum(1) (got 0)"));
    }
}

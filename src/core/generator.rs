/// Deterministic generator: expands a validated Prompt into a Script.
///
/// All choices come from one [`SeededSequence`] keyed by the Prompt's
/// `generation_seed`. Draws are taken in a fixed order that depends only on
/// the chosen scene count and the number of characters:
///
/// 1. one draw for the scene count;
/// 2. per scene: one location draw, one appearance roll per character, one
///    ordering key per character, one line draw per character and one
///    closing draw.
///
/// Draws are consumed even when their result goes unused (the first scene's
/// location, lines of absent characters, the closing line of a solo scene),
/// so edits to phrase text never shift later choices.

use rand::SeedableRng;
use rustc_hash::FxHashSet;
use std::sync::Arc;
use thiserror::Error;

use crate::core::phrases::{Bindings, PhraseError, PhraseTable};
use crate::core::sequence::{fnv1a64, weighted_index, SeededSequence};
use crate::schema::prompt::{Character, Prompt, PROMPT_SCHEMA_ID, PROMPT_SCHEMA_VERSION};
use crate::schema::role::tag_value;
use crate::schema::script::{
    scene_id, Beat, Scene, Script, TimeOfDay, SCRIPT_SCHEMA_ID, SCRIPT_SCHEMA_VERSION,
};

/// Widest scene-count profile. Larger `max_scenes` values are accepted but
/// the count is drawn from `[1, SCENE_SUPPORT]`.
pub const SCENE_SUPPORT: u64 = 99;

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("precondition violated: {0}")]
    PreconditionViolation(String),
    #[error("insufficient input: {0}")]
    InsufficientInput(String),
    #[error("phrase table error: {0}")]
    PhraseTable(#[from] PhraseError),
}

/// A declared character with its resolved presence and tag.
struct CastMember<'a> {
    character: &'a Character,
    presence: u64,
    role_tag: String,
}

/// Per-run state threaded through scene construction.
struct Run<'a> {
    prompt: &'a Prompt,
    cast: Vec<CastMember<'a>>,
    base_tags: Vec<String>,
    sequence: SeededSequence,
    scene_count: usize,
}

/// Generator bound to a phrase table.
#[derive(Debug, Clone)]
pub struct Generator {
    phrases: Arc<PhraseTable>,
}

impl Generator {
    pub fn new(phrases: Arc<PhraseTable>) -> Self {
        Self { phrases }
    }

    /// Generator over the embedded phrase table.
    pub fn builtin() -> Result<Self, GenerateError> {
        Ok(Self::new(PhraseTable::builtin()?))
    }

    /// Produce a Script candidate. The caller is expected to re-validate it.
    pub fn generate(&self, prompt: &Prompt) -> Result<Script, GenerateError> {
        check_preconditions(prompt)?;

        let mut sequence = SeededSequence::seed_from_u64(prompt.generation_seed);
        let scene_count = draw_scene_count(&mut sequence, prompt);

        let cast = prompt
            .characters
            .iter()
            .map(|character| {
                let role = character.role_kind();
                CastMember {
                    character,
                    presence: role.presence(),
                    role_tag: role.tag(),
                }
            })
            .collect();
        let mut run = Run {
            prompt,
            cast,
            base_tags: vec![
                format!("genre:{}", tag_value(&prompt.series.genre)),
                format!("tone:{}", tag_value(&prompt.series.tone)),
            ],
            sequence,
            scene_count,
        };

        let mut scenes = Vec::with_capacity(scene_count);
        for index in 0..scene_count {
            scenes.push(self.scene(&mut run, index)?);
        }

        tracing::debug!(
            prompt_id = %prompt.prompt_id,
            seed = prompt.generation_seed,
            scenes = scenes.len(),
            draws = run.sequence.draws(),
            phrases = %self.phrases.version,
            "script generated"
        );

        Ok(Script {
            schema_id: SCRIPT_SCHEMA_ID.to_string(),
            schema_version: SCRIPT_SCHEMA_VERSION.to_string(),
            script_id: prompt.prompt_id.clone(),
            title: prompt.episode_goal.clone(),
            project_id: prompt.series.title.clone(),
            genre: prompt.series.genre.clone(),
            scenes,
        })
    }

    fn scene(&self, run: &mut Run<'_>, index: usize) -> Result<Scene, GenerateError> {
        let prompt = run.prompt;
        let primary = prompt.setting.primary_location.as_str();

        let location_draw = run.sequence.next_draw();
        let location = if index == 0 {
            primary.to_string()
        } else {
            match weighted_index(location_draw, &self.phrases.location_weights()) {
                Some(i) => self.phrases.locations[i].template.render(&Bindings {
                    speaker: "",
                    partner: "",
                    location: primary,
                    series: &prompt.series.title,
                }),
                None => primary.to_string(),
            }
        };

        let mut appears: Vec<bool> = Vec::with_capacity(run.cast.len());
        for member in &run.cast {
            appears.push(run.sequence.below(100) < member.presence);
        }
        if !appears.iter().any(|a| *a) {
            let top = run.cast.iter().map(|m| m.presence).max().unwrap_or(0);
            if let Some(i) = run.cast.iter().position(|m| m.presence == top) {
                appears[i] = true;
            }
        }

        let keys: Vec<u64> = run.cast.iter().map(|_| run.sequence.next_draw()).collect();
        let line_draws: Vec<u64> = run.cast.iter().map(|_| run.sequence.next_draw()).collect();
        let closing_draw = run.sequence.next_draw();

        let mut order: Vec<usize> = (0..run.cast.len()).filter(|i| appears[*i]).collect();
        order.sort_by_key(|i| (keys[*i], *i));
        let solo = order.len() < 2;

        let mut scene_tags = Vec::new();
        if index == 0 {
            scene_tags.push("scene:opening");
        }
        if run.scene_count > 1 && index + 1 == run.scene_count {
            scene_tags.push("scene:closing");
        }

        let mut beats = Vec::with_capacity(order.len() + 1);
        for (position, &speaker) in order.iter().enumerate() {
            let partner = if solo {
                None
            } else {
                Some(order[(position + 1) % order.len()])
            };
            beats.push(self.beat(run, speaker, partner, &scene_tags, &location, line_draws[speaker])?);
        }
        if !solo {
            let mut closing_tags = scene_tags.clone();
            closing_tags.push("beat:closing");
            beats.push(self.beat(run, order[0], Some(order[1]), &closing_tags, &location, closing_draw)?);
        }

        let time_of_day = TimeOfDay::from_location(&location);
        tracing::trace!(
            scene = index + 1,
            location = %location,
            time_of_day = time_of_day.as_str(),
            beats = beats.len(),
            "scene built"
        );

        Ok(Scene {
            scene_id: scene_id(index + 1),
            time_of_day,
            location,
            beats,
        })
    }

    fn beat(
        &self,
        run: &Run<'_>,
        speaker: usize,
        partner: Option<usize>,
        scene_tags: &[&str],
        location: &str,
        draw: u64,
    ) -> Result<Beat, GenerateError> {
        let member = &run.cast[speaker];
        let mut tags: FxHashSet<String> = run.base_tags.iter().cloned().collect();
        tags.insert(member.role_tag.clone());
        tags.extend(scene_tags.iter().map(|t| t.to_string()));

        let candidates = self.phrases.candidates(&tags, partner.is_none());
        let weights: Vec<u64> = candidates.iter().map(|c| c.weight).collect();
        let chosen = weighted_index(draw, &weights)
            .map(|i| candidates[i].alternative)
            .ok_or_else(|| PhraseError::Incomplete {
                version: self.phrases.version.clone(),
                reason: format!("no line matches {} for {}", member.role_tag, member.character.id),
            })?;

        let line = chosen.template.render(&Bindings {
            speaker: member.character.id.as_str(),
            partner: partner.map_or("", |p| run.cast[p].character.id.as_str()),
            location,
            series: &run.prompt.series.title,
        });

        Ok(Beat {
            kind: chosen.kind,
            character_id: member.character.id.clone(),
            line,
        })
    }
}

/// Generate with the embedded phrase table.
pub fn generate(prompt: &Prompt) -> Result<Script, GenerateError> {
    Generator::builtin()?.generate(prompt)
}

fn check_preconditions(prompt: &Prompt) -> Result<(), GenerateError> {
    if prompt.schema_id != PROMPT_SCHEMA_ID || prompt.schema_version != PROMPT_SCHEMA_VERSION {
        return Err(GenerateError::PreconditionViolation(format!(
            "expected {} v{}, got {} v{}",
            PROMPT_SCHEMA_ID, PROMPT_SCHEMA_VERSION, prompt.schema_id, prompt.schema_version
        )));
    }
    if prompt.constraints.max_scenes == 0 {
        return Err(GenerateError::PreconditionViolation(
            "max_scenes must be a positive integer, got 0".to_string(),
        ));
    }
    let mut seen = FxHashSet::default();
    for character in &prompt.characters {
        if !seen.insert(character.id.as_str()) {
            return Err(GenerateError::PreconditionViolation(format!(
                "duplicate character id '{}'",
                character.id
            )));
        }
    }
    if prompt.characters.is_empty() {
        return Err(GenerateError::InsufficientInput(format!(
            "prompt '{}' declares no characters",
            prompt.prompt_id
        )));
    }
    Ok(())
}

/// Draw the scene count from a triangular profile over
/// `[1, min(max_scenes, SCENE_SUPPORT)]`.
///
/// The peak sits at a target folded from the episode goal and genre, so
/// prompts with different premises lean toward different lengths while
/// still depending on the seed.
fn draw_scene_count(sequence: &mut SeededSequence, prompt: &Prompt) -> usize {
    let weights = scene_count_weights(prompt);
    sequence.pick_weighted(&weights).unwrap_or(0) + 1
}

fn scene_count_weights(prompt: &Prompt) -> Vec<u64> {
    let max = prompt.constraints.max_scenes.clamp(1, SCENE_SUPPORT);
    let target = 1 + scene_target_hash(prompt) % max;
    (1..=max).map(|k| max - k.abs_diff(target) + 1).collect()
}

fn scene_target_hash(prompt: &Prompt) -> u64 {
    fnv1a64(prompt.episode_goal.as_bytes()) ^ fnv1a64(prompt.series.genre.as_bytes()).rotate_left(17)
}

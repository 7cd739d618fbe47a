/// Phrase table: versioned, tag-matched line templates and location variants.

use rustc_hash::FxHashSet;
use serde::Deserialize;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use thiserror::Error;

use crate::schema::script::BeatKind;

const BUILTIN_TABLE: &str = include_str!("../../phrase_data/phrases.v1.ron");

#[derive(Debug, Error)]
pub enum PhraseError {
    #[error("template parse error: {0}")]
    TemplateParse(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("phrase table {version} is incomplete: {reason}")]
    Incomplete { version: String, reason: String },
    #[error("built-in phrase table is unusable: {0}")]
    Builtin(String),
}

/// Named values a template can interpolate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Speaker,
    Partner,
    Location,
    Series,
}

impl Slot {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "speaker" => Some(Self::Speaker),
            "partner" => Some(Self::Partner),
            "location" => Some(Self::Location),
            "series" => Some(Self::Series),
            _ => None,
        }
    }
}

/// A segment of a parsed template.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateSegment {
    /// Literal text, emitted as-is.
    Literal(String),
    /// `{speaker}`, `{partner}`, `{location}` or `{series}`.
    Slot(Slot),
}

/// A parsed template: a sequence of segments.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub segments: Vec<TemplateSegment>,
}

/// Values bound to slots while rendering one line.
#[derive(Debug, Clone, Copy)]
pub struct Bindings<'a> {
    pub speaker: &'a str,
    pub partner: &'a str,
    pub location: &'a str,
    pub series: &'a str,
}

impl Template {
    /// Parse a template string into a sequence of segments.
    ///
    /// Syntax:
    /// - `{slot}` → `Slot`, where slot is one of speaker, partner, location, series
    /// - `{{` / `}}` → literal `{` / `}`
    /// - Everything else → `Literal`
    pub fn parse(input: &str) -> Result<Template, PhraseError> {
        let mut segments = Vec::new();
        let mut literal_buf = String::new();
        let chars: Vec<char> = input.chars().collect();
        let len = chars.len();
        let mut i = 0;

        while i < len {
            if chars[i] == '{' {
                if i + 1 < len && chars[i + 1] == '{' {
                    literal_buf.push('{');
                    i += 2;
                    continue;
                }

                if !literal_buf.is_empty() {
                    segments.push(TemplateSegment::Literal(std::mem::take(&mut literal_buf)));
                }

                let start = i + 1;
                let mut end = start;
                while end < len && chars[end] != '}' {
                    if chars[end] == '{' {
                        return Err(PhraseError::TemplateParse(
                            "nested braces are not allowed".to_string(),
                        ));
                    }
                    end += 1;
                }
                if end == len {
                    return Err(PhraseError::TemplateParse("unclosed brace".to_string()));
                }

                let name: String = chars[start..end].iter().collect();
                if name.is_empty() {
                    return Err(PhraseError::TemplateParse("empty braces".to_string()));
                }
                let slot = Slot::parse(&name).ok_or_else(|| {
                    PhraseError::TemplateParse(format!("unknown slot '{}'", name))
                })?;
                segments.push(TemplateSegment::Slot(slot));
                i = end + 1;
            } else if chars[i] == '}' {
                if i + 1 < len && chars[i + 1] == '}' {
                    literal_buf.push('}');
                    i += 2;
                    continue;
                }
                return Err(PhraseError::TemplateParse(
                    "unmatched closing brace".to_string(),
                ));
            } else {
                literal_buf.push(chars[i]);
                i += 1;
            }
        }

        if !literal_buf.is_empty() {
            segments.push(TemplateSegment::Literal(literal_buf));
        }

        Ok(Template { segments })
    }

    pub fn uses(&self, slot: Slot) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, TemplateSegment::Slot(used) if *used == slot))
    }

    pub fn render(&self, bindings: &Bindings<'_>) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                TemplateSegment::Literal(text) => out.push_str(text),
                TemplateSegment::Slot(Slot::Speaker) => out.push_str(bindings.speaker),
                TemplateSegment::Slot(Slot::Partner) => out.push_str(bindings.partner),
                TemplateSegment::Slot(Slot::Location) => out.push_str(bindings.location),
                TemplateSegment::Slot(Slot::Series) => out.push_str(bindings.series),
            }
        }
        out
    }
}

/// A weighted line within an entry.
#[derive(Debug, Clone)]
pub struct Alternative {
    pub weight: u32,
    pub kind: BeatKind,
    pub template: Template,
}

/// Tag-gated group of alternatives.
#[derive(Debug, Clone)]
pub struct PhraseEntry {
    pub requires: Vec<String>,
    pub excludes: Vec<String>,
    pub alternatives: Vec<Alternative>,
}

impl PhraseEntry {
    pub fn matches(&self, tags: &FxHashSet<String>) -> bool {
        self.requires.iter().all(|t| tags.contains(t))
            && !self.excludes.iter().any(|t| tags.contains(t))
    }

    /// Specificity boost: entries with more required tags win more often.
    fn boost(&self) -> u64 {
        1 + self.requires.len() as u64
    }
}

/// A location variant template (`{location}` and `{series}` only).
#[derive(Debug, Clone)]
pub struct LocationVariant {
    pub weight: u32,
    pub template: Template,
}

/// A candidate line together with its effective weight.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub alternative: &'a Alternative,
    pub weight: u64,
}

/// The full versioned table.
#[derive(Debug, Clone)]
pub struct PhraseTable {
    pub version: String,
    pub entries: Vec<PhraseEntry>,
    pub locations: Vec<LocationVariant>,
}

// RON deserialization helpers: the file stores raw template text, so we
// parse through intermediate structs.

#[derive(Debug, Clone, Copy, Default, Deserialize)]
enum RonKind {
    #[default]
    Dialogue,
    Action,
}

impl From<RonKind> for BeatKind {
    fn from(kind: RonKind) -> Self {
        match kind {
            RonKind::Dialogue => BeatKind::Dialogue,
            RonKind::Action => BeatKind::Action,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RonAlternative {
    weight: u32,
    #[serde(default)]
    kind: RonKind,
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename = "Entry")]
struct RonEntry {
    #[serde(default)]
    requires: Vec<String>,
    #[serde(default)]
    excludes: Vec<String>,
    alternatives: Vec<RonAlternative>,
}

#[derive(Debug, Deserialize)]
#[serde(rename = "Variant")]
struct RonVariant {
    weight: u32,
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename = "PhraseTable")]
struct RonTable {
    version: String,
    entries: Vec<RonEntry>,
    locations: Vec<RonVariant>,
}

static BUILTIN: OnceLock<Result<Arc<PhraseTable>, String>> = OnceLock::new();

impl PhraseTable {
    /// The embedded table, parsed and checked on first use.
    pub fn builtin() -> Result<Arc<PhraseTable>, PhraseError> {
        BUILTIN
            .get_or_init(|| {
                let table = PhraseTable::parse_ron(BUILTIN_TABLE).map_err(|e| e.to_string())?;
                tracing::debug!(
                    version = %table.version,
                    entries = table.entries.len(),
                    "built-in phrase table loaded"
                );
                Ok(Arc::new(table))
            })
            .clone()
            .map_err(PhraseError::Builtin)
    }

    /// Load a phrase table from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<PhraseTable, PhraseError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse and check a phrase table from a RON string.
    pub fn parse_ron(input: &str) -> Result<PhraseTable, PhraseError> {
        let raw: RonTable = ron::from_str(input)?;

        let mut entries = Vec::with_capacity(raw.entries.len());
        for entry in raw.entries {
            let mut alternatives = Vec::with_capacity(entry.alternatives.len());
            for alt in entry.alternatives {
                alternatives.push(Alternative {
                    weight: alt.weight,
                    kind: alt.kind.into(),
                    template: Template::parse(&alt.text)?,
                });
            }
            entries.push(PhraseEntry {
                requires: entry.requires,
                excludes: entry.excludes,
                alternatives,
            });
        }

        let mut locations = Vec::with_capacity(raw.locations.len());
        for variant in raw.locations {
            let template = Template::parse(&variant.text)?;
            if template.uses(Slot::Speaker) || template.uses(Slot::Partner) {
                return Err(PhraseError::TemplateParse(format!(
                    "location variant '{}' may only use {{location}} and {{series}}",
                    variant.text
                )));
            }
            locations.push(LocationVariant {
                weight: variant.weight,
                template,
            });
        }

        let table = PhraseTable {
            version: raw.version,
            entries,
            locations,
        };
        table.check()?;
        Ok(table)
    }

    /// A table must always be able to produce a line and a location.
    fn check(&self) -> Result<(), PhraseError> {
        let incomplete = |reason: &str| PhraseError::Incomplete {
            version: self.version.clone(),
            reason: reason.to_string(),
        };
        let has_fallback = self.entries.iter().any(|entry| {
            entry.requires.is_empty()
                && entry.excludes.is_empty()
                && entry.alternatives.iter().any(|alt| {
                    alt.weight > 0
                        && alt.kind == BeatKind::Dialogue
                        && !alt.template.uses(Slot::Partner)
                })
        });
        if !has_fallback {
            return Err(incomplete(
                "no untagged entry with a weighted, partner-free dialogue line",
            ));
        }
        if !self.locations.iter().any(|variant| variant.weight > 0) {
            return Err(incomplete("no weighted location variant"));
        }
        Ok(())
    }

    /// Every alternative whose entry matches `tags`, in table order.
    ///
    /// Lines that address `{partner}` are left out when `solo` is set.
    pub fn candidates(&self, tags: &FxHashSet<String>, solo: bool) -> Vec<Candidate<'_>> {
        let mut out = Vec::new();
        for entry in self.entries.iter().filter(|e| e.matches(tags)) {
            for alternative in &entry.alternatives {
                if solo && alternative.template.uses(Slot::Partner) {
                    continue;
                }
                out.push(Candidate {
                    alternative,
                    weight: u64::from(alternative.weight) * entry.boost(),
                });
            }
        }
        out
    }

    pub fn location_weights(&self) -> Vec<u64> {
        self.locations.iter().map(|v| u64::from(v.weight)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(list: &[&str]) -> FxHashSet<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    const SMALL_TABLE: &str = r#"PhraseTable(
        version: "test-1",
        entries: [
            Entry(
                alternatives: [
                    (weight: 2, text: "We should move."),
                    (weight: 1, text: "Stay close, {partner}."),
                ],
            ),
            Entry(
                requires: ["genre:western"],
                excludes: ["tone:comic"],
                alternatives: [
                    (weight: 3, text: "Dust on the wind."),
                    (weight: 1, kind: Action, text: "{speaker} tips a hat."),
                ],
            ),
        ],
        locations: [
            Variant(weight: 3, text: "{location}"),
            Variant(weight: 1, text: "behind {location}"),
        ],
    )"#;

    #[test]
    fn parse_literal_only() {
        let t = Template::parse("Hello, world.").unwrap();
        assert_eq!(
            t.segments,
            vec![TemplateSegment::Literal("Hello, world.".to_string())]
        );
    }

    #[test]
    fn parse_slots() {
        let t = Template::parse("{speaker} looks at {partner} near {location}.").unwrap();
        assert_eq!(t.segments.len(), 6);
        assert_eq!(t.segments[0], TemplateSegment::Slot(Slot::Speaker));
        assert_eq!(t.segments[2], TemplateSegment::Slot(Slot::Partner));
        assert_eq!(t.segments[4], TemplateSegment::Slot(Slot::Location));
        assert!(t.uses(Slot::Partner));
        assert!(!t.uses(Slot::Series));
    }

    #[test]
    fn parse_escaped_braces() {
        let t = Template::parse("Use {{braces}} here.").unwrap();
        assert_eq!(
            t.segments,
            vec![TemplateSegment::Literal("Use {braces} here.".to_string())]
        );
    }

    #[test]
    fn parse_errors() {
        assert!(Template::parse("Bad {} here").is_err());
        assert!(Template::parse("Bad {outer{inner}} here").is_err());
        assert!(Template::parse("Bad {unclosed here").is_err());
        assert!(Template::parse("Bad } here").is_err());
        assert!(Template::parse("Who is {narrator}?").is_err());
    }

    #[test]
    fn render_binds_slots() {
        let t = Template::parse("{speaker} to {partner}: welcome to {series}, {location}.").unwrap();
        let line = t.render(&Bindings {
            speaker: "sheriff",
            partner: "bandit",
            location: "Old West Town",
            series: "Western Tales",
        });
        assert_eq!(line, "sheriff to bandit: welcome to Western Tales, Old West Town.");
    }

    #[test]
    fn candidates_follow_tags_and_boost() {
        let table = PhraseTable::parse_ron(SMALL_TABLE).unwrap();
        let plain = table.candidates(&tags(&["role:protagonist"]), false);
        assert_eq!(plain.len(), 2);

        let western = table.candidates(&tags(&["genre:western"]), false);
        let weights: Vec<u64> = western.iter().map(|c| c.weight).collect();
        assert_eq!(weights, vec![2, 1, 6, 2]);
        assert_eq!(western[3].alternative.kind, BeatKind::Action);

        let comic = table.candidates(&tags(&["genre:western", "tone:comic"]), false);
        assert_eq!(comic.len(), 2);
    }

    #[test]
    fn solo_skips_partner_lines() {
        let table = PhraseTable::parse_ron(SMALL_TABLE).unwrap();
        let solo = table.candidates(&tags(&[]), true);
        assert_eq!(solo.len(), 1);
        assert!(!solo[0].alternative.template.uses(Slot::Partner));
    }

    #[test]
    fn table_without_fallback_rejected() {
        let input = r#"PhraseTable(
            version: "broken",
            entries: [Entry(requires: ["genre:noir"], alternatives: [(weight: 1, text: "Rain.")])],
            locations: [Variant(weight: 1, text: "{location}")],
        )"#;
        assert!(matches!(
            PhraseTable::parse_ron(input),
            Err(PhraseError::Incomplete { .. })
        ));
    }

    #[test]
    fn location_variant_cannot_name_speaker() {
        let input = r#"PhraseTable(
            version: "broken",
            entries: [Entry(alternatives: [(weight: 1, text: "Rain.")])],
            locations: [Variant(weight: 1, text: "{speaker}'s house")],
        )"#;
        assert!(matches!(
            PhraseTable::parse_ron(input),
            Err(PhraseError::TemplateParse(_))
        ));
    }

    #[test]
    fn builtin_table_loads() {
        let table = PhraseTable::builtin().unwrap();
        assert!(!table.version.is_empty());
        assert!(table.entries.len() > 5);
        assert!(table.location_weights().iter().sum::<u64>() > 0);
        assert!(!table.candidates(&tags(&["role:protagonist", "genre:western"]), true).is_empty());
    }

    #[test]
    fn builtin_location_opens_sentences() {
        let table = PhraseTable::builtin().unwrap();
        for entry in &table.entries {
            // Opening scenes always use the primary location as written.
            if entry.requires.iter().any(|t| t == "scene:opening") {
                continue;
            }
            for alternative in &entry.alternatives {
                let segments = &alternative.template.segments;
                for (i, segment) in segments.iter().enumerate() {
                    if !matches!(segment, TemplateSegment::Slot(Slot::Location)) {
                        continue;
                    }
                    let opens = match i.checked_sub(1).map(|p| &segments[p]) {
                        None => true,
                        Some(TemplateSegment::Literal(text)) => text.ends_with(". "),
                        Some(TemplateSegment::Slot(_)) => false,
                    };
                    assert!(opens, "{:?}", segments);
                }
            }
        }
    }
}

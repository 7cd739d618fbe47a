/// Character role taxonomy.
///
/// Roles arrive as free text on a Prompt. The generator only needs to know
/// how prominent a role is and which phrase-table tag it selects, so the
/// well-known roles are recognized case-insensitively and everything else is
/// carried through as `Custom`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Role {
    Protagonist,
    Deuteragonist,
    Antagonist,
    Supporting,
    Custom(String),
}

impl Role {
    /// Parse a role from Prompt text. Never fails.
    pub fn parse(text: &str) -> Self {
        let normalized = tag_value(text);
        match normalized.as_str() {
            "protagonist" | "lead" | "hero" => Self::Protagonist,
            "deuteragonist" => Self::Deuteragonist,
            "antagonist" | "villain" => Self::Antagonist,
            "supporting" | "support" => Self::Supporting,
            _ => Self::Custom(normalized),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Protagonist => "protagonist",
            Self::Deuteragonist => "deuteragonist",
            Self::Antagonist => "antagonist",
            Self::Supporting => "supporting",
            Self::Custom(name) => name,
        }
    }

    /// Returns the phrase-table tag for this role (e.g., "role:antagonist").
    pub fn tag(&self) -> String {
        format!("role:{}", self.name())
    }

    /// Chance, in percent, that a character with this role appears in a scene.
    pub fn presence(&self) -> u64 {
        match self {
            Self::Protagonist => 95,
            Self::Deuteragonist => 85,
            Self::Antagonist => 75,
            Self::Supporting => 60,
            Self::Custom(_) => 50,
        }
    }
}

/// Normalize free text into a tag value: lowercase, whitespace runs joined by `_`.
pub fn tag_value(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_roles_case_insensitive() {
        assert_eq!(Role::parse("protagonist"), Role::Protagonist);
        assert_eq!(Role::parse("Protagonist"), Role::Protagonist);
        assert_eq!(Role::parse(" ANTAGONIST "), Role::Antagonist);
        assert_eq!(Role::parse("deuteragonist"), Role::Deuteragonist);
    }

    #[test]
    fn custom_role_is_normalized() {
        let role = Role::parse("Comic Relief");
        assert_eq!(role, Role::Custom("comic_relief".to_string()));
        assert_eq!(role.tag(), "role:comic_relief");
    }

    #[test]
    fn protagonist_is_most_present() {
        let roles = [
            Role::Deuteragonist,
            Role::Antagonist,
            Role::Supporting,
            Role::Custom("mentor".to_string()),
        ];
        for role in &roles {
            assert!(Role::Protagonist.presence() > role.presence());
        }
        assert!(Role::Protagonist.presence() <= 100);
    }

    #[test]
    fn tag_value_collapses_whitespace() {
        assert_eq!(tag_value("  Space   Western "), "space_western");
        assert_eq!(tag_value("Drama"), "drama");
    }
}

//! Persona documents: YAML frontmatter followed by markdown.

use std::path::Path;

use serde::Deserialize;

use crate::error::PersonaError;

/// Most roles one persona may declare.
pub const MAX_ROLES: usize = 5;
/// Most tags one persona may declare.
pub const MAX_TAGS: usize = 10;

const DELIMITER: &str = "---";

/// A reusable AI personality definition.
///
/// ```text
/// ---
/// name: strict-code-reviewer
/// roles: [code-reviewer, security-analyst]
/// description: Uncompromising code quality enforcer
/// tags: [strict, security]
/// ---
///
/// # Strict Code Reviewer
/// ...
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Persona {
    #[serde(default)]
    pub name: String,
    /// Roles this persona can fill
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Markdown body after the frontmatter
    #[serde(skip)]
    pub content: String,
}

impl Persona {
    /// Parse a persona document. `path` is only used for error context.
    pub fn parse(path: &Path, text: &str) -> Result<Self, PersonaError> {
        let invalid = |message: String| PersonaError::Invalid {
            path: path.to_path_buf(),
            message,
        };

        let (frontmatter, body) = split_frontmatter(text).map_err(|m| invalid(m.to_string()))?;
        if frontmatter.trim().is_empty() {
            return Err(invalid("frontmatter is empty".into()));
        }
        let mut persona: Persona = serde_yaml::from_str(&frontmatter)
            .map_err(|e| invalid(format!("bad YAML frontmatter: {e}")))?;
        persona.content = body;

        persona.check().map_err(invalid)?;
        Ok(persona)
    }

    fn check(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name is required".into());
        }
        if self.roles.is_empty() {
            return Err("at least one role is required".into());
        }
        if self.description.trim().is_empty() {
            return Err("description is required".into());
        }
        if self.roles.len() > MAX_ROLES {
            return Err(format!("more than {MAX_ROLES} roles"));
        }
        if self.tags.len() > MAX_TAGS {
            return Err(format!("more than {MAX_TAGS} tags"));
        }
        Ok(())
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Whether every tag in `tags` is present.
    pub fn has_tags(&self, tags: &[&str]) -> bool {
        tags.iter().all(|tag| self.tags.iter().any(|t| t == tag))
    }
}

/// Split `---` delimited frontmatter from the body. Blank lines right
/// after the closing delimiter are dropped.
fn split_frontmatter(text: &str) -> Result<(String, String), &'static str> {
    let lines: Vec<&str> = text.lines().collect();
    if lines.first().map(|l| l.trim_end()) != Some(DELIMITER) {
        return Err("missing YAML frontmatter (must start with ---)");
    }
    let end = lines[1..]
        .iter()
        .position(|l| l.trim_end() == DELIMITER)
        .map(|i| i + 1)
        .ok_or("unclosed YAML frontmatter (missing closing ---)")?;

    let frontmatter = lines[1..end].join("\n");
    let body = lines[end + 1..]
        .iter()
        .skip_while(|l| l.trim().is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("\n");
    Ok((frontmatter, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    const REVIEWER: &str = "---
name: strict-code-reviewer
roles: [code-reviewer, security-analyst]
description: Uncompromising code quality enforcer
tags: [strict, security, production]
---

# Strict Code Reviewer

Security issues are non-negotiable.
";

    fn parse(text: &str) -> Result<Persona, PersonaError> {
        Persona::parse(Path::new("personas/p.md"), text)
    }

    #[test]
    fn parses_frontmatter_and_body() {
        let persona = parse(REVIEWER).unwrap();

        assert_eq!(persona.name, "strict-code-reviewer");
        assert_eq!(persona.roles, vec!["code-reviewer", "security-analyst"]);
        assert_eq!(persona.description, "Uncompromising code quality enforcer");
        assert_eq!(
            persona.content,
            "# Strict Code Reviewer\n\nSecurity issues are non-negotiable."
        );
        assert!(persona.has_role("security-analyst"));
        assert!(persona.has_tags(&["strict", "security"]));
        assert!(!persona.has_tags(&["strict", "lenient"]));
    }

    #[test]
    fn tags_are_optional() {
        let persona = parse("---\nname: p\nroles: [a]\ndescription: d\n---\nBody\n").unwrap();
        assert!(persona.tags.is_empty());
        assert!(persona.has_tags(&[]));
    }

    #[rstest]
    #[case::no_frontmatter("# Just markdown\n", "must start with ---")]
    #[case::unclosed("---\nname: p\n", "unclosed")]
    #[case::empty("---\n---\nBody\n", "empty")]
    #[case::bad_yaml("---\nname: [p\n---\n", "bad YAML")]
    #[case::no_name("---\nroles: [a]\ndescription: d\n---\n", "name is required")]
    #[case::no_roles("---\nname: p\ndescription: d\n---\n", "at least one role")]
    #[case::no_description("---\nname: p\nroles: [a]\n---\n", "description is required")]
    #[case::too_many_roles(
        "---\nname: p\nroles: [a, b, c, d, e, f]\ndescription: d\n---\n",
        "more than 5 roles"
    )]
    fn invalid_documents(#[case] text: &str, #[case] expected: &str) {
        match parse(text) {
            Err(PersonaError::Invalid { message, .. }) => {
                assert!(message.contains(expected), "{message}");
            }
            other => panic!("expected invalid persona, got {other:?}"),
        }
    }
}

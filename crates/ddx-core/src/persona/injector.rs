//! Persona injection into a project document.
//!
//! All active personas share one `PERSONAS` managed region. Each entry
//! starts with a `<!-- Role: <role> -->` line so the region can be read
//! back and extended one role at a time.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use ddx_blocks::ManagedRegion;
use ddx_fs::{NormalizedPath, io};
use regex::Regex;

use super::model::Persona;
use crate::error::PersonaError;
use crate::Result;

pub const REGION_NAME: &str = "PERSONAS";
pub const PERSONAS_HEADER: &str = "## Active Personas";
pub const PERSONAS_FOOTER: &str =
    "When responding, adopt the appropriate persona based on the task.";
/// Most personas one document may hold.
pub const MAX_LOADED_PERSONAS: usize = 10;

static ROLE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^<!--\s*Role:\s*(\S+)\s*-->$").expect("role line pattern is valid")
});

static ENTRY_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^###\s+[^:]+:\s*(.+?)\s*$").expect("entry header pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    name: String,
    content: String,
}

impl From<&Persona> for Entry {
    fn from(persona: &Persona) -> Self {
        Self {
            name: persona.name.clone(),
            content: persona.content.trim().to_string(),
        }
    }
}

/// `code-reviewer` -> `Code Reviewer`
fn role_title(role: &str) -> String {
    role.split(['-', '_'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn check_role(role: &str) -> std::result::Result<(), PersonaError> {
    let valid = !role.is_empty()
        && role
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(PersonaError::Validation(format!(
            "invalid role '{role}': use letters, digits, '-', '_' or '.'"
        )))
    }
}

fn check_persona(role: &str, persona: &Persona) -> std::result::Result<(), PersonaError> {
    check_role(role)?;
    if persona.content.trim().is_empty() {
        return Err(PersonaError::Validation(format!(
            "persona '{}' for role '{role}' has no content",
            persona.name
        )));
    }
    Ok(())
}

fn render(entries: &BTreeMap<String, Entry>) -> String {
    let mut out = format!("{PERSONAS_HEADER}\n");
    for (role, entry) in entries {
        out.push_str(&format!(
            "\n<!-- Role: {role} -->\n### {}: {}\n{}\n",
            role_title(role),
            entry.name,
            entry.content
        ));
    }
    out.push('\n');
    out.push_str(PERSONAS_FOOTER);
    out
}

struct Pending<'a> {
    role: String,
    name: Option<String>,
    lines: Vec<&'a str>,
}

impl Pending<'_> {
    fn finish(mut self, entries: &mut BTreeMap<String, Entry>) {
        let Some(name) = self.name else {
            return;
        };
        while self
            .lines
            .last()
            .is_some_and(|l| l.trim().is_empty() || l.trim() == PERSONAS_FOOTER)
        {
            self.lines.pop();
        }
        entries.insert(
            self.role,
            Entry {
                name,
                content: self.lines.join("\n"),
            },
        );
    }
}

fn parse(body: &str) -> BTreeMap<String, Entry> {
    let mut entries = BTreeMap::new();
    let mut pending: Option<Pending<'_>> = None;

    for line in body.lines() {
        if let Some(caps) = ROLE_LINE.captures(line.trim()) {
            if let Some(done) = pending.take() {
                done.finish(&mut entries);
            }
            pending = Some(Pending {
                role: caps[1].to_string(),
                name: None,
                lines: Vec::new(),
            });
            continue;
        }
        let Some(current) = pending.as_mut() else {
            continue;
        };
        if current.name.is_none() {
            current.name = ENTRY_HEADER
                .captures(line.trim())
                .map(|caps| caps[1].to_string());
            if current.name.is_none() {
                // Entry without a header line is dropped.
                pending = None;
            }
            continue;
        }
        current.lines.push(line);
    }
    if let Some(done) = pending {
        done.finish(&mut entries);
    }
    entries
}

/// Keeps the personas region of a project document (by default
/// `CLAUDE.md`) in step with the roles a project wants filled.
pub struct PersonaInjector {
    document: NormalizedPath,
    region: ManagedRegion,
}

impl PersonaInjector {
    pub fn new(document: NormalizedPath) -> Result<Self> {
        Ok(Self {
            document,
            region: ManagedRegion::named(REGION_NAME)?,
        })
    }

    pub fn document(&self) -> &NormalizedPath {
        &self.document
    }

    fn read_entries(&self) -> Result<BTreeMap<String, Entry>> {
        let existing = io::read_text_optional(&self.document)?.unwrap_or_default();
        Ok(match self.region.find(&existing)? {
            Some(span) => parse(&span.body),
            None => BTreeMap::new(),
        })
    }

    fn write_entries(&self, entries: &BTreeMap<String, Entry>) -> Result<()> {
        if entries.len() > MAX_LOADED_PERSONAS {
            return Err(PersonaError::TooMany {
                count: entries.len(),
                limit: MAX_LOADED_PERSONAS,
            }
            .into());
        }
        let existing = io::read_text_optional(&self.document)?.unwrap_or_default();
        let updated = self.region.upsert(&existing, &render(entries))?;
        if updated != existing {
            io::write_atomic(&self.document, updated.as_bytes())?;
            tracing::info!(
                document = %self.document,
                personas = entries.len(),
                "Personas injected"
            );
        }
        Ok(())
    }

    /// Put `persona` in charge of `role`, keeping the other roles.
    pub fn inject(&self, role: &str, persona: &Persona) -> Result<()> {
        check_persona(role, persona)?;
        let mut entries = self.read_entries()?;
        entries.insert(role.to_string(), Entry::from(persona));
        self.write_entries(&entries)
    }

    /// Replace every loaded persona with `personas` (role to persona).
    /// An empty map removes the region.
    pub fn inject_all(&self, personas: &BTreeMap<String, Persona>) -> Result<()> {
        for (role, persona) in personas {
            check_persona(role, persona)?;
        }
        if personas.is_empty() {
            self.remove()?;
            return Ok(());
        }
        let entries = personas
            .iter()
            .map(|(role, persona)| (role.clone(), Entry::from(persona)))
            .collect();
        self.write_entries(&entries)
    }

    /// Drop one role. Returns whether it was loaded.
    pub fn eject(&self, role: &str) -> Result<bool> {
        let mut entries = self.read_entries()?;
        if entries.remove(role).is_none() {
            return Ok(false);
        }
        if entries.is_empty() {
            self.remove()?;
        } else {
            self.write_entries(&entries)?;
        }
        Ok(true)
    }

    /// Remove the region. Returns whether the document changed.
    pub fn remove(&self) -> Result<bool> {
        let Some(existing) = io::read_text_optional(&self.document)? else {
            return Ok(false);
        };
        let updated = self.region.remove(&existing)?;
        if updated == existing {
            return Ok(false);
        }
        io::write_atomic(&self.document, updated.as_bytes())?;
        Ok(true)
    }

    /// Loaded personas as role to persona name.
    pub fn loaded(&self) -> Result<BTreeMap<String, String>> {
        Ok(self
            .read_entries()?
            .into_iter()
            .map(|(role, entry)| (role, entry.name))
            .collect())
    }
}

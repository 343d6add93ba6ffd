//! Meta-prompt injection into a project document.
//!
//! A library prompt is copied into a managed region of a project file
//! (by default `CLAUDE.md`), preceded by a `<!-- Source: ... -->` line so
//! later runs know which prompt the region holds.

use std::sync::LazyLock;

use ddx_blocks::ManagedRegion;
use ddx_fs::{NormalizedPath, io};
use regex::Regex;

use crate::{Error, Result};

pub const DEFAULT_PROMPT_FILE: &str = "CLAUDE.md";
pub const REGION_NAME: &str = "META-PROMPT";
/// Prompts live under this directory of the vendored library.
pub const PROMPTS_DIR: &str = "prompts";

static SOURCE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^<!--\s*Source:\s*(.+?)\s*-->$").expect("source header pattern is valid")
});

/// Keeps a project document's meta-prompt region in step with a library
/// prompt.
pub struct PromptInjector {
    library: NormalizedPath,
    document: NormalizedPath,
    region: ManagedRegion,
}

impl PromptInjector {
    /// # Arguments
    ///
    /// * `library` - Vendored library directory
    /// * `document` - Project file holding the region
    pub fn new(library: NormalizedPath, document: NormalizedPath) -> Result<Self> {
        Ok(Self {
            library,
            document,
            region: ManagedRegion::named(REGION_NAME)?,
        })
    }

    pub fn document(&self) -> &NormalizedPath {
        &self.document
    }

    fn prompt_path(&self, prompt: &str) -> Result<NormalizedPath> {
        let relative = NormalizedPath::new(prompt).ensure_relative()?;
        Ok(self.library.join(PROMPTS_DIR).join(relative.as_str()))
    }

    fn read_prompt(&self, prompt: &str) -> Result<String> {
        io::read_text_optional(&self.prompt_path(prompt)?)?.ok_or_else(|| Error::PromptNotFound {
            path: prompt.to_string(),
        })
    }

    fn body(prompt: &str, content: &str) -> String {
        format!("<!-- Source: {prompt} -->\n{}", content.trim_end())
    }

    /// Insert or replace the region with library prompt `prompt`
    /// (relative to `prompts/`). Idempotent.
    pub fn inject(&self, prompt: &str) -> Result<()> {
        let content = self.read_prompt(prompt)?;
        let existing = io::read_text_optional(&self.document)?.unwrap_or_default();
        let updated = self.region.upsert(&existing, &Self::body(prompt, &content))?;
        if updated != existing {
            io::write_atomic(&self.document, updated.as_bytes())?;
            tracing::info!(prompt, document = %self.document, "Meta-prompt injected");
        }
        Ok(())
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

    /// The prompt named by the region's source header, if any.
    pub fn current_source(&self) -> Result<Option<String>> {
        let Some(existing) = io::read_text_optional(&self.document)? else {
            return Ok(None);
        };
        let Some(span) = self.region.find(&existing)? else {
            return Ok(None);
        };
        Ok(span
            .body
            .lines()
            .next()
            .and_then(|line| SOURCE_LINE.captures(line.trim()))
            .map(|caps| caps[1].to_string()))
    }

    /// Whether the region matches its library prompt, ignoring
    /// whitespace differences.
    ///
    /// # Errors
    ///
    /// [`Error::PromptNotInjected`] when the document has no region.
    pub fn is_in_sync(&self) -> Result<bool> {
        let existing = io::read_text_optional(&self.document)?.unwrap_or_default();
        let (Some(span), Some(source)) = (self.region.find(&existing)?, self.current_source()?)
        else {
            return Err(Error::PromptNotInjected {
                path: self.document.to_native(),
            });
        };
        let injected: String = span.body.lines().skip(1).collect::<Vec<_>>().join("\n");
        let library = self.read_prompt(&source)?;
        Ok(squash_whitespace(&injected) == squash_whitespace(&library))
    }
}

fn squash_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn setup() -> (TempDir, PromptInjector) {
        let dir = TempDir::new().unwrap();
        let library = NormalizedPath::new(dir.path().join("library"));
        std::fs::create_dir_all(library.join("prompts/claude").to_native()).unwrap();
        std::fs::write(
            library.join("prompts/claude/focused.md").to_native(),
            "# Focus\n\nStay on task.\n",
        )
        .unwrap();
        let document = NormalizedPath::new(dir.path().join("CLAUDE.md"));
        let injector = PromptInjector::new(library, document).unwrap();
        (dir, injector)
    }

    #[test]
    fn inject_appends_region_with_source_header() {
        let (dir, injector) = setup();
        std::fs::write(dir.path().join("CLAUDE.md"), "# Project notes\n").unwrap();

        injector.inject("claude/focused.md").unwrap();

        let text = std::fs::read_to_string(dir.path().join("CLAUDE.md")).unwrap();
        assert_eq!(
            text,
            "# Project notes\n\n<!-- DDX-META-PROMPT:START -->\n<!-- Source: claude/focused.md -->\n# Focus\n\nStay on task.\n<!-- DDX-META-PROMPT:END -->\n"
        );
        assert_eq!(
            injector.current_source().unwrap().as_deref(),
            Some("claude/focused.md")
        );
        assert!(injector.is_in_sync().unwrap());
    }

    #[test]
    fn drift_and_removal() {
        let (dir, injector) = setup();
        injector.inject("claude/focused.md").unwrap();
        std::fs::write(
            dir.path().join("library/prompts/claude/focused.md"),
            "# Focus\n\nStay on task. Be brief.\n",
        )
        .unwrap();

        assert!(!injector.is_in_sync().unwrap());
        assert!(injector.remove().unwrap());
        assert!(!injector.remove().unwrap());
        assert!(matches!(
            injector.is_in_sync(),
            Err(Error::PromptNotInjected { .. })
        ));
    }

    #[test]
    fn missing_prompt() {
        let (_dir, injector) = setup();
        assert!(matches!(
            injector.inject("nope.md"),
            Err(Error::PromptNotFound { .. })
        ));
    }
}

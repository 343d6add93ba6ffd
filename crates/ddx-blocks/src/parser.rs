//! Locating managed regions.
//!
//! Sentinels are matched as whole lines: leading and trailing spaces are
//! tolerated, any other text on the line means the line is ordinary content.

use std::ops::Range;

use regex::Regex;

use crate::error::{Error, Result};

/// A start/end sentinel pair identifying one managed region.
#[derive(Debug, Clone)]
pub struct ManagedRegion {
    start: String,
    end: String,
    start_re: Regex,
    end_re: Regex,
}

/// A located region within a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionSpan {
    /// Text between the sentinel lines, without the final line break.
    pub body: String,
    /// The 1-based line number of the start sentinel.
    pub start_line: usize,
    /// The 1-based line number of the end sentinel.
    pub end_line: usize,
    /// Byte range covering both sentinel lines and their line breaks.
    pub range: Range<usize>,
}

fn line_pattern(marker: &str) -> Result<Regex> {
    Ok(Regex::new(&format!(
        r"(?m)^[ \t]*{}[ \t]*\r?$",
        regex::escape(marker)
    ))?)
}

/// Index just past the line break that ends the line containing `pos`.
pub(crate) fn line_end(content: &str, pos: usize) -> usize {
    match content[pos..].find('\n') {
        Some(offset) => pos + offset + 1,
        None => content.len(),
    }
}

fn line_number(content: &str, pos: usize) -> usize {
    content[..pos].matches('\n').count() + 1
}

impl ManagedRegion {
    /// Region with the conventional DDx sentinels for `name`,
    /// e.g. `<!-- DDX-META-PROMPT:START -->`.
    pub fn named(name: &str) -> Result<Self> {
        let name = name.to_ascii_uppercase();
        Self::with_markers(
            format!("<!-- DDX-{name}:START -->"),
            format!("<!-- DDX-{name}:END -->"),
        )
    }

    /// Region with arbitrary sentinel lines.
    pub fn with_markers(start: impl Into<String>, end: impl Into<String>) -> Result<Self> {
        let start = start.into().trim().to_string();
        let end = end.into().trim().to_string();
        if start.is_empty() || end.is_empty() || start == end {
            return Err(Error::InvalidMarkers);
        }
        Ok(Self {
            start_re: line_pattern(&start)?,
            end_re: line_pattern(&end)?,
            start,
            end,
        })
    }

    pub fn start_marker(&self) -> &str {
        &self.start
    }

    pub fn end_marker(&self) -> &str {
        &self.end
    }

    /// Locate the first region in `content`.
    ///
    /// Returns `Ok(None)` when no start sentinel is present and
    /// [`Error::Unterminated`] when a start sentinel has no matching end.
    pub fn find(&self, content: &str) -> Result<Option<RegionSpan>> {
        let Some(open) = self.start_re.find(content) else {
            return Ok(None);
        };

        let body_start = line_end(content, open.end());
        let Some(close) = self.end_re.find_at(content, body_start) else {
            return Err(Error::Unterminated {
                start: self.start.clone(),
                line: line_number(content, open.start()),
            });
        };

        let raw = &content[body_start.min(close.start())..close.start()];
        let body = raw
            .strip_suffix('\n')
            .map(|b| b.strip_suffix('\r').unwrap_or(b))
            .unwrap_or(raw);

        Ok(Some(RegionSpan {
            body: body.to_string(),
            start_line: line_number(content, open.start()),
            end_line: line_number(content, close.start()),
            range: open.start()..line_end(content, close.end()),
        }))
    }

    /// Whether `content` holds a well-formed region.
    pub fn contains(&self, content: &str) -> bool {
        matches!(self.find(content), Ok(Some(_)))
    }
}

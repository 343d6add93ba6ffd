//! Replacing and removing managed regions.

use crate::error::Result;
use crate::parser::ManagedRegion;

impl ManagedRegion {
    /// Render the region with `body` between its sentinels.
    pub fn render(&self, body: &str) -> String {
        let body = body.trim_end_matches(['\n', '\r']);
        if body.is_empty() {
            format!("{}\n{}", self.start_marker(), self.end_marker())
        } else {
            format!("{}\n{}\n{}", self.start_marker(), body, self.end_marker())
        }
    }

    /// Replace the region's body, or append the region when absent.
    ///
    /// An appended region is separated from existing text by one blank line.
    /// Text outside the region is preserved byte for byte.
    ///
    /// # Example
    /// ```
    /// use ddx_blocks::ManagedRegion;
    ///
    /// let region = ManagedRegion::named("meta-prompt").unwrap();
    /// let once = region.upsert("# Project\n", "be concise").unwrap();
    /// let twice = region.upsert(&once, "be concise").unwrap();
    /// assert_eq!(once, twice);
    /// assert!(once.starts_with("# Project\n\n<!-- DDX-META-PROMPT:START -->"));
    /// ```
    pub fn upsert(&self, content: &str, body: &str) -> Result<String> {
        let block = self.render(body);

        match self.find(content)? {
            Some(span) => {
                let mut out = String::with_capacity(content.len() + block.len());
                out.push_str(&content[..span.range.start]);
                out.push_str(&block);
                out.push('\n');
                out.push_str(&content[span.range.end..]);
                Ok(out)
            }
            None => {
                let existing = content.trim_end_matches('\n');
                if existing.is_empty() {
                    Ok(format!("{block}\n"))
                } else {
                    Ok(format!("{existing}\n\n{block}\n"))
                }
            }
        }
    }

    /// Remove the region and its sentinels. Content without the region is
    /// returned unchanged.
    pub fn remove(&self, content: &str) -> Result<String> {
        let Some(span) = self.find(content)? else {
            return Ok(content.to_string());
        };

        let before = content[..span.range.start].trim_end_matches('\n');
        let after = content[span.range.end..].trim_start_matches('\n');

        let result = match (before.is_empty(), after.is_empty()) {
            (true, true) => String::new(),
            (true, false) => after.to_string(),
            (false, true) => format!("{before}\n"),
            (false, false) => format!("{before}\n\n{after}"),
        };
        tracing::trace!(start = span.start_line, end = span.end_line, "Removed managed region");
        Ok(result)
    }
}

//! Line-based merge with conflict markers

use similar::{DiffTag, TextDiff};

/// Opening marker for the side already on disk
pub const EXISTING_MARKER: &str = "<<<<<<< existing";
/// Separator between the two sides of a conflict
pub const SEPARATOR_MARKER: &str = "=======";
/// Closing marker for the incoming side
pub const INCOMING_MARKER: &str = ">>>>>>> incoming";

/// Result of merging two texts line by line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMerge {
    /// Merged text; differing hunks are wrapped in conflict markers
    pub content: String,
    /// Number of conflict hunks written
    pub conflicts: usize,
}

impl TextMerge {
    pub fn is_clean(&self) -> bool {
        self.conflicts == 0
    }
}

fn push_line_block(out: &mut String, lines: &[&str]) {
    for line in lines {
        out.push_str(line);
    }
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

fn flush_hunk(out: &mut String, old: &mut Vec<&str>, new: &mut Vec<&str>, conflicts: &mut usize) {
    if old.is_empty() && new.is_empty() {
        return;
    }
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(EXISTING_MARKER);
    out.push('\n');
    push_line_block(out, old);
    out.push_str(SEPARATOR_MARKER);
    out.push('\n');
    push_line_block(out, new);
    out.push_str(INCOMING_MARKER);
    out.push('\n');
    old.clear();
    new.clear();
    *conflicts += 1;
}

/// Merge `incoming` into `existing`.
///
/// Lines common to both sides are emitted once. Every run of differing
/// lines becomes a conflict hunk holding the existing lines above the
/// separator and the incoming lines below it.
pub fn merge_text(existing: &str, incoming: &str) -> TextMerge {
    if existing == incoming {
        return TextMerge {
            content: existing.to_string(),
            conflicts: 0,
        };
    }

    let diff = TextDiff::from_lines(existing, incoming);
    let old_lines = diff.old_slices();
    let new_lines = diff.new_slices();

    let mut out = String::with_capacity(existing.len() + incoming.len() + 64);
    let mut pending_old: Vec<&str> = Vec::new();
    let mut pending_new: Vec<&str> = Vec::new();
    let mut conflicts = 0;

    for op in diff.ops() {
        let (tag, old_range, new_range) = op.as_tag_tuple();
        match tag {
            DiffTag::Equal => {
                flush_hunk(&mut out, &mut pending_old, &mut pending_new, &mut conflicts);
                for line in &old_lines[old_range] {
                    out.push_str(line);
                }
            }
            DiffTag::Delete | DiffTag::Insert | DiffTag::Replace => {
                pending_old.extend_from_slice(&old_lines[old_range]);
                pending_new.extend_from_slice(&new_lines[new_range]);
            }
        }
    }
    flush_hunk(&mut out, &mut pending_old, &mut pending_new, &mut conflicts);

    TextMerge {
        content: out,
        conflicts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn identical_inputs_merge_cleanly() {
        let merged = merge_text("a\nb\n", "a\nb\n");
        assert!(merged.is_clean());
        assert_eq!(merged.content, "a\nb\n");
    }

    #[test]
    fn differing_line_becomes_one_hunk() {
        let merged = merge_text("a\nY\nc\n", "a\nX\nc\n");
        assert_eq!(merged.conflicts, 1);
        assert_eq!(
            merged.content,
            "a\n<<<<<<< existing\nY\n=======\nX\n>>>>>>> incoming\nc\n"
        );
    }

    #[test]
    fn missing_trailing_newline_keeps_markers_on_own_line() {
        let merged = merge_text("Y", "X");
        assert_eq!(
            merged.content,
            "<<<<<<< existing\nY\n=======\nX\n>>>>>>> incoming\n"
        );
    }
}

//! Loading a source asset tree from disk.

use std::fs;

use ddx_fs::NormalizedPath;
use ddx_fs::constants::SYNC_MARKER;
use glob::{MatchOptions, Pattern};
use walkdir::WalkDir;

use crate::config::ResourceRule;
use crate::error::ApplyError;
use crate::substitute::has_placeholders;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// File content of an asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetContent {
    /// UTF-8 text, rendered through the substitution engine
    Text(String),
    /// Anything else, copied byte for byte
    Binary(Vec<u8>),
}

/// One file in a source tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetNode {
    /// Path relative to the tree root; may itself contain placeholders
    pub path: NormalizedPath,
    pub content: AssetContent,
}

impl AssetNode {
    pub fn text(path: impl Into<NormalizedPath>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: AssetContent::Text(content.into()),
        }
    }

    /// Whether rendering can change this node's path or content.
    pub fn is_template(&self) -> bool {
        has_placeholders(self.path.as_str())
            || matches!(&self.content, AssetContent::Text(text) if has_placeholders(text))
    }
}

/// Compiled form of a [`ResourceRule`].
///
/// A pattern selects a path when it matches the path itself or any of its
/// parent directories, so `readme` selects everything under `readme/`.
#[derive(Debug, Clone, Default)]
pub struct ResourceMatcher {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl ResourceMatcher {
    pub fn new(rule: &ResourceRule) -> Result<Self, ApplyError> {
        let compile = |patterns: &[String]| -> Result<Vec<Pattern>, ApplyError> {
            patterns
                .iter()
                .map(|p| {
                    Pattern::new(p).map_err(|e| ApplyError::InvalidPattern {
                        pattern: p.clone(),
                        message: e.msg.to_string(),
                    })
                })
                .collect()
        };
        Ok(Self {
            include: compile(&rule.include)?,
            exclude: compile(&rule.exclude)?,
        })
    }

    fn any_matches(patterns: &[Pattern], path: &str) -> bool {
        let mut candidate = path;
        loop {
            if patterns
                .iter()
                .any(|p| p.matches_with(candidate, MATCH_OPTIONS))
            {
                return true;
            }
            match candidate.rfind('/') {
                Some(idx) => candidate = &candidate[..idx],
                None => return false,
            }
        }
    }

    /// Whether the relative path `path` is selected.
    pub fn matches(&self, path: &str) -> bool {
        let included = self.include.is_empty() || Self::any_matches(&self.include, path);
        included && !Self::any_matches(&self.exclude, path)
    }
}

/// A source asset tree in stable, byte-wise path order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetTree {
    nodes: Vec<AssetNode>,
}

impl AssetTree {
    /// Build a tree from in-memory nodes. Nodes are sorted by path.
    pub fn from_nodes(mut nodes: Vec<AssetNode>) -> Self {
        nodes.sort_by(|a, b| a.path.cmp(&b.path));
        Self { nodes }
    }

    /// Walk `root` and collect every file selected by `rule`.
    ///
    /// VCS metadata and the library sync marker are never assets.
    pub fn load(root: &NormalizedPath, rule: Option<&ResourceRule>) -> Result<Self, ApplyError> {
        let native_root = root.to_native();
        if !native_root.is_dir() {
            return Err(ApplyError::SourceNotFound { path: native_root });
        }
        let matcher = match rule {
            Some(rule) => ResourceMatcher::new(rule)?,
            None => ResourceMatcher::default(),
        };

        let mut nodes = Vec::new();
        let walker = WalkDir::new(&native_root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| entry.file_name() != ".git");

        for entry in walker {
            let entry = entry.map_err(|e| ApplyError::Aborted {
                reason: format!("failed to read asset tree: {e}"),
                nodes_completed: 0,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&native_root) else {
                continue;
            };
            let relative = NormalizedPath::new(relative);
            if relative.file_name() == Some(SYNC_MARKER) || !matcher.matches(relative.as_str()) {
                continue;
            }

            let bytes = fs::read(entry.path()).map_err(|e| {
                if e.kind() == std::io::ErrorKind::PermissionDenied {
                    ApplyError::PermissionDenied {
                        path: entry.path().to_path_buf(),
                    }
                } else {
                    ApplyError::Aborted {
                        reason: format!("failed to read {}: {e}", entry.path().display()),
                        nodes_completed: 0,
                    }
                }
            })?;
            let content = match String::from_utf8(bytes) {
                Ok(text) => AssetContent::Text(text),
                Err(e) => AssetContent::Binary(e.into_bytes()),
            };
            nodes.push(AssetNode {
                path: relative,
                content,
            });
        }

        tracing::debug!(root = %root, nodes = nodes.len(), "Asset tree loaded");
        Ok(Self::from_nodes(nodes))
    }

    pub fn nodes(&self) -> &[AssetNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn rule(include: &[&str], exclude: &[&str]) -> ResourceRule {
        ResourceRule {
            include: include.iter().map(|s| s.to_string()).collect(),
            exclude: exclude.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[rstest]
    #[case(&[], &[], "a/b.md", true)]
    #[case(&["*"], &[], "a/b/c.md", true)]
    #[case(&["docs"], &[], "docs/guide.md", true)]
    #[case(&["docs"], &[], "src/main.rs", false)]
    #[case(&["**/*.md"], &[], "a/b/c.md", true)]
    #[case(&["*.md"], &[], "a/c.md", false)]
    #[case(&["*"], &["drafts/**"], "drafts/wip.md", false)]
    #[case(&["*"], &["drafts"], "drafts/deep/wip.md", false)]
    fn matcher_cases(
        #[case] include: &[&str],
        #[case] exclude: &[&str],
        #[case] path: &str,
        #[case] expected: bool,
    ) {
        let matcher = ResourceMatcher::new(&rule(include, exclude)).unwrap();
        assert_eq!(matcher.matches(path), expected, "{path}");
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let err = ResourceMatcher::new(&rule(&["[unclosed"], &[])).unwrap_err();
        assert!(matches!(err, ApplyError::InvalidPattern { .. }));
    }

    #[test]
    fn template_detection() {
        assert!(AssetNode::text("{{name}}.md", "static").is_template());
        assert!(AssetNode::text("a.md", "Hi {{ who }}").is_template());
        assert!(!AssetNode::text("a.md", "plain").is_template());
    }
}

//! Process environment captured once per invocation.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::layer::{ConfigLayer, RepositorySection};

/// Selects the environment-override layer.
pub const ENV_ENVIRONMENT: &str = "DDX_ENV";
/// Selects the active profile, taking precedence over the ACTIVE marker.
pub const ENV_PROFILE: &str = "DDX_PROFILE";
pub const ENV_REPOSITORY_URL: &str = "DDX_REPOSITORY_URL";
pub const ENV_REPOSITORY_BRANCH: &str = "DDX_REPOSITORY_BRANCH";
pub const ENV_LIBRARY_PATH: &str = "DDX_LIBRARY_PATH";
pub const ENV_DISABLE_UPDATE_CHECK: &str = "DDX_DISABLE_UPDATE_CHECK";
/// Prefix for variable binding overrides; the suffix is lower-cased.
pub const ENV_VAR_PREFIX: &str = "DDX_VAR_";

static ENV_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
        .expect("environment reference pattern is valid")
});

/// An immutable copy of the environment variables DDx reads.
///
/// Resolution never calls `std::env` directly, so a resolve is a pure
/// function of files on disk and this snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    vars: BTreeMap<String, String>,
}

impl EnvSnapshot {
    /// Capture the current process environment.
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Build a snapshot from explicit pairs.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Return a copy with `key` set.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).map(str::trim).filter(|v| !v.is_empty())
    }

    /// Environment name from `DDX_ENV`.
    pub fn environment(&self) -> Option<&str> {
        self.non_empty(ENV_ENVIRONMENT)
    }

    /// Profile name from `DDX_PROFILE`.
    pub fn profile(&self) -> Option<&str> {
        self.non_empty(ENV_PROFILE)
    }

    /// Whether `DDX_DISABLE_UPDATE_CHECK` is set to a truthy value.
    pub fn update_check_disabled(&self) -> bool {
        self.non_empty(ENV_DISABLE_UPDATE_CHECK)
            .is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
    }

    /// The highest-precedence layer built from recognized override keys.
    pub fn overrides_layer(&self) -> ConfigLayer {
        let mut layer = ConfigLayer {
            repository: RepositorySection {
                url: self.non_empty(ENV_REPOSITORY_URL).map(str::to_string),
                branch: self.non_empty(ENV_REPOSITORY_BRANCH).map(str::to_string),
                path: self.non_empty(ENV_LIBRARY_PATH).map(str::to_string),
            },
            ..ConfigLayer::default()
        };
        if self.update_check_disabled() {
            layer.update_check.enabled = Some(false);
        }
        for (key, value) in &self.vars {
            if let Some(name) = key.strip_prefix(ENV_VAR_PREFIX)
                && !name.is_empty()
            {
                layer
                    .variables
                    .insert(name.to_ascii_lowercase(), value.clone());
            }
        }
        layer
    }

    /// Expand `${VAR}` and `${VAR:-default}` once.
    ///
    /// The default applies when the variable is unset or empty. Unset
    /// variables without a default expand to the empty string. The
    /// expanded text is not scanned again.
    pub fn expand(&self, value: &str) -> String {
        ENV_REFERENCE
            .replace_all(value, |caps: &Captures<'_>| {
                let current = self.get(&caps[1]).filter(|v| !v.is_empty());
                match (current, caps.get(2)) {
                    (Some(v), _) => v.to_string(),
                    (None, Some(default)) => default.as_str().to_string(),
                    (None, None) => String::new(),
                }
            })
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn expand_handles_defaults_and_missing() {
        let env = EnvSnapshot::from_pairs([("HOST", "example.com"), ("EMPTY", "")]);
        assert_eq!(env.expand("https://${HOST}/api"), "https://example.com/api");
        assert_eq!(env.expand("${EMPTY:-fallback}"), "fallback");
        assert_eq!(env.expand("${MISSING:-8080}"), "8080");
        assert_eq!(env.expand("[${MISSING}]"), "[]");
        assert_eq!(env.expand("no references"), "no references");
    }

    #[test]
    fn expand_is_single_pass() {
        let env = EnvSnapshot::from_pairs([("A", "${B}"), ("B", "boom")]);
        assert_eq!(env.expand("${A}"), "${B}");
    }

    #[test]
    fn overrides_layer_collects_recognized_keys() {
        let env = EnvSnapshot::from_pairs([
            ("DDX_REPOSITORY_URL", "https://example.com/lib.git"),
            ("DDX_REPOSITORY_BRANCH", " "),
            ("DDX_VAR_PORT", "9000"),
            ("DDX_VAR_Api_Url", "http://api"),
            ("DDX_DISABLE_UPDATE_CHECK", "true"),
            ("UNRELATED", "x"),
        ]);

        let layer = env.overrides_layer();

        assert_eq!(
            layer.repository.url.as_deref(),
            Some("https://example.com/lib.git")
        );
        assert_eq!(layer.repository.branch, None);
        assert_eq!(layer.variables["port"], "9000");
        assert_eq!(layer.variables["api_url"], "http://api");
        assert_eq!(layer.update_check.enabled, Some(false));
        assert_eq!(layer.variables.len(), 2);
    }

    #[test]
    fn update_check_flag_values() {
        for (value, disabled) in [("1", true), ("TRUE", true), ("0", false), ("", false)] {
            let env = EnvSnapshot::from_pairs([(ENV_DISABLE_UPDATE_CHECK, value)]);
            assert_eq!(env.update_check_disabled(), disabled, "value {value:?}");
        }
    }
}

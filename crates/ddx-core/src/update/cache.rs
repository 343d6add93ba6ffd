//! Persistent record of the last update check.

use chrono::{DateTime, Utc};
use ddx_fs::{NormalizedPath, io};
use serde::{Deserialize, Serialize};

use crate::config::EnvSnapshot;

pub const CACHE_FILE: &str = "last-update-check.json";

/// What the last update check found.
///
/// Serialized as JSON between invocations. Absent fields default, so an
/// older or partial file still loads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCache {
    /// When the last check ran, successful or not
    #[serde(default)]
    pub last_check: Option<DateTime<Utc>>,
    /// Version that was running at the last check
    #[serde(default)]
    pub current_version: Option<String>,
    #[serde(default)]
    pub latest_version: Option<String>,
    #[serde(default)]
    pub update_available: bool,
    /// Failure of the last check, cleared by the next success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl UpdateCache {
    /// `$XDG_CACHE_HOME/ddx/last-update-check.json`, falling back to the
    /// platform cache directory.
    pub fn default_path(env: &EnvSnapshot) -> Option<NormalizedPath> {
        let base = env
            .get("XDG_CACHE_HOME")
            .filter(|v| !v.is_empty())
            .map(std::path::PathBuf::from)
            .or_else(dirs::cache_dir)?;
        Some(NormalizedPath::new(base.join("ddx").join(CACHE_FILE)))
    }

    /// Load the cache. A missing or unreadable file is an empty cache.
    pub fn load(path: &NormalizedPath) -> Self {
        match io::read_text_optional(path) {
            Ok(Some(text)) => serde_json::from_str(&text).unwrap_or_else(|e| {
                tracing::warn!(path = %path, error = %e, "Ignoring corrupt update cache");
                Self::default()
            }),
            Ok(None) => Self::default(),
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Could not read update cache");
                Self::default()
            }
        }
    }

    /// Write the cache atomically.
    ///
    /// The file is read again just before writing. If another process
    /// recorded a more recent check in the meantime, that record is kept
    /// and `Ok(false)` is returned.
    pub fn save(&self, path: &NormalizedPath) -> Result<bool, ddx_fs::Error> {
        let on_disk = Self::load(path);
        if let (Some(theirs), Some(ours)) = (on_disk.last_check, self.last_check)
            && theirs > ours
        {
            tracing::debug!(path = %path, "Update cache has a newer record, not overwriting");
            return Ok(false);
        }

        let json = serde_json::to_string_pretty(self).map_err(|e| {
            ddx_fs::Error::io(path.to_native(), std::io::Error::other(e))
        })?;
        io::write_atomic(path, json.as_bytes())?;
        Ok(true)
    }

    /// Whether the cached check is older than `frequency_hours` at `now`.
    ///
    /// A frequency too large to represent as a duration never expires.
    pub fn is_expired(&self, now: DateTime<Utc>, frequency_hours: u64) -> bool {
        let Some(last) = self.last_check else {
            return true;
        };
        let window = i64::try_from(frequency_hours)
            .ok()
            .and_then(chrono::Duration::try_hours);
        match window {
            Some(window) => now.signed_duration_since(last) >= window,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_and_corrupt_files_load_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = NormalizedPath::new(dir.path().join("cache.json"));
        assert_eq!(UpdateCache::load(&path), UpdateCache::default());

        std::fs::write(path.to_native(), "{not json").unwrap();
        assert_eq!(UpdateCache::load(&path), UpdateCache::default());
    }

    #[test]
    fn save_keeps_newer_record_from_another_process() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = NormalizedPath::new(dir.path().join("ddx").join(CACHE_FILE));
        let older = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let newer = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();

        let theirs = UpdateCache {
            last_check: Some(newer),
            latest_version: Some("2.0.0".into()),
            ..UpdateCache::default()
        };
        assert!(theirs.save(&path).unwrap());

        let ours = UpdateCache {
            last_check: Some(older),
            latest_version: Some("1.0.0".into()),
            ..UpdateCache::default()
        };
        assert!(!ours.save(&path).unwrap());
        assert_eq!(UpdateCache::load(&path), theirs);
    }

    #[test]
    fn expiry_follows_frequency() {
        let checked = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let cache = UpdateCache {
            last_check: Some(checked),
            ..UpdateCache::default()
        };
        assert!(!cache.is_expired(checked + chrono::Duration::hours(23), 24));
        assert!(cache.is_expired(checked + chrono::Duration::hours(24), 24));
        assert!(UpdateCache::default().is_expired(checked, 24));
    }

    #[test]
    fn unrepresentable_frequency_never_expires() {
        let checked = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let cache = UpdateCache {
            last_check: Some(checked),
            ..UpdateCache::default()
        };
        let later = checked + chrono::Duration::days(365 * 100);
        assert!(!cache.is_expired(later, i64::MAX as u64));
        assert!(!cache.is_expired(later, u64::MAX));
        // Still due when nothing was ever checked.
        assert!(UpdateCache::default().is_expired(checked, u64::MAX));
    }

    #[test]
    fn default_path_prefers_xdg_cache_home() {
        let env = EnvSnapshot::from_pairs([("XDG_CACHE_HOME", "/tmp/cache")]);
        assert_eq!(
            UpdateCache::default_path(&env).unwrap().as_str(),
            "/tmp/cache/ddx/last-update-check.json"
        );
    }
}

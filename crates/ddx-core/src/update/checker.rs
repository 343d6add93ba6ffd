//! Cache-throttled check for a newer DDx release.

use chrono::{DateTime, Utc};
use ddx_fs::NormalizedPath;

use super::cache::UpdateCache;
use super::release::{ReleaseSource, is_newer};
use crate::config::UpdateCheckPolicy;
use crate::error::UpdateCheckError;

/// Outcome of [`UpdateChecker::check_for_update`]. Failures are data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCheckResult {
    pub current_version: String,
    pub latest_version: Option<String>,
    pub update_available: bool,
    /// The answer came from the cache rather than the release source
    pub cached: bool,
    pub error: Option<UpdateCheckError>,
}

/// Decides when to ask a [`ReleaseSource`] for the latest version and
/// records the answer in an [`UpdateCache`].
///
/// The cache is loaded at construction and saved after every check.
pub struct UpdateChecker<S> {
    current_version: String,
    policy: UpdateCheckPolicy,
    disabled: bool,
    cache_path: Option<NormalizedPath>,
    cache: UpdateCache,
    source: S,
}

impl<S: ReleaseSource> UpdateChecker<S> {
    /// # Arguments
    ///
    /// * `current_version` - Version of the running binary
    /// * `policy` - Resolved `[update_check]` settings
    /// * `cache_path` - Cache file; `None` keeps the cache in memory only
    /// * `source` - Where the latest version comes from
    pub fn new(
        current_version: impl Into<String>,
        policy: UpdateCheckPolicy,
        cache_path: Option<NormalizedPath>,
        source: S,
    ) -> Self {
        let cache = cache_path
            .as_ref()
            .map(UpdateCache::load)
            .unwrap_or_default();
        Self {
            current_version: current_version.into(),
            policy,
            disabled: false,
            cache_path,
            cache,
            source,
        }
    }

    /// Disable checks regardless of policy (the `DDX_DISABLE_UPDATE_CHECK`
    /// override).
    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn cache(&self) -> &UpdateCache {
        &self.cache
    }

    fn is_disabled(&self) -> bool {
        self.disabled || !self.policy.enabled
    }

    pub fn should_check(&self) -> bool {
        self.should_check_at(Utc::now())
    }

    /// Whether a check is due at `now`: checks are enabled and the cache
    /// is missing, older than the policy frequency, or was recorded by a
    /// different running version.
    pub fn should_check_at(&self, now: DateTime<Utc>) -> bool {
        if self.is_disabled() {
            return false;
        }
        if self.cache.is_expired(now, self.policy.frequency_hours) {
            return true;
        }
        self.cache
            .current_version
            .as_deref()
            .is_some_and(|v| v != self.current_version)
    }

    pub fn check_for_update(&mut self) -> UpdateCheckResult {
        self.check_at(Utc::now())
    }

    /// Query the release source if a check is due at `now`, otherwise
    /// answer from the cache. Never fails; errors are returned in the
    /// result and recorded in the cache together with the check time.
    pub fn check_at(&mut self, now: DateTime<Utc>) -> UpdateCheckResult {
        if self.is_disabled() {
            return UpdateCheckResult {
                current_version: self.current_version.clone(),
                latest_version: None,
                update_available: false,
                cached: true,
                error: None,
            };
        }
        if !self.should_check_at(now) {
            return UpdateCheckResult {
                current_version: self.current_version.clone(),
                latest_version: self.cache.latest_version.clone(),
                update_available: self.cache.update_available,
                cached: true,
                error: None,
            };
        }

        let outcome = self
            .source
            .latest_version()
            .and_then(|latest| is_newer(&self.current_version, &latest).map(|newer| (latest, newer)));

        self.cache.last_check = Some(now);
        self.cache.current_version = Some(self.current_version.clone());
        let result = match outcome {
            Ok((latest, newer)) => {
                self.cache.latest_version = Some(latest.clone());
                self.cache.update_available = newer;
                self.cache.last_error = None;
                tracing::debug!(current = %self.current_version, %latest, newer, "Update check complete");
                UpdateCheckResult {
                    current_version: self.current_version.clone(),
                    latest_version: Some(latest),
                    update_available: newer,
                    cached: false,
                    error: None,
                }
            }
            Err(e) => {
                self.cache.last_error = Some(e.to_string());
                tracing::warn!(error = %e, "Update check failed");
                UpdateCheckResult {
                    current_version: self.current_version.clone(),
                    latest_version: self.cache.latest_version.clone(),
                    update_available: false,
                    cached: false,
                    error: Some(e),
                }
            }
        };

        if let Some(path) = &self.cache_path
            && let Err(e) = self.cache.save(path)
        {
            tracing::warn!(path = %path, error = %e, "Could not save update cache");
        }
        result
    }
}

//! Where the latest released version comes from.

use std::time::Duration;

use serde::Deserialize;

use crate::error::UpdateCheckError;

pub const GITHUB_API_URL: &str = "https://api.github.com";
pub const GITHUB_REPO: &str = "easel/ddx";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A source of the latest release tag.
pub trait ReleaseSource {
    /// The latest release tag, such as `v1.4.0`.
    fn latest_version(&self) -> Result<String, UpdateCheckError>;
}

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
}

/// Latest release of a GitHub repository via the REST API.
#[derive(Debug, Clone)]
pub struct GithubReleases {
    api_url: String,
    repo: String,
    user_agent: String,
    timeout: Duration,
}

impl GithubReleases {
    /// Releases of the DDx repository, identifying as `ddx/<version>`.
    pub fn new(current_version: &str) -> Self {
        Self {
            api_url: GITHUB_API_URL.to_string(),
            repo: GITHUB_REPO.to_string(),
            user_agent: format!("ddx/{current_version}"),
            timeout: REQUEST_TIMEOUT,
        }
    }

    /// Point at another API host or repository.
    pub fn with_endpoint(mut self, api_url: impl Into<String>, repo: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self.repo = repo.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn url(&self) -> String {
        format!(
            "{}/repos/{}/releases/latest",
            self.api_url.trim_end_matches('/'),
            self.repo
        )
    }
}

impl ReleaseSource for GithubReleases {
    fn latest_version(&self) -> Result<String, UpdateCheckError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(&self.user_agent)
            .timeout(self.timeout)
            .build()
            .map_err(|e| UpdateCheckError::NetworkFailure(e.to_string()))?;

        let url = self.url();
        tracing::debug!(%url, "Fetching latest release");
        let response = client
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .map_err(|e| UpdateCheckError::NetworkFailure(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateCheckError::NetworkFailure(format!(
                "GitHub API returned status {status}"
            )));
        }

        let release: Release = response.json().map_err(|e| {
            if e.is_decode() {
                UpdateCheckError::ParseFailure(e.to_string())
            } else {
                UpdateCheckError::NetworkFailure(e.to_string())
            }
        })?;
        Ok(release.tag_name)
    }
}

/// Whether `latest` is newer than `current`.
///
/// A leading `v` is ignored on both. A running version containing `dev`
/// always reports an update.
pub fn is_newer(current: &str, latest: &str) -> Result<bool, UpdateCheckError> {
    let current = current.trim().trim_start_matches('v');
    let latest = latest.trim().trim_start_matches('v');
    if current.contains("dev") {
        return Ok(true);
    }
    let parse = |v: &str| {
        semver::Version::parse(v)
            .map_err(|e| UpdateCheckError::ParseFailure(format!("invalid version '{v}': {e}")))
    };
    Ok(parse(latest)? > parse(current)?)
}

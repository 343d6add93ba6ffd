//! Checking for newer DDx releases.
//!
//! [`UpdateChecker`] asks a [`ReleaseSource`] for the latest version at
//! most once per configured interval, remembering the answer (or the
//! failure) in an [`UpdateCache`] file. A failed check never surfaces as
//! an error to the caller.

mod cache;
mod checker;
mod release;

pub use cache::{CACHE_FILE, UpdateCache};
pub use checker::{UpdateCheckResult, UpdateChecker};
pub use release::{GITHUB_API_URL, GITHUB_REPO, GithubReleases, ReleaseSource, is_newer};

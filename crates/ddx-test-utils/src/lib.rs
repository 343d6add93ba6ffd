//! Shared test utilities for the DDx workspace.
//!
//! This crate provides standardised test fixtures to eliminate duplication
//! across crate test suites. It is a dev-dependency only and never published.
//!
//! # Modules
//!
//! - [`git`]: git fixtures for project repositories and bare upstream libraries
//! - [`project`]: [`TestProject`](project::TestProject) builder for an initialised DDx project

pub mod git;
pub mod project;

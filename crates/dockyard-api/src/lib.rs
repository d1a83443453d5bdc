//! HTTP clients used by Dockyard.
//!
//! - [`ApiClient`] talks to the dashboard's release API
//! - [`GitHubContents`] reads repository contents for buildpack detection

pub mod client;
pub mod error;
pub mod github;

pub use client::ApiClient;
pub use error::ApiError;
pub use github::GitHubContents;

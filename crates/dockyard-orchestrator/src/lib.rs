//! Build-and-deploy orchestration for Dockyard.
//!
//! Turns an application's source into a pushed image and asks the release side to roll it
//! out. The [`DeployAgent`] drives the sequence; source acquisition and image cache reuse
//! live in their own modules.

pub mod agent;
pub mod cache;
pub mod source;

#[cfg(test)]
pub(crate) mod testing;

pub use agent::{DeployAgent, DeployEvent, DeployOpts, DeployPlan, DeployServices, DeployState};
pub use cache::{BuildCache, ImageCache};
pub use source::{AcquiredSource, SourceFetcher};

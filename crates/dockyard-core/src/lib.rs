//! Core domain types and traits for the Dockyard build-and-deploy orchestrator.
//!
//! This crate contains:
//! - Typed access into a release's nested configuration document
//! - Release descriptors and the release API trait
//! - Build options and the image/buildpack build traits
//! - The deployment notifier trait
//! - Repository locations and the repository-content trait

pub mod build;
pub mod deployer;
pub mod error;
pub mod release;
pub mod repository;
pub mod value;

pub use error::{Error, Result};
pub use value::{ConfigObject, ValueError};

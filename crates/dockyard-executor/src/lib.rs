//! Image build backends for Dockyard.
//!
//! Provides:
//! - Local Docker agent (direct Dockerfile builds, pull/tag/push)
//! - Pack builder (cloud-native buildpacks through the `pack` CLI)

pub mod docker;
pub mod pack;

pub use docker::LocalDockerAgent;
pub use dockyard_core::build::{BuildMethod, BuildOptions, BuildpackBuilder, ImageAgent};
pub use pack::PackBuilder;

//! Configuration handling for Dockyard.
//!
//! This crate handles:
//! - Build environment resolution from release configuration
//! - CLI settings (config.kdl)

pub mod env;
pub mod error;
pub mod settings;

pub use env::{BuildEnv, SECRET_MARKER, env_prefix, resolve_env};
pub use error::{ConfigError, ConfigResult};
pub use settings::{RegistrySettings, Settings, load_settings, parse_settings};

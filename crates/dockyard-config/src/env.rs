//! Build environment resolution.
//!
//! A release keeps its plain environment variables under `container.env.normal`. Values that
//! carry the [`SECRET_MARKER`] are placeholders for secrets injected at run time and never
//! reach a build.
//!
//! The resolved variables can be exposed two ways:
//! - as `<PREFIX>_<KEY>` pairs handed to a child build command, where the prefix is derived
//!   from the application name (see [`env_prefix`])
//! - as `KEY=value` lines written to a file or stream

use dockyard_core::value::get_path;
use dockyard_core::{ConfigObject, ValueError};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use crate::ConfigResult;

/// Marker contained in values that stand in for run-time secrets.
pub const SECRET_MARKER: &str = "PORTERSECRET";

const PREFIX_ROOT: &str = "DOCKYARD";

const ENV_PATH: [&str; 3] = ["container", "env", "normal"];

/// Prefix for an application's build variables, e.g. `DOCKYARD_MY_APP` for `my-app`.
pub fn env_prefix(app: &str) -> String {
    format!("{}_{}", PREFIX_ROOT, app.to_uppercase().replace('-', "_"))
}

/// Extract the plain environment of a release configuration.
///
/// A configuration without an environment block resolves to an empty map.
pub fn resolve_env(config: &ConfigObject) -> ConfigResult<BTreeMap<String, String>> {
    let normal = match get_path(config, &ENV_PATH) {
        Ok(normal) => normal,
        Err(e) if e.is_not_found() => return Ok(BTreeMap::new()),
        Err(e) => return Err(e.into()),
    };

    let mut env = BTreeMap::new();

    for (key, value) in normal {
        let value = value
            .as_str()
            .ok_or_else(|| ValueError::NotAString { field: key.clone() })?;

        if value.contains(SECRET_MARKER) {
            continue;
        }

        env.insert(key.clone(), value.to_string());
    }

    Ok(env)
}

/// Resolved build environment of one application.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildEnv {
    prefix: String,
    vars: BTreeMap<String, String>,
}

impl BuildEnv {
    pub fn new(app: &str, vars: BTreeMap<String, String>) -> Self {
        Self {
            prefix: env_prefix(app),
            vars,
        }
    }

    /// Resolve the build environment of `app` from its release configuration.
    pub fn from_release_config(app: &str, config: &ConfigObject) -> ConfigResult<Self> {
        Ok(Self::new(app, resolve_env(config)?))
    }

    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Variables keyed as `<PREFIX>_<KEY>`.
    pub fn prefixed(&self) -> BTreeMap<String, String> {
        self.vars
            .iter()
            .map(|(k, v)| (format!("{}_{}", self.prefix, k), v.clone()))
            .collect()
    }

    /// Write `KEY=value` lines, one per variable, in key order.
    pub fn write_to<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        for (key, value) in &self.vars {
            writeln!(writer, "{}={}", key, value)?;
        }
        writer.flush()
    }

    /// Dump the environment to a file, replacing any previous content.
    pub fn write_file(&self, path: &Path) -> ConfigResult<()> {
        let file = std::fs::File::create(path)?;
        self.write_to(std::io::BufWriter::new(file))?;
        Ok(())
    }
}

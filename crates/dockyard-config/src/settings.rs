//! CLI settings parsing.
//!
//! Settings live in `~/.dockyard/config.kdl`:
//!
//! ```kdl
//! api-url "https://dashboard.example.com"
//! token "..."
//! project 1
//! cluster 2
//! cache-dir "/var/cache/dockyard"
//! github-token "..."
//! registry server="registry.example.com" username="ci" password="..."
//! ```

use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_DIR: &str = ".dockyard";
const CONFIG_FILE: &str = "config.kdl";

/// Settings read from the CLI configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub api_url: Option<String>,
    pub token: Option<String>,
    pub project_id: Option<u64>,
    pub cluster_id: Option<u64>,
    /// Directory for downloaded sources; `~/.dockyard` when unset.
    pub cache_dir: Option<PathBuf>,
    /// Token for reading repository contents during buildpack detection.
    pub github_token: Option<String>,
    pub registry: Option<RegistrySettings>,
}

/// Credentials for the image registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySettings {
    pub server: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Settings {
    /// Directory holding settings and downloaded sources.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(CONFIG_DIR))
    }

    /// Default location of the settings file.
    pub fn default_path() -> Option<PathBuf> {
        Self::default_dir().map(|dir| dir.join(CONFIG_FILE))
    }

    /// Directory downloaded sources are unpacked into.
    pub fn cache_dir(&self) -> ConfigResult<PathBuf> {
        self.cache_dir
            .clone()
            .or_else(Self::default_dir)
            .ok_or_else(|| ConfigError::MissingField("cache-dir (no home directory)".to_string()))
    }
}

/// Parse settings from KDL text.
pub fn parse_settings(kdl: &str) -> ConfigResult<Settings> {
    let doc: KdlDocument = kdl.parse()?;
    let mut settings = Settings::default();

    for node in doc.nodes() {
        match node.name().value() {
            "api-url" | "api_url" => settings.api_url = get_first_string_arg(node),
            "token" => settings.token = get_first_string_arg(node),
            "project" => settings.project_id = Some(get_id_arg(node, "project")?),
            "cluster" => settings.cluster_id = Some(get_id_arg(node, "cluster")?),
            "cache-dir" | "cache_dir" => {
                settings.cache_dir = get_first_string_arg(node).map(PathBuf::from)
            }
            "github-token" | "github_token" => settings.github_token = get_first_string_arg(node),
            "registry" => settings.registry = Some(parse_registry(node)),
            _ => {} // Ignore unknown nodes
        }
    }

    Ok(settings)
}

/// Load settings from a file. A missing file yields default settings.
pub fn load_settings(path: &Path) -> ConfigResult<Settings> {
    match std::fs::read_to_string(path) {
        Ok(content) => parse_settings(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Settings::default()),
        Err(e) => Err(e.into()),
    }
}

fn parse_registry(node: &KdlNode) -> RegistrySettings {
    let mut registry = RegistrySettings {
        server: get_string_prop(node, "server"),
        username: get_string_prop(node, "username"),
        password: get_string_prop(node, "password"),
    };

    // Block syntax: registry { server "..." username "..." }
    if let Some(children) = node.children() {
        for child in children.nodes() {
            let value = get_first_string_arg(child);
            match child.name().value() {
                "server" => registry.server = value,
                "username" => registry.username = value,
                "password" => registry.password = value,
                _ => {}
            }
        }
    }

    registry
}

// Helper functions for extracting values from KDL nodes

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

fn get_id_arg(node: &KdlNode, field: &str) -> ConfigResult<u64> {
    let value = node
        .entries()
        .iter()
        .find(|e| e.name().is_none())
        .map(|e| e.value())
        .ok_or_else(|| ConfigError::MissingField(field.to_string()))?;

    if let Some(n) = value.as_integer() {
        return u64::try_from(n).map_err(|_| ConfigError::InvalidValue {
            field: field.to_string(),
            message: format!("{} is not a valid id", n),
        });
    }

    value
        .as_string()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| ConfigError::InvalidValue {
            field: field.to_string(),
            message: "expected a numeric id".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_settings() {
        let kdl = r#"
            api-url "https://dashboard.example.com"
            token "secret-token"
            project 12
            cluster 3
            cache-dir "/var/cache/dockyard"
            github-token "ghp_abc"
            registry server="registry.example.com" username="ci" password="hunter2"
        "#;

        let settings = parse_settings(kdl).unwrap();
        assert_eq!(
            settings.api_url.as_deref(),
            Some("https://dashboard.example.com")
        );
        assert_eq!(settings.token.as_deref(), Some("secret-token"));
        assert_eq!(settings.project_id, Some(12));
        assert_eq!(settings.cluster_id, Some(3));
        assert_eq!(
            settings.cache_dir().unwrap(),
            PathBuf::from("/var/cache/dockyard")
        );
        assert_eq!(settings.github_token.as_deref(), Some("ghp_abc"));

        let registry = settings.registry.unwrap();
        assert_eq!(registry.server.as_deref(), Some("registry.example.com"));
        assert_eq!(registry.username.as_deref(), Some("ci"));
        assert_eq!(registry.password.as_deref(), Some("hunter2"));
    }

    #[test]
    fn test_registry_block_syntax() {
        let kdl = r#"
            registry {
                username "ci"
                password "hunter2"
            }
        "#;

        let registry = parse_settings(kdl).unwrap().registry.unwrap();
        assert_eq!(registry.server, None);
        assert_eq!(registry.username.as_deref(), Some("ci"));
    }

    #[test]
    fn test_unknown_nodes_are_ignored() {
        let settings = parse_settings(r#"theme "dark""#).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_negative_project_is_rejected() {
        let err = parse_settings("project -1").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "project"));
    }

    #[test]
    fn test_project_as_string() {
        let settings = parse_settings(r#"project "7""#).unwrap();
        assert_eq!(settings.project_id, Some(7));
    }

    #[test]
    fn test_invalid_kdl() {
        assert!(matches!(
            parse_settings("api-url \"unterminated"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings(&dir.path().join("config.kdl")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.kdl");
        std::fs::write(&path, "cluster 9\n").unwrap();

        let settings = load_settings(&path).unwrap();
        assert_eq!(settings.cluster_id, Some(9));
    }
}

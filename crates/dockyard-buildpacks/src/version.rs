//! Node.js version pin parsing.
//!
//! `.nvmrc` and `.node-version` files hold either an alias (`node`, `lts/*`, `lts/<codename>`)
//! or a version constraint such as `18`, `v16.14.0`, `>=14 <17` or `12.x || 14.x`.

use regex::Regex;
use semver::VersionReq;
use std::sync::LazyLock;

use crate::error::{DetectError, DetectResult};

pub const NVMRC: &str = ".nvmrc";
pub const NODE_VERSION: &str = ".node-version";

/// Engine constraint used when a project pins no version.
pub const DEFAULT_NODE_ENGINE: &str = "16.*.*";

/// Long-term-support codenames and their major versions.
const LTS: [(&str, u64); 4] = [("argon", 4), ("boron", 6), ("carbon", 8), ("dubnium", 10)];

static HYPHEN_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\S+)\s+-\s+(\S+)\s*$").expect("Invalid hyphen range regex")
});

static OPERATOR_SPACE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(>=|<=|=|>|<|~|\^)\s+").expect("Invalid operator regex")
});

static VERSION_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^|[\s,=<>~^])[vV](\d)").expect("Invalid version prefix regex")
});

/// Major version of an LTS codename.
pub fn lts_major(codename: &str) -> Option<u64> {
    LTS.iter()
        .find(|(name, _)| *name == codename)
        .map(|(_, major)| *major)
}

/// Validate `.nvmrc` content, returning the normalized pin.
pub fn validate_nvmrc(content: &str) -> DetectResult<String> {
    let content = content.trim().to_lowercase();

    if content == "lts/*" || content == "node" {
        return Ok(content);
    }

    if let Some(codename) = content.strip_prefix("lts/") {
        if lts_major(codename).is_some() {
            return Ok(content);
        }
    }

    let content = content.strip_prefix('v').unwrap_or(&content).to_string();
    check_constraint(NVMRC, content)
}

/// Expand an `.nvmrc` alias into a version constraint.
///
/// `node` expands to `*`, `lts/*` to the newest known LTS major and `lts/<codename>` to
/// that codename's major. Anything else is returned unchanged.
pub fn format_nvmrc(version: &str) -> String {
    if version == "node" {
        return "*".to_string();
    }

    if let Some(codename) = version.strip_prefix("lts/") {
        let major = if codename == "*" {
            LTS.iter().map(|(_, major)| *major).max()
        } else {
            lts_major(codename)
        };
        if let Some(major) = major {
            return format!("{}.*", major);
        }
    }

    version.to_string()
}

/// Validate `.node-version` content, returning the normalized constraint.
pub fn validate_node_version(content: &str) -> DetectResult<String> {
    let content = content.trim().to_lowercase();
    let content = content.strip_prefix('v').unwrap_or(&content).to_string();
    check_constraint(NODE_VERSION, content)
}

fn check_constraint(file: &str, content: String) -> DetectResult<String> {
    if parse_constraint(&content).is_none() {
        return Err(DetectError::ConstraintParse {
            file: file.to_string(),
            content,
        });
    }
    Ok(content)
}

/// Parse a node-style version constraint.
///
/// Alternatives are separated by `||`. Within an alternative, comparators are separated by
/// whitespace or commas, and `a - b` denotes an inclusive range.
pub fn parse_constraint(constraint: &str) -> Option<Vec<VersionReq>> {
    constraint
        .split("||")
        .map(|set| VersionReq::parse(&normalize_set(set)).ok())
        .collect()
}

fn normalize_set(set: &str) -> String {
    // `v` may prefix any version in a comparator, e.g. `>=v14.0.0`.
    let set = VERSION_PREFIX.replace_all(set, "$1$2");

    if let Some(caps) = HYPHEN_RANGE.captures(&set) {
        return format!(">={}, <={}", &caps[1], &caps[2]);
    }

    let set = OPERATOR_SPACE.replace_all(&set, "$1");
    set.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use semver::Version;

    #[test]
    fn test_nvmrc_aliases() {
        assert_eq!(validate_nvmrc("lts/*\n").unwrap(), "lts/*");
        assert_eq!(validate_nvmrc("  Node ").unwrap(), "node");
        assert_eq!(validate_nvmrc("LTS/Carbon").unwrap(), "lts/carbon");
    }

    #[test]
    fn test_nvmrc_versions() {
        assert_eq!(validate_nvmrc("v16.14.0").unwrap(), "16.14.0");
        assert_eq!(validate_nvmrc("14").unwrap(), "14");
    }

    #[test]
    fn test_nvmrc_unknown_codename_is_invalid() {
        let err = validate_nvmrc("lts/gallium").unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"invalid version constraint specified in .nvmrc: "lts/gallium""#
        );
    }

    #[test]
    fn test_format_nvmrc() {
        assert_eq!(format_nvmrc("node"), "*");
        assert_eq!(format_nvmrc("lts/*"), "10.*");
        assert_eq!(format_nvmrc("lts/carbon"), "8.*");
        assert_eq!(format_nvmrc("lts/argon"), "4.*");
        assert_eq!(format_nvmrc("16.14.0"), "16.14.0");
    }

    #[test]
    fn test_node_version() {
        assert_eq!(validate_node_version("v18.12.1\n").unwrap(), "18.12.1");
        assert!(matches!(
            validate_node_version("eighteen"),
            Err(DetectError::ConstraintParse { ref file, .. }) if file == NODE_VERSION
        ));
        assert!(validate_node_version("").is_err());
    }

    #[test]
    fn test_constraint_syntax() {
        for constraint in [
            "18.x",
            "16.*.*",
            "*",
            ">=14 <17",
            ">= 14, < 17",
            "^16.13",
            "~14.17.0",
            "=12.22.1",
            "12.x || 14.x",
            "14.0.0 - 16.2.0",
        ] {
            assert!(
                parse_constraint(constraint).is_some(),
                "expected {:?} to parse",
                constraint
            );
        }
    }

    #[test]
    fn test_constraint_matching() {
        let reqs = parse_constraint(">=14 <17 || 18.x").unwrap();
        let matches = |v: &str| {
            let v = Version::parse(v).unwrap();
            reqs.iter().any(|r| r.matches(&v))
        };
        assert!(matches("16.3.0"));
        assert!(matches("18.1.0"));
        assert!(!matches("17.0.0"));

        let range = parse_constraint("14.0.0 - 16.2.0").unwrap();
        assert!(range[0].matches(&Version::new(16, 2, 0)));
        assert!(!range[0].matches(&Version::new(16, 3, 0)));
    }

    #[test]
    fn test_v_prefixed_comparators() {
        let reqs = parse_constraint(">=v14.0.0 <v17").unwrap();
        assert!(reqs[0].matches(&Version::new(16, 0, 0)));
        assert!(!reqs[0].matches(&Version::new(17, 0, 0)));

        let range = parse_constraint("v14.0.0 - v16.2.0").unwrap();
        assert!(range[0].matches(&Version::new(15, 1, 0)));

        assert_eq!(validate_node_version(">= v18.0.0").unwrap(), ">= v18.0.0");
        assert!(parse_constraint("vx").is_none());
    }

    #[test]
    fn test_invalid_constraints() {
        assert!(parse_constraint("latest").is_none());
        assert!(parse_constraint("").is_none());
        assert!(parse_constraint("14 ||").is_none());
    }
}

//! Typed access into a release's resolved configuration document.
//!
//! Release configuration arrives as an arbitrarily nested JSON object. Callers walk it with
//! [`get_path`], which distinguishes a missing field (often optional) from a value of the
//! wrong shape (always a hard failure).

use serde_json::{Map, Value};
use thiserror::Error;

/// A nested configuration object.
pub type ConfigObject = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("could not find field {field} in configuration")]
    FieldNotFound { field: String },

    #[error("{field} is not a nested object")]
    NotAnObject { field: String },

    #[error("{field} is not a string")]
    NotAString { field: String },
}

impl ValueError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ValueError::FieldNotFound { .. })
    }

    /// Name of the field the error refers to.
    pub fn field(&self) -> &str {
        match self {
            ValueError::FieldNotFound { field }
            | ValueError::NotAnObject { field }
            | ValueError::NotAString { field } => field,
        }
    }
}

/// Walk `path` one field at a time and return the nested object at its end.
///
/// Every value along the path, including the last one, must itself be an object.
pub fn get_path<'a>(root: &'a ConfigObject, path: &[&str]) -> Result<&'a ConfigObject, ValueError> {
    let mut current = root;

    for field in path {
        let value = current
            .get(*field)
            .ok_or_else(|| ValueError::FieldNotFound {
                field: field.to_string(),
            })?;

        current = value.as_object().ok_or_else(|| ValueError::NotAnObject {
            field: field.to_string(),
        })?;
    }

    Ok(current)
}

/// Read a string leaf from an object.
pub fn get_string<'a>(object: &'a ConfigObject, field: &str) -> Result<&'a str, ValueError> {
    object
        .get(field)
        .ok_or_else(|| ValueError::FieldNotFound {
            field: field.to_string(),
        })?
        .as_str()
        .ok_or_else(|| ValueError::NotAString {
            field: field.to_string(),
        })
}

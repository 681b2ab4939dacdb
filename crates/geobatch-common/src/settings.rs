//! Layered settings helpers
//!
//! Configuration in geobatch is assembled from defaults, a YAML file and
//! environment variables, in that order. These helpers cover the two outer
//! layers so each crate only has to describe its own fields.

use crate::error::{CommonError, Result};
use serde::de::DeserializeOwned;
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// Read and deserialize a YAML file.
pub fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path).map_err(|source| CommonError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    debug!(path = %path.display(), bytes = raw.len(), "Loaded settings file");

    serde_yaml::from_str(&raw).map_err(|source| CommonError::Yaml {
        path: path.to_path_buf(),
        source,
    })
}

/// Read an environment variable and parse it.
///
/// Returns `Ok(None)` when the variable is unset or empty.
pub fn env_var<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    let value = match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => return Ok(None),
    };

    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|e: T::Err| CommonError::InvalidEnv {
            key: key.to_string(),
            value,
            reason: e.to_string(),
        })
}

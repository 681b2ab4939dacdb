//! Pipeline configuration
//!
//! A [`Config`] is assembled once at startup and passed by value into the
//! pipeline. Layers, lowest precedence first:
//!
//! 1. built-in defaults
//! 2. the YAML file (`config.yml` unless another path is given)
//! 3. `GEOBATCH_*` environment variables (a `.env` file is honoured)
//! 4. command-line overrides applied by the binary

use crate::error::{GeobatchError, Result};
use geobatch_common::settings::{env_var, read_yaml};
use serde::Deserialize;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Settings file read when no explicit path is given.
pub const DEFAULT_CONFIG_FILE: &str = "config.yml";

/// Directory that receives artifacts and the aggregated CSV.
pub const DEFAULT_OUTPUT_DIR: &str = "./geocode";

/// Number of concurrent geocoding workers.
pub const DEFAULT_WORKERS: usize = 4;

/// Addresses sent per geocoding request.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Output spatial reference (WGS84).
pub const DEFAULT_OUT_SR: u32 = 4326;

/// Response format requested from the geocoding service.
pub const DEFAULT_RESPONSE_FORMAT: &str = "pjson";

/// What the dispatcher does when a single batch fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop every worker and fail the run on the first error
    #[default]
    Abort,
    /// Record the failed batch and keep going with the rest
    Isolate,
}

impl std::str::FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "abort" => Ok(FailurePolicy::Abort),
            "isolate" | "continue" => Ok(FailurePolicy::Isolate),
            other => Err(format!(
                "unknown failure policy '{other}', expected 'abort' or 'isolate'"
            )),
        }
    }
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailurePolicy::Abort => write!(f, "abort"),
            FailurePolicy::Isolate => write!(f, "isolate"),
        }
    }
}

/// Geocoding pipeline configuration
///
/// YAML keys keep the names used by existing `config.yml` files
/// (`geocodeURL`, `geocodePath`, `concurrentRoutines`).
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// `geocodeAddresses` endpoint of the geocoding service
    #[serde(rename = "geocodeURL")]
    pub geocode_url: String,

    /// Directory for raw response artifacts and the aggregated CSV
    #[serde(rename = "geocodePath")]
    pub output_dir: PathBuf,

    /// Number of concurrent workers
    #[serde(rename = "concurrentRoutines")]
    pub workers: usize,

    /// Records per request
    #[serde(rename = "batchSize")]
    pub batch_size: usize,

    /// Spatial reference id for returned coordinates
    #[serde(rename = "outSR")]
    pub out_sr: u32,

    /// Value of the `f` request parameter
    #[serde(rename = "responseFormat")]
    pub response_format: String,

    /// Per-request timeout; unset waits indefinitely
    #[serde(rename = "requestTimeoutSecs")]
    pub request_timeout_secs: Option<u64>,

    #[serde(rename = "failurePolicy")]
    pub failure_policy: FailurePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            geocode_url: String::new(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            workers: DEFAULT_WORKERS,
            batch_size: DEFAULT_BATCH_SIZE,
            out_sr: DEFAULT_OUT_SR,
            response_format: DEFAULT_RESPONSE_FORMAT.to_string(),
            request_timeout_secs: None,
            failure_policy: FailurePolicy::Abort,
        }
    }
}

impl Config {
    /// Load configuration from the settings file and environment.
    ///
    /// With `path == None` the default `config.yml` is used when present and
    /// silently skipped otherwise. An explicit path that cannot be read is an
    /// error. The result is not validated; call [`Config::validate`] once all
    /// overrides are applied.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config: Config = match path {
            Some(path) => read_yaml(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                read_yaml(Path::new(DEFAULT_CONFIG_FILE))?
            },
            None => Config::default(),
        };

        config.apply_env()?;
        Ok(config)
    }

    /// Overlay `GEOBATCH_*` environment variables.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(url) = env_var::<String>("GEOBATCH_GEOCODE_URL")? {
            self.geocode_url = url;
        }
        if let Some(dir) = env_var::<PathBuf>("GEOBATCH_OUTPUT_DIR")? {
            self.output_dir = dir;
        }
        if let Some(workers) = env_var("GEOBATCH_WORKERS")? {
            self.workers = workers;
        }
        if let Some(size) = env_var("GEOBATCH_BATCH_SIZE")? {
            self.batch_size = size;
        }
        if let Some(out_sr) = env_var("GEOBATCH_OUT_SR")? {
            self.out_sr = out_sr;
        }
        if let Some(format) = env_var::<String>("GEOBATCH_RESPONSE_FORMAT")? {
            self.response_format = format;
        }
        if let Some(secs) = env_var("GEOBATCH_REQUEST_TIMEOUT_SECS")? {
            self.request_timeout_secs = Some(secs);
        }
        if let Some(policy) = env_var("GEOBATCH_FAILURE_POLICY")? {
            self.failure_policy = policy;
        }
        Ok(())
    }

    /// Check that the configuration can drive a run.
    pub fn validate(&self) -> Result<()> {
        if self.geocode_url.trim().is_empty() {
            return Err(GeobatchError::config(
                "geocodeURL is not set. Add it to config.yml or set GEOBATCH_GEOCODE_URL",
            ));
        }

        let url = url::Url::parse(&self.geocode_url).map_err(|e| {
            GeobatchError::config(format!("geocodeURL '{}' is invalid: {e}", self.geocode_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(GeobatchError::config(format!(
                "geocodeURL must use http or https, got '{}'",
                url.scheme()
            )));
        }

        self.worker_count()?;
        self.chunk_size()?;

        if self.response_format.trim().is_empty() {
            return Err(GeobatchError::config("responseFormat must not be empty"));
        }
        if self.request_timeout_secs == Some(0) {
            return Err(GeobatchError::config(
                "requestTimeoutSecs must be positive; omit it to disable the timeout",
            ));
        }

        Ok(())
    }

    pub fn worker_count(&self) -> Result<NonZeroUsize> {
        NonZeroUsize::new(self.workers)
            .ok_or_else(|| GeobatchError::config("concurrentRoutines must be at least 1"))
    }

    pub fn chunk_size(&self) -> Result<NonZeroUsize> {
        NonZeroUsize::new(self.batch_size)
            .ok_or_else(|| GeobatchError::config("batchSize must be at least 1"))
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn valid() -> Config {
        Config {
            geocode_url: "http://localhost:6080/arcgis/rest/services/Locator/GeocodeServer/geocodeAddresses"
                .to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.workers, DEFAULT_WORKERS);
        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.out_sr, 4326);
        assert_eq!(config.response_format, "pjson");
        assert_eq!(config.failure_policy, FailurePolicy::Abort);
        assert!(config.request_timeout().is_none());
    }

    #[test]
    #[serial]
    fn test_load_yaml_with_legacy_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "geocodeURL: http://geo.example.com/geocodeAddresses\n\
             geocodePath: /tmp/geocode-out\n\
             concurrentRoutines: 8"
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.geocode_url, "http://geo.example.com/geocodeAddresses");
        assert_eq!(config.output_dir, PathBuf::from("/tmp/geocode-out"));
        assert_eq!(config.workers, 8);
        // Keys absent from the file keep their defaults
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_load_missing_explicit_file() {
        let err = Config::load(Some(Path::new("/no/such/config.yml"))).unwrap_err();
        assert!(matches!(err, GeobatchError::Common(_)));
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "geocodeURL: http://file.example.com\nconcurrentRoutines: 2").unwrap();

        std::env::set_var("GEOBATCH_WORKERS", "6");
        std::env::set_var("GEOBATCH_FAILURE_POLICY", "isolate");

        let result = Config::load(Some(file.path()));

        std::env::remove_var("GEOBATCH_WORKERS");
        std::env::remove_var("GEOBATCH_FAILURE_POLICY");

        let config = result.unwrap();
        assert_eq!(config.geocode_url, "http://file.example.com");
        assert_eq!(config.workers, 6);
        assert_eq!(config.failure_policy, FailurePolicy::Isolate);
    }

    #[test]
    #[serial]
    fn test_invalid_env_value() {
        std::env::set_var("GEOBATCH_BATCH_SIZE", "lots");
        let mut config = Config::default();
        let result = config.apply_env();
        std::env::remove_var("GEOBATCH_BATCH_SIZE");

        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(valid().validate().is_ok());

        let missing_url = Config::default();
        assert!(missing_url.validate().is_err());

        let ftp = Config {
            geocode_url: "ftp://geo.example.com".to_string(),
            ..valid()
        };
        assert!(ftp.validate().is_err());

        let no_workers = Config {
            workers: 0,
            ..valid()
        };
        assert!(no_workers.validate().is_err());

        let no_batch = Config {
            batch_size: 0,
            ..valid()
        };
        assert!(no_batch.validate().is_err());

        let zero_timeout = Config {
            request_timeout_secs: Some(0),
            ..valid()
        };
        assert!(zero_timeout.validate().is_err());
    }

    #[test]
    fn test_failure_policy_from_str() {
        assert_eq!("abort".parse::<FailurePolicy>().unwrap(), FailurePolicy::Abort);
        assert_eq!("Isolate".parse::<FailurePolicy>().unwrap(), FailurePolicy::Isolate);
        assert!("retry".parse::<FailurePolicy>().is_err());
    }
}

//! Tool configuration.
//!
//! An optional `hitspec.config.json` file supplies client defaults,
//! named environments, and stress profiles. Environment values layer
//! into the resolver with the documented precedence: CLI overrides beat
//! `.env.local`, which beats `.env`, which beats the config file's
//! environment section, which beats the process environment.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::http::{ClientOptions, RequestDefaults};
use crate::template::Resolver;

/// Default config file name looked up in the working directory.
pub const CONFIG_FILE: &str = "hitspec.config.json";

/// Root configuration document. Every field is optional in the file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub default_environment: String,
    /// Default request timeout in milliseconds.
    pub timeout: u64,
    /// Default retry count for requests without `@retry`.
    pub retries: u32,
    /// Default delay between retries in milliseconds.
    pub retry_delay: u64,
    pub follow_redirects: bool,
    pub max_redirects: usize,
    pub validate_ssl: bool,
    pub proxy: String,
    /// Headers applied to every request.
    pub headers: HashMap<String, String>,
    /// Named variable sets selected with `--env`.
    pub environments: HashMap<String, HashMap<String, String>>,
    pub stress: StressSection,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_environment: "dev".to_string(),
            timeout: 30_000,
            retries: 0,
            retry_delay: 1_000,
            follow_redirects: true,
            max_redirects: 10,
            validate_ssl: true,
            proxy: String::new(),
            headers: HashMap::new(),
            environments: HashMap::new(),
            stress: StressSection::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StressSection {
    pub profiles: HashMap<String, StressProfile>,
}

/// A named stress profile from the config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StressProfile {
    /// Run duration in seconds.
    pub duration: Option<u64>,
    /// Target requests per second (rate mode).
    pub rate: Option<f64>,
    /// Virtual users (VU mode).
    pub vus: Option<usize>,
    pub max_vus: Option<usize>,
    /// Think time between VU iterations in milliseconds.
    pub think_time: Option<u64>,
    /// Ramp-up interval in seconds.
    pub ramp_up: Option<u64>,
    /// Metric name → comparator string, e.g. `"p95": "<200ms"`.
    pub thresholds: HashMap<String, String>,
}

impl StressProfile {
    /// Renders the thresholds map as the canonical expression string.
    pub fn thresholds_expr(&self) -> String {
        let mut entries: Vec<(&String, &String)> = self.thresholds.iter().collect();
        entries.sort();
        entries
            .iter()
            .map(|(metric, comparator)| format!("{metric}{comparator}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl Config {
    /// Loads configuration. An explicitly named file must exist; the
    /// default file is optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(Error::Config(format!(
                        "config file '{}' not found",
                        path.display()
                    )));
                }
                path.to_path_buf()
            }
            None => {
                let default = PathBuf::from(CONFIG_FILE);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };
        let text = std::fs::read_to_string(&path)?;
        serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("invalid config '{}': {e}", path.display())))
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            timeout: Duration::from_millis(self.timeout),
            follow_redirects: self.follow_redirects,
            max_redirects: self.max_redirects,
            validate_ssl: self.validate_ssl,
            proxy: if self.proxy.is_empty() {
                None
            } else {
                Some(self.proxy.clone())
            },
        }
    }

    pub fn request_defaults(&self) -> RequestDefaults {
        RequestDefaults {
            timeout: Duration::from_millis(self.timeout),
            headers: self
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// Seeds `resolver` with the selected environment's variables and
    /// the `.env` / `.env.local` files next to `base_dir`, low to high
    /// precedence. CLI overrides are applied by the caller afterwards.
    pub fn seed_resolver(&self, resolver: &Resolver, environment: Option<&str>, base_dir: &Path) {
        let name = environment.unwrap_or(&self.default_environment);
        if let Some(vars) = self.environments.get(name) {
            for (key, value) in vars {
                resolver.set_dotenv(key.clone(), value.clone());
            }
        } else if environment.is_some() {
            tracing::warn!(environment = name, "environment not defined in config");
        }
        load_env_file(&base_dir.join(".env"), resolver);
        load_env_file(&base_dir.join(".env.local"), resolver);
    }
}

/// Loads one dotenv file into the resolver's dotenv namespace without
/// touching the process environment. Parse problems are warnings.
fn load_env_file(path: &Path, resolver: &Resolver) {
    if !path.exists() {
        return;
    }
    let iter = match dotenvy::from_path_iter(path) {
        Ok(iter) => iter,
        Err(e) => {
            tracing::warn!(file = %path.display(), error = %e, "cannot read env file");
            return;
        }
    };
    for item in iter {
        match item {
            Ok((key, value)) => resolver.set_dotenv(key, value),
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "skipping malformed env line");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.default_environment, "dev");
        assert_eq!(config.timeout, 30_000);
        assert_eq!(config.retries, 0);
        assert_eq!(config.retry_delay, 1_000);
        assert!(config.follow_redirects);
        assert_eq!(config.max_redirects, 10);
        assert!(config.validate_ssl);
    }

    #[test]
    fn test_parse_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hitspec.config.json");
        std::fs::write(
            &path,
            r#"{
                "timeout": 5000,
                "headers": {"X-Env": "ci"},
                "environments": {"staging": {"baseUrl": "https://staging.example.com"}},
                "stress": {"profiles": {"smoke": {"duration": 10, "rate": 50.0, "thresholds": {"p95": "<200ms"}}}}
            }"#,
        )
        .unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.timeout, 5000);
        assert_eq!(config.headers["X-Env"], "ci");
        assert_eq!(
            config.environments["staging"]["baseUrl"],
            "https://staging.example.com"
        );
        let profile = &config.stress.profiles["smoke"];
        assert_eq!(profile.duration, Some(10));
        assert_eq!(profile.thresholds_expr(), "p95<200ms");
    }

    #[test]
    fn test_missing_explicit_config_is_error() {
        let err = Config::load(Some(Path::new("/definitely/missing.json"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_env_file_layering() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".env"), "TOKEN=base\nSHARED=env\n").unwrap();
        std::fs::write(dir.path().join(".env.local"), "TOKEN=local\n").unwrap();

        let mut config = Config::default();
        config.environments.insert(
            "dev".to_string(),
            HashMap::from([
                ("TOKEN".to_string(), "config".to_string()),
                ("ONLY_CONFIG".to_string(), "yes".to_string()),
            ]),
        );

        let resolver = Resolver::new();
        config.seed_resolver(&resolver, None, dir.path());
        assert_eq!(resolver.resolve("{{$TOKEN}}"), "local");
        assert_eq!(resolver.resolve("{{$SHARED}}"), "env");
        assert_eq!(resolver.resolve("{{$ONLY_CONFIG}}"), "yes");
    }

    #[test]
    fn test_client_options_mapping() {
        let mut config = Config::default();
        config.proxy = "http://proxy.local:8080".to_string();
        config.validate_ssl = false;
        let options = config.client_options();
        assert_eq!(options.proxy.as_deref(), Some("http://proxy.local:8080"));
        assert!(!options.validate_ssl);
    }
}

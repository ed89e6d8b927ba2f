//! Application configuration
//!
//! Two layers live here. [`AppConfig`] holds process settings read from
//! environment variables, the way the host binary needs them before anything
//! else is up. [`Configuration`] is the dotted-key store that topology
//! scripts and components read through `config(key)`, assembled by
//! [`ConfigurationLoader`] from overrides, external files and the default
//! properties file.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::environment;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Default properties file for the topology configuration
    pub config_path: PathBuf,

    /// Port for the admin API
    pub admin_port: u16,

    /// Upper bound on a single control message evaluation, in seconds
    pub eval_timeout_secs: u64,

    /// Capacity of the control channel mailbox
    pub control_buffer: usize,

    /// Time allowed for the engine to stop after termination, in seconds
    pub shutdown_grace_secs: u64,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            config_path: env::var("ROUTEPLANE_CONFIG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./routeplane.properties")),

            admin_port: env::var("ROUTEPLANE_ADMIN_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8091),

            eval_timeout_secs: env::var("ROUTEPLANE_EVAL_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),

            control_buffer: env::var("ROUTEPLANE_CONTROL_BUFFER")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(64),

            shutdown_grace_secs: env::var("ROUTEPLANE_SHUTDOWN_GRACE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
        }
    }

    pub fn eval_timeout(&self) -> Duration {
        Duration::from_secs(self.eval_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Errors raised while loading or reading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing configuration key: {0}")]
    MissingKey(String),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
}

/// Anything usable as a configuration key.
///
/// Keys are normalized to their string form before lookup, so a raw string
/// and a script symbol naming the same key resolve identically.
pub trait ConfigKey {
    fn config_key(&self) -> Cow<'_, str>;
}

impl ConfigKey for str {
    fn config_key(&self) -> Cow<'_, str> {
        Cow::Borrowed(self)
    }
}

impl ConfigKey for String {
    fn config_key(&self) -> Cow<'_, str> {
        Cow::Borrowed(self.as_str())
    }
}

/// Read-only dotted-key configuration store
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    values: BTreeMap<String, String>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a configuration from key/value pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Set a value (builder pattern).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Resolve a key, failing when the store has no value for it.
    pub fn get<K: ConfigKey + ?Sized>(&self, key: &K) -> Result<&str, ConfigError> {
        let key = key.config_key();
        self.values
            .get(key.as_ref())
            .map(String::as_str)
            .ok_or_else(|| ConfigError::MissingKey(key.into_owned()))
    }

    /// Resolve a key, falling back to `default` when absent.
    pub fn get_or<'a, K: ConfigKey + ?Sized>(&'a self, key: &K, default: &'a str) -> &'a str {
        self.values
            .get(key.config_key().as_ref())
            .map(String::as_str)
            .unwrap_or(default)
    }

    /// Parse a value with [`FromStr`].
    pub fn get_parsed<T, K>(&self, key: &K) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
        K: ConfigKey + ?Sized,
    {
        let raw = self.get(key)?;
        raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.config_key().into_owned(),
            message: e.to_string(),
        })
    }

    /// Read a boolean. Accepts `true/false`, `yes/no`, `on/off` and `1/0`.
    pub fn get_bool<K: ConfigKey + ?Sized>(&self, key: &K) -> Result<bool, ConfigError> {
        let raw = self.get(key)?;
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(true),
            "false" | "no" | "off" | "0" => Ok(false),
            other => Err(ConfigError::InvalidValue {
                key: key.config_key().into_owned(),
                message: format!("expected a boolean, found `{}`", other),
            }),
        }
    }

    pub fn contains<K: ConfigKey + ?Sized>(&self, key: &K) -> bool {
        self.values.contains_key(key.config_key().as_ref())
    }

    /// Keys starting with `prefix`, in key order.
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<&str> {
        self.values
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Overlay `other` on top of this configuration; `other` wins on conflicts.
    fn overlay(&mut self, other: Configuration) {
        self.values.extend(other.values);
    }
}

/// Builds a [`Configuration`] from layered sources.
///
/// Precedence, highest first: explicit overrides, each file listed under
/// `routeplane.configuration.externals` (earlier entries win), the default
/// file, then built-in defaults.
#[derive(Debug, Clone)]
pub struct ConfigurationLoader {
    default_path: PathBuf,
    overrides: BTreeMap<String, String>,
}

impl ConfigurationLoader {
    pub fn new(default_path: impl Into<PathBuf>) -> Self {
        Self {
            default_path: default_path.into(),
            overrides: BTreeMap::new(),
        }
    }

    /// Add an explicit override.
    pub fn with_override(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(key.into(), value.into());
        self
    }

    /// Add several overrides at once.
    pub fn with_overrides<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.overrides
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn load(&self) -> Result<Configuration, ConfigError> {
        let mut merged = Configuration::from_pairs(environment::defaults());

        let default_file = read_source(&self.default_path)?;
        let externals = self
            .overrides
            .get(environment::CONFIGURATION_EXTERNALS)
            .map(String::as_str)
            .or_else(|| default_file.get(environment::CONFIGURATION_EXTERNALS).ok())
            .filter(|s| !s.trim().is_empty())
            .map(|s| env::split_paths(s.trim()).collect::<Vec<_>>())
            .unwrap_or_default();

        merged.overlay(default_file);

        for path in externals.iter().rev() {
            merged.overlay(read_source(path)?);
            tracing::debug!(path = %path.display(), "Loaded external configuration");
        }

        merged.overlay(Configuration {
            values: self.overrides.clone(),
        });

        tracing::info!(
            path = %self.default_path.display(),
            externals = externals.len(),
            keys = merged.len(),
            "Configuration loaded"
        );
        Ok(merged)
    }
}

/// Read one configuration file, picking the format by extension.
fn read_source(path: &Path) -> Result<Configuration, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    let raw = if is_yaml {
        parse_yaml(&content).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })?
    } else {
        parse_properties(&content)
    };

    let mut values = BTreeMap::new();
    for (key, value) in raw {
        let expanded = expand_env_vars(&value).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })?;
        values.insert(key, expanded);
    }
    Ok(Configuration { values })
}

/// Parse `key=value` / `key: value` lines. `#` and `!` start comments.
fn parse_properties(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .filter_map(|line| {
            let split = line.find(['=', ':'])?;
            let key = line[..split].trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), line[split + 1..].trim().to_string()))
        })
        .collect()
}

/// Parse YAML and flatten nested mappings into dotted keys.
fn parse_yaml(content: &str) -> Result<Vec<(String, String)>, String> {
    let doc: serde_yaml::Value = serde_yaml::from_str(content).map_err(|e| e.to_string())?;
    let mut out = Vec::new();
    flatten_yaml("", &doc, &mut out);
    Ok(out)
}

fn flatten_yaml(prefix: &str, value: &serde_yaml::Value, out: &mut Vec<(String, String)>) {
    use serde_yaml::Value;

    let join = |segment: &str| {
        if prefix.is_empty() {
            segment.to_string()
        } else {
            format!("{}.{}", prefix, segment)
        }
    };

    match value {
        Value::Mapping(map) => {
            for (k, v) in map {
                let segment = match k {
                    Value::String(s) => s.clone(),
                    Value::Bool(b) => b.to_string(),
                    Value::Number(n) => n.to_string(),
                    _ => continue,
                };
                flatten_yaml(&join(&segment), v, out);
            }
        }
        Value::Sequence(items) => {
            for (i, item) in items.iter().enumerate() {
                flatten_yaml(&join(&i.to_string()), item, out);
            }
        }
        Value::Tagged(tagged) => flatten_yaml(prefix, &tagged.value, out),
        Value::String(s) => out.push((prefix.to_string(), s.clone())),
        Value::Bool(b) => out.push((prefix.to_string(), b.to_string())),
        Value::Number(n) => out.push((prefix.to_string(), n.to_string())),
        Value::Null => out.push((prefix.to_string(), String::new())),
    }
}

/// Expand environment variables in a string
/// Supports: ${VAR}, ${VAR:-default}
fn expand_env_vars(input: &str) -> Result<String, String> {
    if !input.contains("${") {
        return Ok(input.to_string());
    }

    let re = regex_lite::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
        .map_err(|e| e.to_string())?;
    let expanded = re.replace_all(input, |caps: &regex_lite::Captures| {
        let var_name = &caps[1];
        let default = caps.get(2).map(|m| m.as_str());

        env::var(var_name).unwrap_or_else(|_| default.unwrap_or("").to_string())
    });
    Ok(expanded.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_get_missing_key_is_reported() {
        let config = Configuration::new().with("a.b", "1");
        assert_eq!(config.get("a.b").unwrap(), "1");
        match config.get("a.c") {
            Err(ConfigError::MissingKey(key)) => assert_eq!(key, "a.c"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_string_and_owned_keys_resolve_identically() {
        let config = Configuration::new().with("routeplane.channels.control", "direct:cc");
        let owned = String::from("routeplane.channels.control");
        assert_eq!(config.get(&owned).unwrap(), config.get("routeplane.channels.control").unwrap());
    }

    #[test]
    fn test_typed_accessors() {
        let config = Configuration::new()
            .with("port", "8080")
            .with("flag", "Yes")
            .with("broken", "maybe");

        assert_eq!(config.get_parsed::<u16, _>("port").unwrap(), 8080);
        assert!(config.get_bool("flag").unwrap());
        assert!(matches!(
            config.get_bool("broken"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert_eq!(config.get_or("absent", "fallback"), "fallback");
    }

    #[test]
    fn test_keys_with_prefix_in_order() {
        let config = Configuration::new()
            .with("routeplane.bootstrap.extended.script.b", "2")
            .with("routeplane.bootstrap.extended.script.a", "1")
            .with("routeplane.bootstrap.script.url", "x")
            .with("zzz", "z");

        assert_eq!(
            config.keys_with_prefix(environment::EXTENDED_SCRIPT_PREFIX),
            vec![
                "routeplane.bootstrap.extended.script.a",
                "routeplane.bootstrap.extended.script.b"
            ]
        );
    }

    #[test]
    fn test_parse_properties() {
        let parsed = parse_properties(
            "# comment\n! also a comment\n\na.b = one\nc.d: two\nurl=direct:start\n",
        );
        assert_eq!(
            parsed,
            vec![
                ("a.b".to_string(), "one".to_string()),
                ("c.d".to_string(), "two".to_string()),
                ("url".to_string(), "direct:start".to_string()),
            ]
        );
    }

    #[test]
    fn test_env_var_expansion() {
        std::env::set_var("ROUTEPLANE_TEST_HOST", "broker.local");
        assert_eq!(
            expand_env_vars("tcp://${ROUTEPLANE_TEST_HOST}:${ROUTEPLANE_TEST_PORT:-61616}").unwrap(),
            "tcp://broker.local:61616"
        );
        std::env::remove_var("ROUTEPLANE_TEST_HOST");
    }

    #[test]
    fn test_loader_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_file(&dir, "first.properties", "shared = first\nonly.first = 1\n");
        let second = write_file(
            &dir,
            "second.yaml",
            "shared: second\nonly:\n  second: 2\nlist:\n  - a\n  - b\n",
        );
        let externals = env::join_paths([&first, &second]).unwrap();
        let default = write_file(
            &dir,
            "routeplane.properties",
            &format!(
                "shared = default\nonly.default = 0\n{} = {}\n",
                environment::CONFIGURATION_EXTERNALS,
                externals.to_string_lossy()
            ),
        );

        let config = ConfigurationLoader::new(&default)
            .with_override("overridden", "yes")
            .load()
            .unwrap();

        assert_eq!(config.get("shared").unwrap(), "first");
        assert_eq!(config.get("only.first").unwrap(), "1");
        assert_eq!(config.get("only.second").unwrap(), "2");
        assert_eq!(config.get("only.default").unwrap(), "0");
        assert_eq!(config.get("list.1").unwrap(), "b");
        assert_eq!(config.get("overridden").unwrap(), "yes");
        // built-in defaults fill the gaps
        assert_eq!(
            config.get(environment::CONTROL_CHANNEL).unwrap(),
            "direct:control-channel"
        );
    }

    #[test]
    fn test_override_beats_files() {
        let dir = tempfile::tempdir().unwrap();
        let default = write_file(&dir, "app.properties", "routeplane.trace.level = debug\n");

        let config = ConfigurationLoader::new(&default)
            .with_overrides([("routeplane.trace.level", "warn")])
            .load()
            .unwrap();
        assert_eq!(config.get(environment::TRACE_LEVEL).unwrap(), "warn");
    }

    #[test]
    fn test_missing_files_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.properties");
        assert!(matches!(
            ConfigurationLoader::new(&missing).load(),
            Err(ConfigError::NotFound(_))
        ));

        let default = write_file(
            &dir,
            "app.properties",
            &format!(
                "{} = {}\n",
                environment::CONFIGURATION_EXTERNALS,
                dir.path().join("absent.yaml").display()
            ),
        );
        match ConfigurationLoader::new(&default).load() {
            Err(ConfigError::NotFound(path)) => assert!(path.ends_with("absent.yaml")),
            other => panic!("unexpected: {:?}", other),
        }
    }
}

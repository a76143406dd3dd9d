use std::{path::PathBuf, time::Duration};

use crate::error::ConfigError;

/// Snapshots older than this are not trusted on load.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);
pub const DEFAULT_DIR_NAME: &str = "metrics-persist";
pub const PATH_ENV: &str = "METRICS_PERSIST_PATH";
pub const TTL_ENV: &str = "METRICS_PERSIST_TTL";
const SNAPSHOT_EXT: &str = "json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Directory holding one snapshot file per integration.
    pub dir: PathBuf,
    /// Staleness window.
    pub ttl: Duration,
}
impl StoreConfig {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
        }
    }
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(dir) = lookup(PATH_ENV).filter(|dir| !dir.is_empty()) {
            config.dir = PathBuf::from(dir);
        }
        if let Some(value) = lookup(TTL_ENV) {
            config.ttl = humantime::parse_duration(value.trim())
                .map_err(|source| ConfigError::InvalidTtl { value, source })?;
        }
        Ok(config)
    }

    pub fn path_for(&self, integration: &str) -> PathBuf {
        let mut file = sanitize(integration);
        file.push('.');
        file.push_str(SNAPSHOT_EXT);
        self.dir.join(file)
    }
}
impl Default for StoreConfig {
    fn default() -> Self {
        Self::new(std::env::temp_dir().join(DEFAULT_DIR_NAME), DEFAULT_TTL)
    }
}

fn sanitize(name: &str) -> String {
    // a lone "." or ".." must not become a path component
    let only_dots = name.chars().all(|c| c == '.');
    let name: String = name
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            '.' if !only_dots => c,
            _ => '_',
        })
        .collect();
    if name.is_empty() {
        String::from("_")
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_without_env() {
        let config = StoreConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.ttl, DEFAULT_TTL);
        assert!(config.dir.ends_with(DEFAULT_DIR_NAME));
    }

    #[test]
    fn env_overrides_dir_and_ttl() {
        let config =
            StoreConfig::from_lookup(lookup(&[(PATH_ENV, "/var/cache/x"), (TTL_ENV, "5m")]))
                .unwrap();
        assert_eq!(config.dir, PathBuf::from("/var/cache/x"));
        assert_eq!(config.ttl, Duration::from_secs(300));
    }

    #[test]
    fn bad_ttl_is_an_error() {
        let err = StoreConfig::from_lookup(lookup(&[(TTL_ENV, "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTtl { ref value, .. } if value == "soon"));
    }

    #[test]
    fn path_is_derived_from_integration_name() {
        let config = StoreConfig::new("/tmp/base", DEFAULT_TTL);
        assert_eq!(
            config.path_for("com.example.redis"),
            PathBuf::from("/tmp/base/com.example.redis.json")
        );
        assert_eq!(
            config.path_for("../etc/passwd"),
            PathBuf::from("/tmp/base/.._etc_passwd.json")
        );
        assert_eq!(config.path_for(".."), PathBuf::from("/tmp/base/__.json"));
        assert_eq!(config.path_for(""), PathBuf::from("/tmp/base/_.json"));
    }
}

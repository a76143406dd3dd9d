use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, SystemTime},
};

use crate::{
    clock::{unix_seconds, Clock},
    codec::{decode_snapshot, encode_snapshot},
    config::{StoreConfig, DEFAULT_TTL},
    error::StoreError,
    MetricKey, Sample,
};

/// Key to last raw sample memory consumed by the sampling engine.
///
/// Implementations do no internal locking. Callers sharing one store between
/// threads must hold an external mutex around every call.
pub trait Storer {
    /// The last sample set for `name`, if any.
    fn get(&self, name: &str) -> Option<Sample>;
    /// Overwrites the entry for `name` stamped with the current time and
    /// returns that time in unix seconds.
    fn set(&mut self, name: &str, value: f64) -> i64;
    fn delete(&mut self, name: &str);
    /// Persists every entry. A no-op for stores without a backing file.
    fn save(&self) -> Result<(), StoreError>;
}

#[derive(Debug)]
pub struct Store {
    entries: HashMap<MetricKey, Sample>,
    path: Option<PathBuf>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}
impl Store {
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: HashMap::new(),
            path: None,
            clock,
            ttl: DEFAULT_TTL,
        }
    }
    /// Binds the store to `path`, loading the snapshot found there unless it
    /// is older than `ttl` or unreadable.
    ///
    /// Only a failure to create the parent directory is an error.
    pub fn open(
        path: impl Into<PathBuf>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            create_dir(dir).map_err(|source| StoreError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let entries = load(&path, clock.now(), ttl);
        Ok(Self {
            entries,
            path: Some(path),
            clock,
            ttl,
        })
    }
    pub fn for_integration(
        integration: &str,
        config: &StoreConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StoreError> {
        Self::open(config.path_for(integration), clock, config.ttl)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.keys().map(String::as_str)
    }
}
impl Storer for Store {
    fn get(&self, name: &str) -> Option<Sample> {
        self.entries.get(name).copied()
    }
    fn set(&mut self, name: &str, value: f64) -> i64 {
        let time = unix_seconds(self.clock.now());
        self.entries.insert(name.to_owned(), Sample { time, value });
        time
    }
    fn delete(&mut self, name: &str) {
        self.entries.remove(name);
    }
    fn save(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let buf = encode_snapshot(&self.entries)?;
        fs::write(path, buf).map_err(|source| StoreError::Write {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(path = %path.display(), entries = self.entries.len(), "store saved");
        Ok(())
    }
}

#[cfg(unix)]
fn create_dir(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o755).create(dir)
}
#[cfg(not(unix))]
fn create_dir(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)
}

/// Never fails: a missing, stale or corrupt snapshot yields an empty map.
fn load(path: &Path, now: SystemTime, ttl: Duration) -> HashMap<MetricKey, Sample> {
    let modified = match fs::metadata(path).and_then(|meta| meta.modified()) {
        Ok(modified) => modified,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no store snapshot yet");
            return HashMap::new();
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), "cannot stat store snapshot: {e}");
            return HashMap::new();
        }
    };
    // A modification time ahead of now means the clock went backwards.
    let age = now.duration_since(modified).unwrap_or_default();
    if age > ttl {
        tracing::info!(
            path = %path.display(),
            age = %humantime::format_duration(age),
            ttl = %humantime::format_duration(ttl),
            "store snapshot is stale, starting empty"
        );
        return HashMap::new();
    }
    let buf = match fs::read(path) {
        Ok(buf) => buf,
        Err(e) => {
            tracing::warn!(path = %path.display(), "failed to read store snapshot: {e}");
            return HashMap::new();
        }
    };
    match decode_snapshot(&buf) {
        Ok(entries) => {
            tracing::debug!(path = %path.display(), entries = entries.len(), "store snapshot loaded");
            entries
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), "failed to parse store snapshot: {e}");
            HashMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs::File;

    use tempfile::tempdir;

    use super::*;
    use crate::clock::ManualClock;

    fn clock_now() -> Arc<ManualClock> {
        Arc::new(ManualClock::at(SystemTime::now()))
    }

    #[test]
    fn get_reports_missing_keys() {
        let store = Store::in_memory(clock_now());
        assert_eq!(store.get("nope"), None);
        assert!(store.is_empty());
    }

    #[test]
    fn set_overwrites_and_returns_timestamp() {
        let clock = Arc::new(ManualClock::new(1000));
        let mut store = Store::in_memory(clock.clone());
        assert_eq!(store.set("k", 1.0), 1000);
        clock.advance(Duration::from_secs(5));
        assert_eq!(store.set("k", 2.0), 1005);
        assert_eq!(
            store.get("k"),
            Some(Sample {
                time: 1005,
                value: 2.0
            })
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn delete_forgets_key() {
        let mut store = Store::in_memory(clock_now());
        store.set("k", 1.0);
        store.delete("k");
        assert_eq!(store.get("k"), None);
        store.delete("never-set");
    }

    #[test]
    fn in_memory_save_is_noop() {
        let mut store = Store::in_memory(clock_now());
        store.set("k", 1.0);
        store.save().unwrap();
        assert!(store.path().is_none());
    }

    #[test]
    fn round_trip_through_disk() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("integration.json");
        let clock = clock_now();
        let mut store = Store::open(&path, clock.clone(), DEFAULT_TTL).unwrap();
        let t = store.set("k1", 1.0);
        store.set("k2", 2.0);
        store.save().unwrap();

        let reopened = Store::open(&path, clock, DEFAULT_TTL).unwrap();
        assert_eq!(reopened.get("k1"), Some(Sample { time: t, value: 1.0 }));
        assert_eq!(reopened.get("k2"), Some(Sample { time: t, value: 2.0 }));
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("nested").join("deeper").join("s.json");
        let mut store = Store::open(&path, clock_now(), DEFAULT_TTL).unwrap();
        assert!(store.is_empty());
        assert!(path.parent().unwrap().is_dir());
        store.set("k", 3.0);
        store.save().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn stale_snapshot_is_ignored() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("s.json");
        let clock = clock_now();
        let mut store = Store::open(&path, clock.clone(), DEFAULT_TTL).unwrap();
        store.set("k", 1.0);
        store.save().unwrap();

        let modified = clock.now() - DEFAULT_TTL - Duration::from_secs(1);
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(modified)
            .unwrap();

        let reopened = Store::open(&path, clock, DEFAULT_TTL).unwrap();
        assert_eq!(reopened.get("k"), None);
        assert_eq!(reopened.path(), Some(path.as_path()));
    }

    #[test]
    fn snapshot_from_the_future_is_trusted() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("s.json");
        let clock = clock_now();
        let mut store = Store::open(&path, clock.clone(), DEFAULT_TTL).unwrap();
        store.set("k", 1.0);
        store.save().unwrap();

        clock.set(clock.unix_secs() - 3600);
        let reopened = Store::open(&path, clock, DEFAULT_TTL).unwrap();
        assert!(reopened.get("k").is_some());
    }

    #[test]
    fn corrupt_snapshot_starts_empty() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("s.json");
        fs::write(&path, b"{\"Data\": [").unwrap();
        let mut store = Store::open(&path, clock_now(), DEFAULT_TTL).unwrap();
        assert!(store.is_empty());
        store.set("k", 1.0);
        store.save().unwrap();
        let reopened = Store::open(&path, clock_now(), DEFAULT_TTL).unwrap();
        assert_eq!(reopened.len(), 1);
    }

    #[test]
    fn uncreatable_dir_fails_construction() {
        let tmp = tempdir().unwrap();
        let blocker = tmp.path().join("file");
        fs::write(&blocker, b"").unwrap();
        let err = Store::open(blocker.join("s.json"), clock_now(), DEFAULT_TTL).unwrap_err();
        assert!(matches!(err, StoreError::CreateDir { .. }));
    }

    #[test]
    fn save_failure_keeps_memory_intact() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("s.json");
        let mut store = Store::open(&path, clock_now(), DEFAULT_TTL).unwrap();
        fs::create_dir(&path).unwrap();
        store.set("k", 1.0);
        let err = store.save().unwrap_err();
        assert!(matches!(err, StoreError::Write { .. }));
        assert_eq!(store.get("k").map(|s| s.value), Some(1.0));
    }

    #[test]
    fn integration_store_uses_config_path() {
        let tmp = tempdir().unwrap();
        let config = StoreConfig::new(tmp.path().join("cache"), Duration::from_secs(30));
        let store = Store::for_integration("redis", &config, clock_now()).unwrap();
        assert_eq!(store.path(), Some(config.path_for("redis").as_path()));
        assert_eq!(store.ttl(), Duration::from_secs(30));
    }
}

//! JSON-file storage for the CLI.
//!
//! The whole map lives in one file that is rewritten atomically (temp file +
//! rename), so a batch of operations lands together or not at all. Other
//! processes writing the same file are picked up by [`FileStore::spawn_watcher`].

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, warn};
use ulid::Ulid;

use super::{KeyValueStore, Origin, StorageEvent, StoreError, StoreOp, EXTERNAL_ORIGIN};

type Entries = BTreeMap<String, String>;

const FILE_ORIGIN: Origin = 1;
const EVENT_CAPACITY: usize = 64;

pub struct FileStore {
    path: PathBuf,
    io: Mutex<Entries>,
    events: broadcast::Sender<StorageEvent>,
}

impl FileStore {
    /// Opens the store at `path`, creating parent directories as needed. A
    /// missing file is an empty store.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created or the file exists
    /// but is not a JSON object of strings.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let snapshot = load(&path)?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        debug!("opened session store at {}", path.display());
        Ok(Self {
            path,
            io: Mutex::new(snapshot),
            events,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Polls the file every `period` and broadcasts keys changed by other
    /// processes with [`EXTERNAL_ORIGIN`].
    pub fn spawn_watcher(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                ticker.tick().await;
                if let Err(err) = store.detect_external_changes() {
                    warn!("session store watcher: {err}");
                }
            }
        })
    }

    /// Compares the file with the last known state and broadcasts the keys
    /// that differ. Returns how many keys changed.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn detect_external_changes(&self) -> Result<usize, StoreError> {
        let mut snapshot = self.io.lock().unwrap_or_else(PoisonError::into_inner);
        let current = load(&self.path)?;
        let changed = changed_keys(&snapshot, &current);
        *snapshot = current;
        drop(snapshot);

        self.broadcast(&changed, EXTERNAL_ORIGIN);
        Ok(changed.len())
    }

    fn broadcast(&self, keys: &[String], origin: Origin) {
        for key in keys {
            if origin == EXTERNAL_ORIGIN {
                debug!("external change to {key}");
            }
            let _ = self.events.send(StorageEvent {
                key: key.clone(),
                origin,
            });
        }
    }
}

fn changed_keys(before: &Entries, after: &Entries) -> Vec<String> {
    let keys: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
    keys.into_iter()
        .filter(|key| before.get(*key) != after.get(*key))
        .cloned()
        .collect()
}

fn load(path: &Path) -> Result<Entries, StoreError> {
    match fs::read(path) {
        Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Entries::new()),
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map_err(|err| StoreError::Corrupt(format!("{}: {err}", path.display()))),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Entries::new()),
        Err(err) => Err(err.into()),
    }
}

fn persist(path: &Path, entries: &Entries) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(entries)
        .map_err(|err| StoreError::Serialization(err.to_string()))?;

    // Unique per writer so concurrent processes never share a temp file.
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(format!(".{}.{}.tmp", std::process::id(), Ulid::new()));
    let tmp = PathBuf::from(tmp);

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let written = options.open(&tmp).and_then(|mut file| {
        file.write_all(&json)?;
        file.sync_all()
    });
    if let Err(err) = written.and_then(|()| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(err.into());
    }
    Ok(())
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _snapshot = self.io.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(load(&self.path)?.get(key).cloned())
    }

    fn apply(&self, ops: Vec<StoreOp>) -> Result<(), StoreError> {
        let mut snapshot = self.io.lock().unwrap_or_else(PoisonError::into_inner);

        // Start from disk so concurrent writers are not clobbered, and report
        // what they changed before our own keys.
        let mut entries = load(&self.path)?;
        let external = changed_keys(&snapshot, &entries);

        let mut changed = Vec::new();
        for op in ops {
            match op {
                StoreOp::Set(key, value) => {
                    if entries.get(&key) != Some(&value) {
                        changed.push(key.clone());
                        entries.insert(key, value);
                    }
                }
                StoreOp::Remove(key) => {
                    if entries.remove(&key).is_some() {
                        changed.push(key);
                    }
                }
            }
        }

        if !changed.is_empty() {
            persist(&self.path, &entries)?;
        }
        *snapshot = entries;
        drop(snapshot);

        self.broadcast(&external, EXTERNAL_ORIGIN);
        self.broadcast(&changed, FILE_ORIGIN);
        Ok(())
    }

    fn origin(&self) -> Origin {
        FILE_ORIGIN
    }

    fn watch(&self) -> broadcast::Receiver<StorageEvent> {
        self.events.subscribe()
    }
}

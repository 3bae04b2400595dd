use anyhow::{Context, Result, anyhow};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock, Mutex};

use crate::paths;

const STORE_FILE_NAME: &str = "store.json";

// One lock per store file, shared by every handle in the process.
static FILE_LOCKS: LazyLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Receives the current value of a key and returns its replacement, or `None`
/// to leave the key as it is.
pub type Update<'a> = &'a mut dyn FnMut(Option<&Value>) -> Option<Value>;

/// Local key/value persistence for the credential, usage counters and history.
/// Last write wins.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, keys: &[&str]) -> Result<Map<String, Value>>;
    fn set(&self, items: Map<String, Value>) -> Result<()>;
    fn remove(&self, keys: &[&str]) -> Result<()>;
    /// Read-modify-write of a single key, atomic with respect to every other
    /// operation on the same store.
    fn update(&self, key: &str, apply: Update<'_>) -> Result<()>;
}

/// One JSON object on disk. A missing file reads as empty.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let path = std::path::absolute(&path).unwrap_or(path);
        let lock = FILE_LOCKS
            .lock()
            .map(|mut locks| locks.entry(path.clone()).or_default().clone())
            .unwrap_or_default();
        Self { path, lock }
    }

    pub fn open_default() -> Result<Self> {
        let dir = paths::base_dir().ok_or_else(|| anyhow!("HOME is not set"))?;
        Ok(Self::new(dir.join(STORE_FILE_NAME)))
    }

    fn read_all(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read store: {}", self.path.display()))?;
        if content.trim().is_empty() {
            return Ok(Map::new());
        }
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse store: {}", self.path.display()))
    }

    fn write_all(&self, items: &Map<String, Value>) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create store dir: {}", dir.display()))?;
        }
        let content = serde_json::to_string_pretty(items)?;
        fs::write(&self.path, content)
            .with_context(|| format!("failed to write store: {}", self.path.display()))
    }

    fn locked<T>(&self, func: impl FnOnce() -> Result<T>) -> Result<T> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow!("store lock poisoned"))?;
        func()
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, keys: &[&str]) -> Result<Map<String, Value>> {
        self.locked(|| {
            let all = self.read_all()?;
            Ok(pick(&all, keys))
        })
    }

    fn set(&self, items: Map<String, Value>) -> Result<()> {
        self.locked(|| {
            let mut all = self.read_all()?;
            all.extend(items);
            self.write_all(&all)
        })
    }

    fn remove(&self, keys: &[&str]) -> Result<()> {
        self.locked(|| {
            let mut all = self.read_all()?;
            for key in keys {
                all.remove(*key);
            }
            self.write_all(&all)
        })
    }

    fn update(&self, key: &str, apply: Update<'_>) -> Result<()> {
        self.locked(|| {
            let mut all = self.read_all()?;
            match apply(all.get(key)) {
                Some(value) => {
                    all.insert(key.to_string(), value);
                    self.write_all(&all)
                }
                None => Ok(()),
            }
        })
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<Map<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, keys: &[&str]) -> Result<Map<String, Value>> {
        let items = self
            .items
            .lock()
            .map_err(|_| anyhow!("store lock poisoned"))?;
        Ok(pick(&items, keys))
    }

    fn set(&self, incoming: Map<String, Value>) -> Result<()> {
        let mut items = self
            .items
            .lock()
            .map_err(|_| anyhow!("store lock poisoned"))?;
        items.extend(incoming);
        Ok(())
    }

    fn remove(&self, keys: &[&str]) -> Result<()> {
        let mut items = self
            .items
            .lock()
            .map_err(|_| anyhow!("store lock poisoned"))?;
        for key in keys {
            items.remove(*key);
        }
        Ok(())
    }

    fn update(&self, key: &str, apply: Update<'_>) -> Result<()> {
        let mut items = self
            .items
            .lock()
            .map_err(|_| anyhow!("store lock poisoned"))?;
        if let Some(value) = apply(items.get(key)) {
            items.insert(key.to_string(), value);
        }
        Ok(())
    }
}

fn pick(all: &Map<String, Value>, keys: &[&str]) -> Map<String, Value> {
    keys.iter()
        .filter_map(|key| all.get(*key).map(|value| (key.to_string(), value.clone())))
        .collect()
}

pub(crate) fn get_one(store: &dyn KeyValueStore, key: &str) -> Result<Option<Value>> {
    let mut found = store.get(&[key])?;
    Ok(found.remove(key))
}

pub(crate) fn set_one(store: &dyn KeyValueStore, key: &str, value: Value) -> Result<()> {
    let mut items = Map::new();
    items.insert(key.to_string(), value);
    store.set(items)
}

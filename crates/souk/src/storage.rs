// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable key/value storage shared by credentials and conversation caches.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

/// String key/value storage.
pub trait Store: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
    fn remove(&self, key: &str) -> anyhow::Result<()>;
}

/// One file per key under a directory, written atomically (write tmp + rename).
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> anyhow::Result<PathBuf> {
        let valid = !key.is_empty()
            && key.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            && !key.starts_with('.');
        if !valid {
            anyhow::bail!("invalid storage key: {key:?}");
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl Store for FileStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Uses a unique temp filename (PID + counter) so concurrent writers to
    /// the same key never share a `.tmp` file.
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        use std::sync::atomic::{AtomicU32, Ordering};
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        let path = self.path_for(key)?;
        let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp_path = self.dir.join(format!("{key}.{}.{seq}.tmp", std::process::id()));
        std::fs::write(&tmp_path, value)?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.entries.lock().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
#[path = "storage_tests.rs"]
mod tests;

//! Tiny key-value store backed by one JSON object on disk. The terminal
//! stand-in for the full game's persistent storage: cross-session score,
//! campaign progress and settings all go through `get`/`set`.

use std::{
    fs::File,
    io::{self, Read, Write},
    path::PathBuf,
};

use serde_json::{Map, Value};

#[derive(Debug)]
pub struct Store {
    path: PathBuf,
    values: Map<String, Value>,
}

impl Store {
    /// Opens the store at `path`; a missing or unreadable file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = Self::load(&path).unwrap_or_default();
        Store { path, values }
    }

    fn load(path: &PathBuf) -> io::Result<Map<String, Value>> {
        let mut file = File::open(path)?;
        let mut raw = String::new();
        file.read_to_string(&mut raw)?;
        let values = serde_json::from_str(&raw)?;
        Ok(values)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    pub fn save(&self) -> io::Result<()> {
        let raw = serde_json::to_string(&self.values)?;
        let mut file = File::create(&self.path)?;
        file.write_all(raw.as_bytes())?;
        Ok(())
    }
}

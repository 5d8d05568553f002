use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::error::{CoreError, CoreResult};
use crate::traits::DocumentStore;
use crate::types::{DocPath, Document};

/// In-memory document store.
///
/// Used by tests and by the CLI, which loads and saves it as a JSON
/// snapshot (`{ "<path>": { ...body } }`).
pub struct InMemoryStore {
    docs: Mutex<BTreeMap<DocPath, Document>>,
}

fn lock_docs(
    mutex: &Mutex<BTreeMap<DocPath, Document>>,
) -> CoreResult<MutexGuard<'_, BTreeMap<DocPath, Document>>> {
    mutex
        .lock()
        .map_err(|e| CoreError::Storage(format!("lock poisoned: {}", e)))
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            docs: Mutex::new(BTreeMap::new()),
        }
    }

    /// Build a store from a JSON snapshot object.
    pub fn from_snapshot(snapshot: &serde_json::Value) -> CoreResult<Self> {
        let entries = snapshot.as_object().ok_or_else(|| {
            CoreError::Serialization("snapshot must be a JSON object".to_string())
        })?;
        let mut docs = BTreeMap::new();
        for (raw_path, body) in entries {
            let path = DocPath::parse(raw_path)?;
            let body = body.as_object().cloned().ok_or_else(|| {
                CoreError::Serialization(format!("document at '{}' is not an object", raw_path))
            })?;
            docs.insert(path, body);
        }
        Ok(Self {
            docs: Mutex::new(docs),
        })
    }

    /// Dump every document as a JSON snapshot object.
    pub fn snapshot(&self) -> CoreResult<serde_json::Value> {
        let docs = lock_docs(&self.docs)?;
        let map: serde_json::Map<String, serde_json::Value> = docs
            .iter()
            .map(|(path, body)| (path.to_string(), serde_json::Value::Object(body.clone())))
            .collect();
        Ok(serde_json::Value::Object(map))
    }

    /// Load a snapshot file. A missing file yields an empty store.
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Storage(format!("failed to read snapshot: {}", e)))?;
        let value: serde_json::Value = serde_json::from_str(&contents)?;
        Self::from_snapshot(&value)
    }

    pub fn save(&self, path: &Path) -> CoreResult<()> {
        let json = serde_json::to_string_pretty(&self.snapshot()?)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CoreError::Storage(format!("failed to create directory: {}", e)))?;
        }
        std::fs::write(path, json)
            .map_err(|e| CoreError::Storage(format!("failed to write snapshot: {}", e)))
    }

    pub fn count(&self) -> usize {
        lock_docs(&self.docs).map(|d| d.len()).unwrap_or(0)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for InMemoryStore {
    fn get(&self, path: &DocPath) -> CoreResult<Option<Document>> {
        let docs = lock_docs(&self.docs)?;
        Ok(docs.get(path).cloned())
    }

    fn set(&self, path: &DocPath, body: Document) -> CoreResult<()> {
        let mut docs = lock_docs(&self.docs)?;
        docs.insert(path.clone(), body);
        Ok(())
    }

    fn delete(&self, path: &DocPath) -> CoreResult<bool> {
        let mut docs = lock_docs(&self.docs)?;
        Ok(docs.remove(path).is_some())
    }

    fn compare_and_swap(
        &self,
        path: &DocPath,
        expected: Option<&Document>,
        body: Document,
    ) -> CoreResult<bool> {
        let mut docs = lock_docs(&self.docs)?;
        if docs.get(path) != expected {
            return Ok(false);
        }
        docs.insert(path.clone(), body);
        Ok(true)
    }

    fn compare_and_delete(
        &self,
        path: &DocPath,
        expected: Option<&Document>,
    ) -> CoreResult<bool> {
        let mut docs = lock_docs(&self.docs)?;
        if docs.get(path) != expected {
            return Ok(false);
        }
        docs.remove(path);
        Ok(true)
    }
}

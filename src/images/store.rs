//! File store boundary used for image payloads.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::FlowError;
use crate::types::StoredFileRef;

/// External blob storage holding uploaded and generated files.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Read the bytes of a stored file.
    async fn load(&self, chat_id: Option<&str>, name: &str) -> Result<Vec<u8>, FlowError>;

    /// Store bytes under `name` and return the reference to persist.
    async fn save(
        &self,
        chat_id: Option<&str>,
        name: &str,
        bytes: Vec<u8>,
        mime: &str,
    ) -> Result<StoredFileRef, FlowError>;
}

/// Process-local store, keyed by chat and file name.
#[derive(Debug, Default)]
pub struct InMemoryFileStore {
    files: RwLock<HashMap<(String, String), Vec<u8>>>,
}

impl InMemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file, as an upload handler would.
    pub fn insert(&self, chat_id: Option<&str>, name: &str, bytes: Vec<u8>) {
        if let Ok(mut files) = self.files.write() {
            files.insert(key(chat_id, name), bytes);
        }
    }

    pub fn contains(&self, chat_id: Option<&str>, name: &str) -> bool {
        self.files
            .read()
            .map(|files| files.contains_key(&key(chat_id, name)))
            .unwrap_or(false)
    }
}

fn key(chat_id: Option<&str>, name: &str) -> (String, String) {
    (chat_id.unwrap_or_default().to_string(), name.to_string())
}

#[async_trait]
impl FileStore for InMemoryFileStore {
    async fn load(&self, chat_id: Option<&str>, name: &str) -> Result<Vec<u8>, FlowError> {
        let files = self
            .files
            .read()
            .map_err(|_| FlowError::FileStore("file store lock poisoned".into()))?;
        files
            .get(&key(chat_id, name))
            .cloned()
            .ok_or_else(|| FlowError::FileStore(format!("file not found: {name}")))
    }

    async fn save(
        &self,
        chat_id: Option<&str>,
        name: &str,
        bytes: Vec<u8>,
        mime: &str,
    ) -> Result<StoredFileRef, FlowError> {
        let mut files = self
            .files
            .write()
            .map_err(|_| FlowError::FileStore("file store lock poisoned".into()))?;
        files.insert(key(chat_id, name), bytes);
        Ok(StoredFileRef::stored(name, mime))
    }
}

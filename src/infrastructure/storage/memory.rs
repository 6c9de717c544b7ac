use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;

use super::{ObjectMeta, ObjectStore, StorageError, StorageResult};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: String,
}

#[derive(Debug, Default)]
struct Inner {
    objects: BTreeMap<String, StoredObject>,
    fail_writes: Vec<String>,
    fail_reads: Vec<String>,
}

/// In-memory object store with prefix-based failure injection.
///
/// Clones share the same underlying map, so a test can keep a handle while the
/// application owns another.
#[derive(Debug, Clone, Default)]
pub struct InMemoryObjectStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every put/delete under `prefix` fail until cleared.
    pub fn fail_writes_under(&self, prefix: impl Into<String>) {
        self.lock().fail_writes.push(prefix.into());
    }

    /// Makes every get/head/list under `prefix` fail until cleared.
    pub fn fail_reads_under(&self, prefix: impl Into<String>) {
        self.lock().fail_reads.push(prefix.into());
    }

    pub fn clear_failures(&self) {
        let mut inner = self.lock();
        inner.fail_writes.clear();
        inner.fail_reads.clear();
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().objects.keys().cloned().collect()
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.lock().objects.get(key).map(|o| o.data.clone())
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.lock().objects.get(key).map(|o| o.content_type.clone())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking test thread must not wedge the others.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check(rules: &[String], key: &str) -> StorageResult<()> {
        if rules.iter().any(|prefix| key.starts_with(prefix.as_str())) {
            return Err(StorageError::Backend(format!("injected failure for {}", key)));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> StorageResult<()> {
        let mut inner = self.lock();
        Self::check(&inner.fail_writes, key)?;
        inner.objects.insert(
            key.to_string(),
            StoredObject {
                data: body,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn get_object(&self, key: &str) -> StorageResult<Bytes> {
        let inner = self.lock();
        Self::check(&inner.fail_reads, key)?;
        inner
            .objects
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn head_object(&self, key: &str) -> StorageResult<Option<ObjectMeta>> {
        let inner = self.lock();
        Self::check(&inner.fail_reads, key)?;
        Ok(inner.objects.get(key).map(|o| ObjectMeta {
            key: key.to_string(),
            size: o.data.len() as u64,
            content_type: Some(o.content_type.clone()),
        }))
    }

    async fn list_keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let inner = self.lock();
        Self::check(&inner.fail_reads, prefix)?;
        Ok(inner
            .objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn delete_object(&self, key: &str) -> StorageResult<()> {
        let mut inner = self.lock();
        Self::check(&inner.fail_writes, key)?;
        inner.objects.remove(key);
        Ok(())
    }

    async fn ping(&self) -> StorageResult<()> {
        let inner = self.lock();
        Self::check(&inner.fail_reads, "")
    }
}

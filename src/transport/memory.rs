//! In-memory transport with failure injection.
//!
//! Backs the engine tests and library users that want to drive a sync
//! without a network: files live in a map, individual paths can be made to
//! fail, and the session can be expired after a number of operations.

use super::{RemoteEntry, Transport};
use crate::hash::hash_bytes;
use crate::types::{RelPath, TransportError, TransportErrorKind};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Default)]
struct Inner {
    files: BTreeMap<String, Vec<u8>>,
    failures: HashMap<String, TransportErrorKind>,
    listing_failure: Option<TransportErrorKind>,
}

/// Remote project held in memory.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    inner: Mutex<Inner>,
    /// Operations allowed before every call fails with `AuthExpired`
    expire_after: Mutex<Option<usize>>,
    calls: AtomicUsize,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed (or overwrite) a remote file.
    pub fn put(&self, path: &str, content: &[u8]) {
        self.lock().files.insert(path.to_string(), content.to_vec());
    }

    pub fn remove(&self, path: &str) {
        self.lock().files.remove(path);
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().files.get(path).cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        self.lock().files.keys().cloned().collect()
    }

    /// Make every download/upload/delete of `path` fail with `kind`.
    pub fn fail_path(&self, path: &str, kind: TransportErrorKind) {
        self.lock().failures.insert(path.to_string(), kind);
    }

    pub fn clear_failures(&self) {
        let mut inner = self.lock();
        inner.failures.clear();
        inner.listing_failure = None;
    }

    pub fn fail_listing(&self, kind: TransportErrorKind) {
        self.lock().listing_failure = Some(kind);
    }

    /// Allow `calls` more operations, then report the session as expired.
    pub fn expire_session_after(&self, calls: usize) {
        let already = self.calls.load(Ordering::SeqCst);
        if let Ok(mut guard) = self.expire_after.lock() {
            *guard = Some(already + calls);
        }
    }

    /// Number of transport operations issued so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A panicking test thread must not hide the state from the others.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn begin(&self, path: Option<&RelPath>) -> Result<(), TransportError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let limit = self.expire_after.lock().ok().and_then(|guard| *guard);
        if limit.is_some_and(|limit| call >= limit) {
            let err = TransportError::auth_expired("session expired");
            return Err(match path {
                Some(path) => err.at(path.as_str()),
                None => err,
            });
        }

        if let Some(path) = path {
            if let Some(kind) = self.lock().failures.get(path.as_str()).copied() {
                return Err(TransportError::new(kind, "injected failure").at(path.as_str()));
            }
        }
        Ok(())
    }
}

impl Transport for MemoryTransport {
    fn list_remote_files(&self) -> Result<Vec<RemoteEntry>, TransportError> {
        self.begin(None)?;
        let inner = self.lock();
        if let Some(kind) = inner.listing_failure {
            return Err(TransportError::new(kind, "injected listing failure"));
        }
        Ok(inner
            .files
            .iter()
            .map(|(path, content)| {
                RemoteEntry::with_fingerprint(path.clone(), hash_bytes(content), content.len() as u64)
            })
            .collect())
    }

    fn download(&self, path: &RelPath) -> Result<Vec<u8>, TransportError> {
        self.begin(Some(path))?;
        self.lock()
            .files
            .get(path.as_str())
            .cloned()
            .ok_or_else(|| TransportError::not_found("no such remote file").at(path.as_str()))
    }

    fn upload(&self, path: &RelPath, content: &[u8]) -> Result<(), TransportError> {
        self.begin(Some(path))?;
        self.lock()
            .files
            .insert(path.as_str().to_string(), content.to_vec());
        Ok(())
    }

    fn delete_remote(&self, path: &RelPath) -> Result<(), TransportError> {
        self.begin(Some(path))?;
        match self.lock().files.remove(path.as_str()) {
            Some(_) => Ok(()),
            None => Err(TransportError::not_found("no such remote file").at(path.as_str())),
        }
    }
}

//! In-memory stand-ins for the provider, media sources and object store.

use crate::dashscope::{JobKind, TaskApi};
use crate::error::{GenerationError, StorageError};
use crate::relay::{MediaSource, MediaStream};
use crate::storage::ObjectStore;
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Replays queued submit results and status documents. Once the status queue
/// is empty every query reports `RUNNING`.
pub struct ScriptedProvider {
    submit_results: Mutex<VecDeque<Result<String, GenerationError>>>,
    statuses: Mutex<VecDeque<Result<Value, GenerationError>>>,
    payloads: Mutex<Vec<Value>>,
    pub submits: AtomicU32,
    pub queries: AtomicU32,
}

impl ScriptedProvider {
    pub fn new(
        submit_results: Vec<Result<String, GenerationError>>,
        statuses: Vec<Result<Value, GenerationError>>,
    ) -> Self {
        Self {
            submit_results: Mutex::new(submit_results.into()),
            statuses: Mutex::new(statuses.into()),
            payloads: Mutex::new(Vec::new()),
            submits: AtomicU32::new(0),
            queries: AtomicU32::new(0),
        }
    }

    pub fn submitted_payloads(&self) -> Vec<Value> {
        self.payloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskApi for ScriptedProvider {
    async fn submit(&self, _kind: JobKind, payload: &Value) -> Result<String, GenerationError> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        self.payloads.lock().unwrap().push(payload.clone());
        self.submit_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GenerationError::TransientProvider("no scripted submit".into())))
    }

    async fn task_status(&self, _task_id: &str) -> Result<Value, GenerationError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(json!({"output": {"task_status": "RUNNING"}})))
    }
}

/// Serves fixed bytes for known URLs and fails for everything else.
#[derive(Default)]
pub struct StaticSource {
    items: HashMap<String, (Bytes, String)>,
    pub calls: AtomicU32,
}

impl StaticSource {
    pub fn with(url: &str, bytes: &'static [u8], content_type: &str) -> Self {
        Self::default().and(url, bytes, content_type)
    }

    pub fn and(mut self, url: &str, bytes: &'static [u8], content_type: &str) -> Self {
        self.items.insert(
            url.to_string(),
            (Bytes::from_static(bytes), content_type.to_string()),
        );
        self
    }
}

#[async_trait]
impl MediaSource for StaticSource {
    async fn open(&self, url: &str) -> Result<MediaStream, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.items.get(url) {
            Some((bytes, content_type)) => Ok(MediaStream::from_bytes(bytes.clone(), content_type.clone())),
            None => Err(GenerationError::MediaFetch {
                url: url.to_string(),
                reason: "404 Not Found".into(),
            }),
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, (Bytes, String)>>,
    reject: bool,
    pub puts: AtomicUsize,
}

impl MemoryStore {
    /// Refuses every upload as a policy violation.
    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn get(&self, key: &str) -> Option<(Bytes, String)> {
        self.objects.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.objects.lock().unwrap().contains_key(key))
    }

    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), StorageError> {
        if self.reject {
            return Err(StorageError::PolicyRejected("new row violates row-level security policy".into()));
        }
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (data, content_type.to_string()));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("https://storage.test/cat-media/{}", key)
    }
}

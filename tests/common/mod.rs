#![allow(dead_code)]

use async_trait::async_trait;
use axum::{body::Body, http::Request, Extension, Router};
use bytes::Bytes;
use catkeeper_server::api::{self, middleware::SESSION_COOKIE, Services};
use catkeeper_server::cache::LocalCache;
use catkeeper_server::dashscope::{JobKind, TaskApi};
use catkeeper_server::entities::{cat, user, video_interaction};
use catkeeper_server::error::{GenerationError, StorageError};
use catkeeper_server::generator::Generator;
use catkeeper_server::migrator::Migrator;
use catkeeper_server::relay::{MediaRelay, MediaSource, MediaStream};
use catkeeper_server::retry::{PollPolicy, SubmitPolicy};
use catkeeper_server::storage::ObjectStore;
use http_body_util::BodyExt;
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};
use sea_orm_migration::MigratorTrait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tower_cookies::{cookie::CookieJar, Cookie, Key};
use uuid::Uuid;

pub const RESULT_URL: &str = "https://dashscope-result-bj.oss-cn-beijing.aliyuncs.com/x/cat.png?Expires=1";
pub const VIDEO_URL: &str = "https://dashscope-result-sh.oss-cn-shanghai.aliyuncs.com/x/cat.mp4?Expires=1";

pub struct FakeProvider {
    task_id: Option<String>,
    statuses: Mutex<VecDeque<Value>>,
    pub submits: AtomicU32,
}

impl FakeProvider {
    pub fn new(task_id: Option<&str>, statuses: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            task_id: task_id.map(str::to_string),
            statuses: Mutex::new(statuses.into()),
            submits: AtomicU32::new(0),
        })
    }

    pub fn idle() -> Arc<Self> {
        Self::new(None, vec![])
    }

    pub fn submit_count(&self) -> u32 {
        self.submits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskApi for FakeProvider {
    async fn submit(&self, _kind: JobKind, _payload: &Value) -> Result<String, GenerationError> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        self.task_id
            .clone()
            .ok_or_else(|| GenerationError::TransientProvider("submit returned 503 - busy".into()))
    }

    async fn task_status(&self, _task_id: &str) -> Result<Value, GenerationError> {
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| json!({"output": {"task_status": "RUNNING"}})))
    }
}

#[derive(Default)]
pub struct FakeSource {
    items: HashMap<String, (&'static [u8], &'static str)>,
}

impl FakeSource {
    pub fn serving(url: &str, bytes: &'static [u8], content_type: &'static str) -> Self {
        let mut items = HashMap::new();
        items.insert(url.to_string(), (bytes, content_type));
        Self { items }
    }
}

#[async_trait]
impl MediaSource for FakeSource {
    async fn open(&self, url: &str) -> Result<MediaStream, GenerationError> {
        match self.items.get(url) {
            Some((bytes, content_type)) => Ok(MediaStream::from_bytes(Bytes::from_static(bytes), *content_type)),
            None => Err(GenerationError::MediaFetch {
                url: url.to_string(),
                reason: "connection refused".into(),
            }),
        }
    }
}

#[derive(Default)]
pub struct FakeStore {
    objects: Mutex<HashMap<String, Bytes>>,
}

impl FakeStore {
    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn seed(&self, key: &str, data: &'static [u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), Bytes::from_static(data));
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.contains(key))
    }

    async fn put(&self, key: &str, data: Bytes, _content_type: &str) -> Result<(), StorageError> {
        self.objects.lock().unwrap().insert(key.to_string(), data);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("https://storage.test/{}", key)
    }
}

pub struct TestApp {
    pub router: Router,
    pub provider: Arc<FakeProvider>,
    pub store: Arc<FakeStore>,
    pub db: DatabaseConnection,
    pub session_key: Key,
    _cache_dir: TempDir,
}

/// Full router over an in-memory SQLite database with the real migrations applied.
pub async fn test_app(provider: Arc<FakeProvider>, source: FakeSource) -> TestApp {
    let poll = PollPolicy {
        interval: Duration::from_millis(1),
        max_attempts: 3,
        query_timeout: Duration::from_millis(50),
    };
    let generator = Generator::new(
        provider.clone(),
        SubmitPolicy {
            max_retries: 2,
            backoff_base: Duration::from_millis(1),
        },
        poll,
        poll,
    );
    let store = Arc::new(FakeStore::default());
    let relay = MediaRelay::new(Arc::new(source), store.clone());
    let cache_dir = tempfile::tempdir().unwrap();
    let cache = LocalCache::open(cache_dir.path()).await.unwrap();

    let db = Database::connect("sqlite::memory:").await.unwrap();
    Migrator::up(&db, None).await.unwrap();

    let session_key = Key::generate();
    let router = api::app(Services {
        generator: Arc::new(generator),
        relay: Arc::new(relay),
        cache,
        session_key: session_key.clone(),
    })
    .layer(Extension(db.clone()));

    TestApp {
        router,
        provider,
        store,
        db,
        session_key,
        _cache_dir: cache_dir,
    }
}

impl TestApp {
    /// `Cookie` header value for an authenticated session.
    pub fn session_for(&self, user_id: i32) -> String {
        let mut jar = CookieJar::new();
        jar.signed_mut(&self.session_key)
            .add(Cookie::new(SESSION_COOKIE, user_id.to_string()));
        let cookie = jar.get(SESSION_COOKIE).unwrap();
        format!("{}={}", cookie.name(), cookie.value())
    }

    /// Inserts a user directly; the stored hash never verifies.
    pub async fn seed_user(&self, email: &str) -> i32 {
        let now = chrono::Utc::now().naive_utc();
        user::ActiveModel {
            email: Set(email.to_string()),
            password_hash: Set("not-a-real-hash".to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.db)
        .await
        .unwrap()
        .id
    }

    pub async fn seed_cat(&self, owner_id: i32, name: &str) -> cat::Model {
        let id = Uuid::new_v4();
        cat::ActiveModel {
            id: Set(id),
            owner_id: Set(owner_id),
            name: Set(name.to_string()),
            breed: Set("siamese".to_string()),
            age_bracket: Set("adult".to_string()),
            gender: Set("male".to_string()),
            image_url: Set(format!("https://storage.test/cat-images/cat_{}.png", id)),
            created_at: Set(chrono::Utc::now().fixed_offset()),
        }
        .insert(&self.db)
        .await
        .unwrap()
    }

    pub async fn seed_video(&self, cat: &cat::Model) -> video_interaction::Model {
        video_interaction::ActiveModel {
            id: Set(Uuid::new_v4()),
            cat_id: Set(cat.id),
            owner_id: Set(cat.owner_id),
            prompt_text: Set("打哈欠".to_string()),
            video_url: Set("https://storage.test/cat-videos/old.mp4".to_string()),
            status: Set("completed".to_string()),
            created_at: Set(chrono::Utc::now().fixed_offset()),
        }
        .insert(&self.db)
        .await
        .unwrap()
    }
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn with_session(mut request: Request<Body>, cookie: &str) -> Request<Body> {
    request
        .headers_mut()
        .insert("cookie", cookie.parse().unwrap());
    request
}

pub fn get_as(uri: &str, cookie: &str) -> Request<Body> {
    with_session(Request::get(uri).body(Body::empty()).unwrap(), cookie)
}

pub fn delete_as(uri: &str, cookie: &str) -> Request<Body> {
    with_session(
        Request::delete(uri).body(Body::empty()).unwrap(),
        cookie,
    )
}

pub async fn body_bytes(response: axum::response::Response) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

pub async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

#![allow(dead_code)]

use async_trait::async_trait;
use relief_sync::application::ports::{EntityStore, RemoteApi, RemoteError};
use relief_sync::application::services::{Reconciler, ReconcilerOptions, RecordService};
use relief_sync::domain::entities::{Disaster, DisasterVictim};
use relief_sync::domain::sync::RetryPolicy;
use relief_sync::domain::value_objects::EntityType;
use relief_sync::infrastructure::{ConnectionPool, FileImageStore, SqliteEntityStore};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    Create { entity_type: EntityType, body: Value },
    Update { entity_type: EntityType, id: String, body: Value },
    Delete { entity_type: EntityType, id: String },
    Fetch { entity_type: EntityType, id: String },
}

/// Remote API double answering from a script. Unscripted creates echo a
/// generated id; unscripted updates and deletes succeed.
#[derive(Default)]
pub struct FakeRemote {
    script: Mutex<VecDeque<Result<Value, RemoteError>>>,
    calls: Mutex<Vec<RemoteCall>>,
    fetched: Mutex<Option<Value>>,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, response: Result<Value, RemoteError>) {
        self.script.lock().unwrap().push_back(response);
    }

    pub fn respond_times(&self, times: usize, response: Result<Value, RemoteError>) {
        for _ in 0..times {
            self.respond(response.clone());
        }
    }

    pub fn serve_fetch(&self, payload: Value) {
        *self.fetched.lock().unwrap() = Some(payload);
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn next(&self, call: RemoteCall) -> Option<Result<Value, RemoteError>> {
        self.calls.lock().unwrap().push(call);
        self.script.lock().unwrap().pop_front()
    }
}

#[async_trait]
impl RemoteApi for FakeRemote {
    async fn create(&self, entity_type: EntityType, body: Value) -> Result<Value, RemoteError> {
        let call = RemoteCall::Create {
            entity_type,
            body: body.clone(),
        };
        match self.next(call) {
            Some(response) => response,
            None => Ok(json!({"id": format!("srv-{}", self.call_count())})),
        }
    }

    async fn update(
        &self,
        entity_type: EntityType,
        id: &str,
        body: Value,
    ) -> Result<Value, RemoteError> {
        let call = RemoteCall::Update {
            entity_type,
            id: id.to_string(),
            body,
        };
        match self.next(call) {
            Some(response) => response,
            None => Ok(json!({"id": id})),
        }
    }

    async fn delete(&self, entity_type: EntityType, id: &str) -> Result<(), RemoteError> {
        let call = RemoteCall::Delete {
            entity_type,
            id: id.to_string(),
        };
        match self.next(call) {
            Some(response) => response.map(|_| ()),
            None => Ok(()),
        }
    }

    async fn fetch(&self, entity_type: EntityType, id: &str) -> Result<Option<Value>, RemoteError> {
        self.calls.lock().unwrap().push(RemoteCall::Fetch {
            entity_type,
            id: id.to_string(),
        });
        Ok(self.fetched.lock().unwrap().clone())
    }
}

pub struct SyncHarness {
    pub store: Arc<SqliteEntityStore>,
    pub remote: Arc<FakeRemote>,
    pub reconciler: Reconciler,
    pub records: RecordService,
    _dir: TempDir,
}

pub fn test_options() -> ReconcilerOptions {
    ReconcilerOptions {
        retry_policy: RetryPolicy::immediate(5),
        request_timeout: Duration::from_secs(5),
        concurrency: 4,
    }
}

pub async fn setup_harness() -> SyncHarness {
    setup_harness_with(test_options()).await
}

pub async fn setup_harness_with(options: ReconcilerOptions) -> SyncHarness {
    let pool = ConnectionPool::from_memory().await.expect("in-memory sqlite");
    let store = Arc::new(SqliteEntityStore::new(pool));
    store.initialize().await.expect("migrations");

    let dir = TempDir::new().expect("tempdir");
    let images = Arc::new(
        FileImageStore::new(dir.path().join("images"))
            .await
            .expect("image store"),
    );
    let remote = FakeRemote::new();

    let entity_store: Arc<dyn EntityStore> = store.clone();
    let reconciler = Reconciler::new(entity_store.clone(), remote.clone(), options)
        .with_image_store(images.clone());
    let records = RecordService::new(entity_store, remote.clone(), images);

    SyncHarness {
        store,
        remote,
        reconciler,
        records,
        _dir: dir,
    }
}

pub fn sample_disaster() -> Disaster {
    Disaster {
        title: "Banjir Bandung".into(),
        description: "River overflow in the south district".into(),
        disaster_type: "flood".into(),
        location: "Bandung".into(),
        latitude: Some(-6.91),
        longitude: Some(107.61),
        status: "ACTIVE".into(),
        occurred_at: 1_700_000_000_000,
    }
}

pub fn remote_disaster(id: &str) -> Value {
    json!({
        "id": id,
        "title": "Banjir Bandung",
        "description": "River overflow in the south district",
        "disasterType": "flood",
        "location": "Bandung",
        "status": "ACTIVE",
        "occurredAt": 1_700_000_000_000i64
    })
}

pub fn sample_victim(disaster_id: &str, name: &str) -> DisasterVictim {
    DisasterVictim {
        disaster_id: disaster_id.into(),
        name: name.into(),
        nik: Some("123".into()),
        condition: "injured".into(),
        age: None,
        gender: None,
        notes: None,
    }
}

pub fn server_error(code: u16) -> Result<Value, RemoteError> {
    Err(RemoteError::Status {
        code,
        body: "server error".into(),
    })
}

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::query_runner::DocumentEngine;

pub const IN_MEMORY_PATH: &str = ":memory:";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BackendError {
    message: String,
}

impl BackendError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionMode {
    #[default]
    Direct,
    Shared,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub path: String,
    pub read_only: bool,
    pub upgrade: bool,
    pub password: Option<String>,
    pub mode: ConnectionMode,
    pub initial_size_mb: u32,
    pub collation: Option<String>,
}

impl ConnectionOptions {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            read_only: false,
            upgrade: false,
            password: None,
            mode: ConnectionMode::Direct,
            initial_size_mb: 0,
            collation: None,
        }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(IN_MEMORY_PATH)
    }

    #[must_use]
    pub fn is_in_memory(&self) -> bool {
        self.path == IN_MEMORY_PATH
    }
}

#[async_trait]
pub trait ConnectionBackend: Send + Sync {
    type Connection: DocumentEngine + 'static;

    async fn open(&self, options: &ConnectionOptions) -> Result<Self::Connection, BackendError>;
    async fn close(&self, connection: &Self::Connection) -> Result<(), BackendError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub path: Option<String>,
    pub read_only: bool,
    pub is_connected: bool,
    pub last_latency: Option<Duration>,
    pub opened_at: Option<SystemTime>,
}

impl ConnectionStatus {
    #[must_use]
    pub fn disconnected() -> Self {
        Self {
            path: None,
            read_only: false,
            is_connected: false,
            last_latency: None,
            opened_at: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConnectionManagerError {
    #[error("database `{active_path}` is already open")]
    AlreadyConnected { active_path: String },
    #[error("the database has not been opened")]
    NotConnected,
    #[error("database backend failed: {0}")]
    Backend(#[source] BackendError),
}

#[derive(Debug)]
struct ActiveConnection<C> {
    options: ConnectionOptions,
    handle: Arc<C>,
}

#[derive(Debug)]
pub struct ConnectionManager<B: ConnectionBackend> {
    backend: B,
    active: Option<ActiveConnection<B::Connection>>,
    last_latency: Option<Duration>,
    opened_at: Option<SystemTime>,
}

impl<B: ConnectionBackend> ConnectionManager<B> {
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            active: None,
            last_latency: None,
            opened_at: None,
        }
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        let Some(active) = &self.active else {
            return ConnectionStatus::disconnected();
        };
        ConnectionStatus {
            path: Some(active.options.path.clone()),
            read_only: active.options.read_only,
            is_connected: active.handle.is_open(),
            last_latency: self.last_latency,
            opened_at: self.opened_at,
        }
    }

    #[must_use]
    pub fn active_options(&self) -> Option<&ConnectionOptions> {
        self.active.as_ref().map(|active| &active.options)
    }

    #[must_use]
    pub fn engine(&self) -> Option<Arc<B::Connection>> {
        self.active.as_ref().map(|active| Arc::clone(&active.handle))
    }

    pub async fn connect(
        &mut self,
        options: ConnectionOptions,
    ) -> Result<Duration, ConnectionManagerError> {
        if let Some(active) = &self.active {
            return Err(ConnectionManagerError::AlreadyConnected {
                active_path: active.options.path.clone(),
            });
        }

        let started_at = Instant::now();
        let handle = self.backend.open(&options).await.map_err(|error| {
            warn!(path = %options.path, %error, "failed to open database");
            ConnectionManagerError::Backend(error)
        })?;

        let latency = started_at.elapsed();
        info!(
            path = %options.path,
            read_only = options.read_only,
            mode = ?options.mode,
            latency_ms = latency.as_millis(),
            "database opened"
        );
        self.last_latency = Some(latency);
        self.opened_at = Some(SystemTime::now());
        self.active = Some(ActiveConnection {
            options,
            handle: Arc::new(handle),
        });

        Ok(latency)
    }

    pub async fn disconnect(&mut self) -> Result<(), ConnectionManagerError> {
        let Some(active) = self.active.take() else {
            return Ok(());
        };

        self.last_latency = None;
        self.opened_at = None;
        self.backend
            .close(&active.handle)
            .await
            .map_err(ConnectionManagerError::Backend)?;
        info!(path = %active.options.path, "database closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::{
        BackendError, ConnectionBackend, ConnectionManager, ConnectionManagerError,
        ConnectionOptions, ConnectionStatus,
    };
    use crate::query_runner::{DocumentEngine, ValueCursor};
    use crate::query_task::ExecutionError;
    use crate::statement_reader::StatementReader;
    use crate::value::{Document, StructuredValue};

    #[derive(Debug, Default)]
    struct FakeBackend {
        close_calls: AtomicUsize,
        fail_open: AtomicUsize,
    }

    #[derive(Debug)]
    struct FakeEngine {
        open: AtomicBool,
    }

    struct EmptyCursor;

    #[async_trait::async_trait]
    impl ValueCursor for EmptyCursor {
        async fn next_value(&mut self) -> Result<Option<StructuredValue>, ExecutionError> {
            Ok(None)
        }
    }

    #[async_trait::async_trait]
    impl DocumentEngine for FakeEngine {
        type Cursor = EmptyCursor;

        fn is_open(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }

        async fn execute_next(
            &self,
            reader: &mut StatementReader,
            _parameters: &mut Document,
        ) -> Result<Self::Cursor, ExecutionError> {
            reader.advance(reader.len());
            Ok(EmptyCursor)
        }
    }

    #[async_trait::async_trait]
    impl ConnectionBackend for FakeBackend {
        type Connection = FakeEngine;

        async fn open(&self, _options: &ConnectionOptions) -> Result<FakeEngine, BackendError> {
            if self.fail_open.load(Ordering::Relaxed) > 0 {
                self.fail_open.fetch_sub(1, Ordering::Relaxed);
                return Err(BackendError::new("file is locked"));
            }
            Ok(FakeEngine {
                open: AtomicBool::new(true),
            })
        }

        async fn close(&self, connection: &FakeEngine) -> Result<(), BackendError> {
            self.close_calls.fetch_add(1, Ordering::Relaxed);
            connection.open.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    fn sample_options() -> ConnectionOptions {
        let mut options = ConnectionOptions::new("/data/app.db");
        options.read_only = true;
        options
    }

    #[tokio::test]
    async fn connect_updates_status_and_exposes_engine() {
        let mut manager = ConnectionManager::new(FakeBackend::default());

        manager
            .connect(sample_options())
            .await
            .expect("connect should succeed");

        let status = manager.status();
        assert!(status.is_connected);
        assert!(status.read_only);
        assert_eq!(status.path.as_deref(), Some("/data/app.db"));
        assert!(status.last_latency.is_some());
        assert!(status.opened_at.is_some());
        assert!(manager.engine().is_some_and(|engine| engine.is_open()));
    }

    #[tokio::test]
    async fn connect_fails_when_already_connected() {
        let mut manager = ConnectionManager::new(FakeBackend::default());
        manager
            .connect(ConnectionOptions::in_memory())
            .await
            .expect("first connect should succeed");

        let err = manager
            .connect(sample_options())
            .await
            .expect_err("second connect should fail");
        assert!(matches!(
            err,
            ConnectionManagerError::AlreadyConnected { ref active_path } if active_path == ":memory:"
        ));
    }

    #[tokio::test]
    async fn disconnect_closes_shared_handles_and_is_idempotent() {
        let mut manager = ConnectionManager::new(FakeBackend::default());
        manager
            .connect(sample_options())
            .await
            .expect("connect should succeed");
        let engine = manager.engine().expect("engine while connected");

        manager
            .disconnect()
            .await
            .expect("disconnect should succeed");
        manager
            .disconnect()
            .await
            .expect("disconnect should stay idempotent");

        assert!(!engine.is_open());
        assert!(manager.engine().is_none());
        assert_eq!(manager.status(), ConnectionStatus::disconnected());
        assert_eq!(manager.backend.close_calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn failed_connect_does_not_set_active_connection() {
        let backend = FakeBackend {
            fail_open: AtomicUsize::new(1),
            ..FakeBackend::default()
        };
        let mut manager = ConnectionManager::new(backend);

        let err = manager
            .connect(sample_options())
            .await
            .expect_err("connect should fail");
        assert!(matches!(err, ConnectionManagerError::Backend(_)));
        assert!(manager.active_options().is_none());
        assert!(!manager.status().is_connected);
    }

    #[test]
    fn in_memory_options_are_recognized() {
        assert!(ConnectionOptions::in_memory().is_in_memory());
        assert!(!sample_options().is_in_memory());
    }
}

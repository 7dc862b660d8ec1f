use crate::error::CoreError;
use crate::events::{Event, EventBus};
use crate::listing::FileEntry;
use parking_lot::Mutex;
use quay_config::RemoteDefaults;
use quay_remote::{FtpBackend, RemoteBackend, RemoteConfig, SftpBackend};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};
use zeroize::Zeroizing;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Protocol {
    Ftp,
    Sftp,
}

impl Protocol {
    pub fn label(&self) -> &'static str {
        match self {
            Protocol::Ftp => "FTP",
            Protocol::Sftp => "SFTP",
        }
    }
}

/// Supplied at connect time, lives only for the session.
#[derive(Clone)]
pub struct ConnectionConfig {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Zeroizing<String>,
}

// Password must never reach a log line or error message.
impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("protocol", &self.protocol)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Clone, Debug, Serialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed(String),
}

#[derive(Clone, Debug)]
pub struct ConnectionInfo {
    pub protocol: String,
    pub message: String,
}

/// Owns the single active remote session. All protocol dispatch
/// happens here; every other component works against the uniform
/// result contract.
pub struct ConnectionManager {
    backend: Mutex<Option<Arc<dyn RemoteBackend>>>,
    state: Mutex<ConnectionState>,
    defaults: RemoteDefaults,
    bus: EventBus,
}

impl ConnectionManager {
    pub fn new(defaults: RemoteDefaults, bus: EventBus) -> Self {
        Self {
            backend: Mutex::new(None),
            state: Mutex::new(ConnectionState::Disconnected),
            defaults,
            bus,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.lock().clone()
    }

    pub fn is_connected(&self) -> bool {
        matches!(*self.state.lock(), ConnectionState::Connected)
    }

    /// Establish a session for `config`, tearing down any prior one
    /// first. A connect attempt never leaves a stale handle behind.
    pub async fn connect(&self, config: ConnectionConfig) -> Result<ConnectionInfo, CoreError> {
        self.release_current().await;
        self.set_state(ConnectionState::Connecting);
        info!(config = ?config, "connecting");

        let remote = RemoteConfig {
            host: config.host.clone(),
            port: config.port,
            username: config.username.clone(),
            password: config.password.clone(),
            connect_timeout_ms: self.defaults.connect_timeout_ms,
            keepalive_interval_secs: self.defaults.keepalive_interval_secs,
        };
        let backend: Result<Arc<dyn RemoteBackend>, anyhow::Error> = match config.protocol {
            Protocol::Sftp => SftpBackend::connect(remote)
                .await
                .map(|b| Arc::new(b) as Arc<dyn RemoteBackend>),
            Protocol::Ftp => FtpBackend::connect(remote)
                .await
                .map(|b| Arc::new(b) as Arc<dyn RemoteBackend>),
        };

        match backend {
            Ok(backend) => Ok(self.install(backend).await),
            Err(err) => {
                let detail = format!("{} connection failed: {err:#}", config.protocol.label());
                error!(host = %config.host, port = config.port, error = %err, "connect failed");
                self.set_state(ConnectionState::Failed(detail.clone()));
                Err(CoreError::Connection(detail))
            }
        }
    }

    /// Install an already-established backend (the simulated variant,
    /// or a test double). Shares the teardown path with `connect`.
    pub async fn connect_with_backend(&self, backend: Arc<dyn RemoteBackend>) -> ConnectionInfo {
        self.release_current().await;
        self.set_state(ConnectionState::Connecting);
        self.install(backend).await
    }

    /// Idempotent; partial cleanup failures are logged, never
    /// returned.
    pub async fn disconnect(&self) -> Result<(), CoreError> {
        self.release_current().await;
        self.set_state(ConnectionState::Disconnected);
        Ok(())
    }

    pub async fn list_remote(&self, path: &str) -> Result<Vec<FileEntry>, CoreError> {
        let backend = self.current()?;
        let entries = backend
            .list(path)
            .await
            .map_err(|e| CoreError::List(format!("{e:#}")))?;
        Ok(entries.into_iter().map(FileEntry::from).collect())
    }

    pub async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<(), CoreError> {
        let backend = self.current()?;
        backend
            .upload(local_path, remote_path)
            .await
            .map_err(|e| CoreError::Transfer(format!("{e:#}")))
    }

    pub async fn download(&self, remote_path: &str, local_path: &Path) -> Result<(), CoreError> {
        let backend = self.current()?;
        backend
            .download(remote_path, local_path)
            .await
            .map_err(|e| CoreError::Transfer(format!("{e:#}")))
    }

    pub async fn mkdir_remote(&self, path: &str) -> Result<(), CoreError> {
        let backend = self.current()?;
        backend
            .mkdir(path)
            .await
            .map_err(|e| CoreError::Remote(format!("{e:#}")))
    }

    pub async fn remove_remote(&self, path: &str, is_dir: bool) -> Result<(), CoreError> {
        let backend = self.current()?;
        backend
            .remove(path, is_dir)
            .await
            .map_err(|e| CoreError::Remote(format!("{e:#}")))
    }

    pub async fn rename_remote(&self, from: &str, to: &str) -> Result<(), CoreError> {
        let backend = self.current()?;
        backend
            .rename(from, to)
            .await
            .map_err(|e| CoreError::Remote(format!("{e:#}")))
    }

    fn current(&self) -> Result<Arc<dyn RemoteBackend>, CoreError> {
        self.backend.lock().clone().ok_or(CoreError::NotConnected)
    }

    /// Put `backend` in the slot. A concurrent connect may have
    /// installed its own backend while this one was being
    /// established; that one is evicted and closed, never leaked.
    async fn install(&self, backend: Arc<dyn RemoteBackend>) -> ConnectionInfo {
        let protocol = backend.protocol().to_string();
        let message = format!("Connected to {} server", protocol.to_uppercase());
        let displaced = self.backend.lock().replace(backend);
        self.set_state(ConnectionState::Connected);
        if let Some(displaced) = displaced {
            close_backend(&displaced).await;
        }
        info!(%protocol, "connected");
        ConnectionInfo { protocol, message }
    }

    /// Close and drop whatever backend is installed. The slot is
    /// emptied before close so no caller can reach the dying session.
    async fn release_current(&self) {
        let stale = self.backend.lock().take();
        if let Some(backend) = stale {
            close_backend(&backend).await;
        }
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state.clone();
        self.bus.send(Event::ConnectionStateChanged { state });
    }
}

async fn close_backend(backend: &Arc<dyn RemoteBackend>) {
    if let Err(err) = backend.close().await {
        warn!(protocol = backend.protocol(), error = %err, "session close reported an error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quay_remote::SimBackend;

    fn manager() -> ConnectionManager {
        ConnectionManager::new(RemoteDefaults::default(), EventBus::new(16))
    }

    #[tokio::test]
    async fn list_without_session_is_not_connected() {
        let manager = manager();
        let err = manager.list_remote("/").await.unwrap_err();
        assert!(matches!(err, CoreError::NotConnected));
    }

    #[tokio::test]
    async fn reconnect_releases_previous_session() {
        let manager = manager();
        let (first, first_handle) = SimBackend::new();
        let (second, second_handle) = SimBackend::new();

        manager.connect_with_backend(Arc::new(first)).await;
        assert!(manager.is_connected());
        assert!(!first_handle.is_closed());

        manager.connect_with_backend(Arc::new(second)).await;
        assert!(manager.is_connected());
        assert!(first_handle.is_closed());
        assert!(!second_handle.is_closed());
    }

    #[tokio::test]
    async fn late_connect_resolution_closes_displaced_session() {
        let manager = manager();
        let (slow, slow_handle) = SimBackend::new();
        let (fast, fast_handle) = SimBackend::new();

        // A second connect finished while the first one's backend was
        // still being established.
        manager.connect_with_backend(Arc::new(fast)).await;
        assert!(manager.is_connected());

        // The straggler lands last; whatever it displaces must be
        // closed, not leaked.
        manager.install(Arc::new(slow)).await;
        assert!(manager.is_connected());
        assert!(fast_handle.is_closed());
        assert!(!slow_handle.is_closed());

        manager.disconnect().await.unwrap();
        assert!(slow_handle.is_closed());
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let manager = manager();
        manager.disconnect().await.unwrap();
        manager.disconnect().await.unwrap();

        let (backend, handle) = SimBackend::new();
        manager.connect_with_backend(Arc::new(backend)).await;
        manager.disconnect().await.unwrap();
        assert!(handle.is_closed());
        assert!(matches!(manager.state(), ConnectionState::Disconnected));
        manager.disconnect().await.unwrap();
    }

    #[test]
    fn debug_output_redacts_password() {
        let config = ConnectionConfig {
            protocol: Protocol::Ftp,
            host: "ftp.example.com".to_string(),
            port: 21,
            username: "u".to_string(),
            password: Zeroizing::new("hunter2".to_string()),
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("***"));
    }
}

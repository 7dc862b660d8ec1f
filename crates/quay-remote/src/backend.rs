use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use zeroize::Zeroizing;

/// One entry of a remote directory listing.
#[derive(Clone, Debug)]
pub struct RemoteEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// Parameters a backend needs to establish its session.
#[derive(Clone)]
pub struct RemoteConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Zeroizing<String>,
    pub connect_timeout_ms: u64,
    pub keepalive_interval_secs: u64,
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// The remote protocol capability. FTP, SFTP and the simulated tree
/// all sit behind this one surface; callers never see a protocol
/// detail past the connect dispatch.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    fn protocol(&self) -> &'static str;
    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>>;
    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<()>;
    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<()>;
    async fn mkdir(&self, path: &str) -> Result<()>;
    async fn remove(&self, path: &str, is_dir: bool) -> Result<()>;
    async fn rename(&self, from: &str, to: &str) -> Result<()>;
    /// Release the underlying session. Safe to call more than once.
    async fn close(&self) -> Result<()>;
}

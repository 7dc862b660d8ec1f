use crate::backend::{RemoteBackend, RemoteConfig, RemoteEntry};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use russh::client::{self, Config as ClientConfig, Handle};
use russh_sftp::client::fs::Metadata;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::OpenFlags;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// SFTP session over russh. One ssh connection, one sftp subsystem
/// channel opened at connect time and reused for every operation.
pub struct SftpBackend {
    handle: Handle<ClientHandler>,
    sftp: SftpSession,
}

impl SftpBackend {
    pub async fn connect(cfg: RemoteConfig) -> Result<Self> {
        let client_config = Arc::new(ClientConfig {
            keepalive_interval: Some(Duration::from_secs(cfg.keepalive_interval_secs)),
            keepalive_max: 3,
            ..Default::default()
        });

        let handler = ClientHandler {
            host: cfg.host.clone(),
            port: cfg.port,
        };

        let connect = async {
            let sock = tokio::net::TcpStream::connect((cfg.host.as_str(), cfg.port)).await?;
            let handle = client::connect_stream(client_config, sock, handler).await?;
            Ok::<_, anyhow::Error>(handle)
        };
        let mut handle = tokio::time::timeout(Duration::from_millis(cfg.connect_timeout_ms), connect)
            .await
            .map_err(|_| anyhow!("connect timed out after {}ms", cfg.connect_timeout_ms))??;

        let res = handle
            .authenticate_password(cfg.username.clone(), cfg.password.to_string())
            .await?;
        if !matches!(res, client::AuthResult::Success) {
            return Err(anyhow!("authentication failed for {}", cfg.username));
        }

        let channel = handle.channel_open_session().await?;
        channel.request_subsystem(true, "sftp").await?;
        let sftp = SftpSession::new(channel.into_stream()).await?;
        debug!(host = %cfg.host, port = cfg.port, "sftp session established");

        Ok(Self { handle, sftp })
    }

    fn entry_from_meta(name: String, meta: &Metadata) -> RemoteEntry {
        RemoteEntry {
            is_dir: meta.file_type().is_dir(),
            size: meta.size.unwrap_or(0),
            modified: meta
                .mtime
                .and_then(|t| DateTime::<Utc>::from_timestamp(t as i64, 0)),
            name,
        }
    }
}

#[async_trait]
impl RemoteBackend for SftpBackend {
    fn protocol(&self) -> &'static str {
        "sftp"
    }

    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        let mut entries = Vec::new();
        let rd = self.sftp.read_dir(path).await?;
        for entry in rd {
            let name = entry.file_name();
            if name == "." || name == ".." {
                continue;
            }
            let meta = entry.metadata();
            entries.push(Self::entry_from_meta(name, &meta));
        }
        Ok(entries)
    }

    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        let mut local = tokio::fs::File::open(local_path).await?;
        let mut remote = self
            .sftp
            .open_with_flags(
                remote_path,
                OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE,
            )
            .await?;
        tokio::io::copy(&mut local, &mut remote).await?;
        remote.shutdown().await?;
        Ok(())
    }

    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<()> {
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut remote = self.sftp.open(remote_path).await?;
        let mut local = tokio::fs::File::create(local_path).await?;
        tokio::io::copy(&mut remote, &mut local).await?;
        local.flush().await?;
        Ok(())
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        self.sftp.create_dir(path).await?;
        Ok(())
    }

    async fn remove(&self, path: &str, is_dir: bool) -> Result<()> {
        if is_dir {
            self.sftp.remove_dir(path).await?;
        } else {
            self.sftp.remove_file(path).await?;
        }
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        self.sftp.rename(from, to).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.handle
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
struct ClientHandler {
    host: String,
    port: u16,
}

impl client::Handler for ClientHandler {
    type Error = anyhow::Error;

    fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> impl std::future::Future<Output = Result<bool, Self::Error>> + Send {
        // Trust decisions belong to the caller's presentation layer;
        // here the key is accepted and its fingerprint logged.
        let fingerprint = server_public_key.fingerprint(Default::default());
        warn!(host = %self.host, port = self.port, %fingerprint, "accepting server host key");
        async move { Ok(true) }
    }
}

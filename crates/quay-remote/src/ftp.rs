use crate::backend::{RemoteBackend, RemoteConfig, RemoteEntry};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::net::ToSocketAddrs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use suppaftp::list::File as ListFile;
use suppaftp::types::FileType;
use suppaftp::FtpStream;
use tokio::sync::mpsc;
use tokio::task;
use tracing::{debug, warn};

/// FTP session over suppaftp. The control connection is a blocking
/// stream, so every command runs on the blocking pool; callers see
/// the same one-shot async contract as the SFTP backend.
pub struct FtpBackend {
    stream: Arc<Mutex<Option<FtpStream>>>,
    shutdown_tx: mpsc::Sender<()>,
}

impl FtpBackend {
    pub async fn connect(cfg: RemoteConfig) -> Result<Self> {
        let keepalive = Duration::from_secs(cfg.keepalive_interval_secs);
        let stream = task::spawn_blocking(move || -> Result<FtpStream> {
            let addr = (cfg.host.as_str(), cfg.port)
                .to_socket_addrs()?
                .next()
                .ok_or_else(|| anyhow!("could not resolve {}", cfg.host))?;
            let mut stream =
                FtpStream::connect_timeout(addr, Duration::from_millis(cfg.connect_timeout_ms))
                    .with_context(|| format!("ftp connect to {}:{}", cfg.host, cfg.port))?;
            stream
                .login(cfg.username.as_str(), cfg.password.as_str())
                .with_context(|| format!("ftp login as {}", cfg.username))?;
            stream.transfer_type(FileType::Binary)?;
            Ok(stream)
        })
        .await??;

        let stream = Arc::new(Mutex::new(Some(stream)));
        let shutdown_tx = spawn_keepalive(stream.clone(), keepalive);
        debug!("ftp session established");
        Ok(Self {
            stream,
            shutdown_tx,
        })
    }

    async fn with_stream<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut FtpStream) -> Result<T> + Send + 'static,
    {
        let stream = self.stream.clone();
        task::spawn_blocking(move || {
            let mut guard = stream.lock();
            let stream = guard
                .as_mut()
                .ok_or_else(|| anyhow!("ftp session closed"))?;
            op(stream)
        })
        .await?
    }
}

#[async_trait]
impl RemoteBackend for FtpBackend {
    fn protocol(&self) -> &'static str {
        "ftp"
    }

    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        let path = path.to_string();
        self.with_stream(move |s| {
            let lines = s.list(Some(&path))?;
            let mut entries = Vec::new();
            for line in lines {
                let file = match ListFile::try_from(line.as_str()) {
                    Ok(file) => file,
                    Err(err) => {
                        warn!(%line, %err, "unparseable LIST line skipped");
                        continue;
                    }
                };
                if file.name() == "." || file.name() == ".." {
                    continue;
                }
                entries.push(RemoteEntry {
                    name: file.name().to_string(),
                    is_dir: file.is_directory(),
                    size: file.size() as u64,
                    modified: Some(DateTime::<Utc>::from(file.modified())),
                });
            }
            Ok(entries)
        })
        .await
    }

    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        let local: PathBuf = local_path.to_path_buf();
        let remote = remote_path.to_string();
        self.with_stream(move |s| {
            let mut file = std::fs::File::open(&local)?;
            s.put_file(&remote, &mut file)?;
            Ok(())
        })
        .await
    }

    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<()> {
        let local: PathBuf = local_path.to_path_buf();
        let remote = remote_path.to_string();
        self.with_stream(move |s| {
            let buffer = s.retr_as_buffer(&remote)?;
            if let Some(parent) = local.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&local, buffer.into_inner())?;
            Ok(())
        })
        .await
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        let path = path.to_string();
        self.with_stream(move |s| {
            s.mkdir(&path)?;
            Ok(())
        })
        .await
    }

    async fn remove(&self, path: &str, is_dir: bool) -> Result<()> {
        let path = path.to_string();
        self.with_stream(move |s| {
            if is_dir {
                s.rmdir(&path)?;
            } else {
                s.rm(&path)?;
            }
            Ok(())
        })
        .await
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let from = from.to_string();
        let to = to.to_string();
        self.with_stream(move |s| {
            s.rename(&from, &to)?;
            Ok(())
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        let _ = self.shutdown_tx.send(()).await;
        let stream = self.stream.clone();
        task::spawn_blocking(move || {
            if let Some(mut stream) = stream.lock().take() {
                let _ = stream.quit();
            }
        })
        .await?;
        Ok(())
    }
}

/// NOOPs the control connection so idle sessions survive
/// server-side timeouts. Stops on shutdown or once the stream is gone.
/// A zero interval disables the keepalive.
fn spawn_keepalive(stream: Arc<Mutex<Option<FtpStream>>>, every: Duration) -> mpsc::Sender<()> {
    let (tx, mut rx) = mpsc::channel::<()>(1);
    if every.is_zero() {
        return tx;
    }
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = rx.recv() => break,
                _ = ticker.tick() => {
                    let stream = stream.clone();
                    let alive = task::spawn_blocking(move || {
                        let mut guard = stream.lock();
                        match guard.as_mut() {
                            Some(s) => s.noop().is_ok(),
                            None => false,
                        }
                    })
                    .await
                    .unwrap_or(false);
                    if !alive {
                        break;
                    }
                }
            }
        }
    });
    tx
}

use crate::backend::{RemoteBackend, RemoteEntry};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// In-memory remote tree. Selected explicitly (demo flag or tests),
/// never by environment detection; behaves like a real backend
/// including failure once closed.
pub struct SimBackend {
    dirs: Arc<Mutex<HashMap<String, Vec<RemoteEntry>>>>,
    closed: Arc<AtomicBool>,
    fail_transfers: Arc<AtomicBool>,
    latency: Duration,
}

/// Test/observer handle onto a [`SimBackend`]'s shared state.
#[derive(Clone)]
pub struct SimHandle {
    dirs: Arc<Mutex<HashMap<String, Vec<RemoteEntry>>>>,
    closed: Arc<AtomicBool>,
    fail_transfers: Arc<AtomicBool>,
}

impl SimHandle {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Make subsequent uploads and downloads fail.
    pub fn set_fail_transfers(&self, fail: bool) {
        self.fail_transfers.store(fail, Ordering::SeqCst);
    }

    pub fn entry_names(&self, path: &str) -> Vec<String> {
        self.dirs
            .lock()
            .get(&normalize(path))
            .map(|entries| entries.iter().map(|e| e.name.clone()).collect())
            .unwrap_or_default()
    }
}

impl SimBackend {
    pub fn new() -> (Self, SimHandle) {
        let mut dirs = HashMap::new();
        dirs.insert("/".to_string(), seed_entries());
        let backend = Self {
            dirs: Arc::new(Mutex::new(dirs)),
            closed: Arc::new(AtomicBool::new(false)),
            fail_transfers: Arc::new(AtomicBool::new(false)),
            latency: Duration::from_millis(0),
        };
        let handle = SimHandle {
            dirs: backend.dirs.clone(),
            closed: backend.closed.clone(),
            fail_transfers: backend.fail_transfers.clone(),
        };
        (backend, handle)
    }

    /// Delay every operation by `latency`, to exercise interleavings.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    async fn begin(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(anyhow!("simulated session closed"));
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
            // The session may have been torn down while this
            // operation was in flight.
            if self.closed.load(Ordering::SeqCst) {
                return Err(anyhow!("simulated session closed"));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteBackend for SimBackend {
    fn protocol(&self) -> &'static str {
        "sim"
    }

    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        self.begin().await?;
        // Unknown directories list as empty: navigation is optimistic
        // and the follow-up refresh is what reports reality.
        Ok(self
            .dirs
            .lock()
            .get(&normalize(path))
            .cloned()
            .unwrap_or_default())
    }

    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        self.begin().await?;
        if self.fail_transfers.load(Ordering::SeqCst) {
            return Err(anyhow!("simulated transfer failure"));
        }
        let size = tokio::fs::metadata(local_path).await?.len();
        let (parent, name) = split(remote_path);
        let mut dirs = self.dirs.lock();
        let entries = dirs.entry(parent).or_default();
        entries.retain(|e| e.name != name);
        entries.push(RemoteEntry {
            name,
            is_dir: false,
            size,
            modified: Some(Utc::now()),
        });
        Ok(())
    }

    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<()> {
        self.begin().await?;
        if self.fail_transfers.load(Ordering::SeqCst) {
            return Err(anyhow!("simulated transfer failure"));
        }
        let (parent, name) = split(remote_path);
        let known = self
            .dirs
            .lock()
            .get(&parent)
            .map(|entries| entries.iter().any(|e| e.name == name))
            .unwrap_or(false);
        if !known {
            return Err(anyhow!("no such remote file: {remote_path}"));
        }
        if let Some(dir) = local_path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(local_path, format!("simulated contents of {remote_path}\n")).await?;
        Ok(())
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        self.begin().await?;
        let (parent, name) = split(path);
        let mut dirs = self.dirs.lock();
        dirs.entry(normalize(path)).or_default();
        let entries = dirs.entry(parent).or_default();
        if !entries.iter().any(|e| e.name == name) {
            entries.push(RemoteEntry {
                name,
                is_dir: true,
                size: 0,
                modified: Some(Utc::now()),
            });
        }
        Ok(())
    }

    async fn remove(&self, path: &str, is_dir: bool) -> Result<()> {
        self.begin().await?;
        let (parent, name) = split(path);
        let mut dirs = self.dirs.lock();
        if is_dir {
            dirs.remove(&normalize(path));
        }
        if let Some(entries) = dirs.get_mut(&parent) {
            entries.retain(|e| e.name != name);
        }
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        self.begin().await?;
        let (from_parent, from_name) = split(from);
        let (to_parent, to_name) = split(to);
        let mut dirs = self.dirs.lock();
        let moved = dirs.get_mut(&from_parent).and_then(|entries| {
            let idx = entries.iter().position(|e| e.name == from_name)?;
            Some(entries.remove(idx))
        });
        let Some(mut entry) = moved else {
            return Err(anyhow!("no such remote entry: {from}"));
        };
        entry.name = to_name;
        dirs.entry(to_parent).or_default().push(entry);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn normalize(path: &str) -> String {
    if path.len() > 1 && path.ends_with('/') {
        path[..path.len() - 1].to_string()
    } else if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}

fn split(path: &str) -> (String, String) {
    let path = normalize(path);
    match path.rfind('/') {
        Some(0) => ("/".to_string(), path[1..].to_string()),
        Some(idx) => (path[..idx].to_string(), path[idx + 1..].to_string()),
        None => ("/".to_string(), path),
    }
}

fn seed_entries() -> Vec<RemoteEntry> {
    let stamp = |s: &str| {
        s.parse::<chrono::DateTime<Utc>>()
            .ok()
            .or_else(|| Some(Utc::now()))
    };
    vec![
        RemoteEntry {
            name: "public_html".into(),
            is_dir: true,
            size: 0,
            modified: stamp("2024-01-12T00:00:00Z"),
        },
        RemoteEntry {
            name: "logs".into(),
            is_dir: true,
            size: 0,
            modified: stamp("2024-01-14T00:00:00Z"),
        },
        RemoteEntry {
            name: "backup".into(),
            is_dir: true,
            size: 0,
            modified: stamp("2024-01-08T00:00:00Z"),
        },
        RemoteEntry {
            name: "index.html".into(),
            is_dir: false,
            size: 4096,
            modified: stamp("2024-01-19T00:00:00Z"),
        },
        RemoteEntry {
            name: "style.css".into(),
            is_dir: false,
            size: 8192,
            modified: stamp("2024-01-17T00:00:00Z"),
        },
        RemoteEntry {
            name: "script.js".into(),
            is_dir: false,
            size: 12288,
            modified: stamp("2024-01-21T00:00:00Z"),
        },
    ]
}

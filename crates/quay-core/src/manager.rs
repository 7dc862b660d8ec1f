use crate::error::CoreError;
use crate::listing::{join_path, DirCache, FileEntry, Side};
use crate::session::{ConnectionConfig, ConnectionInfo, ConnectionManager, ConnectionState};
use crate::transfer::{Direction, TransferId, TransferItem, TransferQueue};
use async_trait::async_trait;
use parking_lot::Mutex;
use quay_remote::SimBackend;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// External directory-selection prompt, used only to seed the local
/// pane.
#[async_trait]
pub trait DirectoryPicker: Send + Sync {
    async fn select_directory(&self) -> Option<PathBuf>;
}

/// Thin orchestrator over the connection manager, the directory cache
/// and the transfer queue. Holds nothing of its own beyond the status
/// line; paths live in the cache, transfers in the queue.
pub struct FileManager {
    conn: Arc<ConnectionManager>,
    cache: Arc<DirCache>,
    queue: TransferQueue,
    status: Mutex<String>,
}

impl FileManager {
    pub fn new(conn: Arc<ConnectionManager>, cache: Arc<DirCache>, queue: TransferQueue) -> Self {
        Self {
            conn,
            cache,
            queue,
            status: Mutex::new("Ready".to_string()),
        }
    }

    pub fn status(&self) -> String {
        self.status.lock().clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.conn.state()
    }

    pub fn local_path(&self) -> String {
        self.cache.path(Side::Local)
    }

    pub fn remote_path(&self) -> String {
        self.cache.path(Side::Remote)
    }

    pub fn entries(&self, side: Side) -> Vec<FileEntry> {
        self.cache.entries(side)
    }

    pub fn toggle_selection(&self, side: Side, name: &str) {
        self.cache.toggle_selection(side, name);
    }

    pub async fn load_local(&self) -> Result<Vec<FileEntry>, CoreError> {
        self.surface(self.cache.refresh_local().await)
    }

    pub async fn load_remote(&self) -> Result<Vec<FileEntry>, CoreError> {
        self.surface(self.cache.refresh_remote().await)
    }

    pub async fn navigate_local(&self, segment: &str) -> Result<Vec<FileEntry>, CoreError> {
        self.cache.navigate(Side::Local, segment);
        self.load_local().await
    }

    pub async fn navigate_remote(&self, segment: &str) -> Result<Vec<FileEntry>, CoreError> {
        self.cache.navigate(Side::Remote, segment);
        self.load_remote().await
    }

    pub async fn connect(&self, config: ConnectionConfig) -> Result<ConnectionInfo, CoreError> {
        match self.conn.connect(config).await {
            Ok(info) => {
                self.set_status(&info.message);
                // The pane fill is advisory; the connection stands
                // even if the first listing fails.
                let _ = self.load_remote().await;
                Ok(info)
            }
            Err(err) => {
                self.set_status(&err.to_string());
                Err(err)
            }
        }
    }

    /// Demo mode: the simulated backend stands in for a real server.
    pub async fn connect_simulated(&self) -> ConnectionInfo {
        let (backend, _handle) = SimBackend::new();
        let info = self.conn.connect_with_backend(Arc::new(backend)).await;
        self.set_status(&info.message);
        let _ = self.load_remote().await;
        info
    }

    pub async fn disconnect(&self) -> Result<(), CoreError> {
        self.conn.disconnect().await?;
        self.cache.clear_entries(Side::Remote);
        self.set_status("Disconnected");
        Ok(())
    }

    /// Queue one upload per selected local file, then drop the
    /// selection. Destination paths join the current remote path with
    /// each file name.
    pub fn upload_selected(&self) -> Result<Vec<TransferId>, CoreError> {
        self.submit_selected(Side::Local, Direction::Upload)
    }

    /// Queue one download per selected remote file, symmetric to
    /// [`FileManager::upload_selected`].
    pub fn download_selected(&self) -> Result<Vec<TransferId>, CoreError> {
        self.submit_selected(Side::Remote, Direction::Download)
    }

    pub fn transfers(&self) -> Vec<TransferItem> {
        self.queue.items()
    }

    pub fn clear_transfers(&self) {
        self.queue.clear();
    }

    pub async fn pick_local_directory(
        &self,
        picker: &dyn DirectoryPicker,
    ) -> Result<Option<Vec<FileEntry>>, CoreError> {
        let Some(path) = picker.select_directory().await else {
            return Ok(None);
        };
        self.cache
            .set_path(Side::Local, path.to_string_lossy().into_owned());
        self.load_local().await.map(Some)
    }

    /// Jump the remote pane straight to `path` and list it.
    pub async fn load_remote_at(&self, path: String) -> Result<Vec<FileEntry>, CoreError> {
        self.cache.set_path(Side::Remote, path);
        self.load_remote().await
    }

    pub async fn mkdir_local(&self, name: &str) -> Result<(), CoreError> {
        crate::local::mkdir(Path::new(&self.local_path()), name).await?;
        self.load_local().await?;
        Ok(())
    }

    pub async fn remove_local(&self, name: &str) -> Result<(), CoreError> {
        crate::local::remove(&Path::new(&self.local_path()).join(name)).await?;
        self.load_local().await?;
        Ok(())
    }

    pub async fn rename_local(&self, from: &str, to: &str) -> Result<(), CoreError> {
        let base = PathBuf::from(self.local_path());
        crate::local::rename(&base.join(from), &base.join(to)).await?;
        self.load_local().await?;
        Ok(())
    }

    pub async fn mkdir_remote(&self, name: &str) -> Result<(), CoreError> {
        self.conn
            .mkdir_remote(&join_path(&self.remote_path(), name))
            .await?;
        self.load_remote().await?;
        Ok(())
    }

    pub async fn remove_remote(&self, name: &str, is_dir: bool) -> Result<(), CoreError> {
        self.conn
            .remove_remote(&join_path(&self.remote_path(), name), is_dir)
            .await?;
        self.load_remote().await?;
        Ok(())
    }

    pub async fn rename_remote(&self, from: &str, to: &str) -> Result<(), CoreError> {
        let base = self.remote_path();
        self.conn
            .rename_remote(&join_path(&base, from), &join_path(&base, to))
            .await?;
        self.load_remote().await?;
        Ok(())
    }

    fn submit_selected(
        &self,
        side: Side,
        direction: Direction,
    ) -> Result<Vec<TransferId>, CoreError> {
        if !self.conn.is_connected() {
            return Err(CoreError::NotConnected);
        }
        let names = self.cache.selected(side);
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let local_base = PathBuf::from(self.local_path());
        let remote_base = self.remote_path();
        let ids = self
            .queue
            .submit_batch(direction, &names, &local_base, &remote_base);
        self.cache.clear_selection(side);
        info!(count = ids.len(), ?direction, "transfer batch queued");
        self.set_status(&format!("Queued {} transfer(s)", ids.len()));
        Ok(ids)
    }

    fn surface<T>(&self, result: Result<T, CoreError>) -> Result<T, CoreError> {
        if let Err(err) = &result {
            self.set_status(&format!("Error: {err}"));
        }
        result
    }

    fn set_status(&self, message: &str) {
        *self.status.lock() = message.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::transfer::TransferStatus;
    use quay_config::RemoteDefaults;
    use std::time::Duration;
    use tempfile::TempDir;

    struct FixedPicker(Option<PathBuf>);

    #[async_trait]
    impl DirectoryPicker for FixedPicker {
        async fn select_directory(&self) -> Option<PathBuf> {
            self.0.clone()
        }
    }

    fn build(local_path: &str) -> FileManager {
        let bus = EventBus::new(64);
        let conn = Arc::new(ConnectionManager::new(RemoteDefaults::default(), bus.clone()));
        let cache = Arc::new(DirCache::new(conn.clone(), local_path.to_string(), false));
        let queue = TransferQueue::new(conn.clone(), cache.clone(), bus, false);
        FileManager::new(conn, cache, queue)
    }

    async fn settle(manager: &FileManager, count: usize) {
        for _ in 0..500 {
            let done = manager
                .transfers()
                .iter()
                .filter(|item| item.status.is_terminal())
                .count();
            if done >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("transfers did not settle: {:?}", manager.transfers());
    }

    #[tokio::test]
    async fn upload_selected_requires_connection() {
        let dir = TempDir::new().unwrap();
        let manager = build(dir.path().to_str().unwrap());
        manager.toggle_selection(Side::Local, "a.txt");
        let err = manager.upload_selected().unwrap_err();
        assert!(matches!(err, CoreError::NotConnected));
    }

    #[tokio::test]
    async fn upload_selected_fans_out_at_remote_path() {
        let dir = TempDir::new().unwrap();
        for name in ["a.txt", "b.txt", "c.txt"] {
            tokio::fs::write(dir.path().join(name), b"data").await.unwrap();
        }
        let manager = build(dir.path().to_str().unwrap());
        manager.connect_simulated().await;
        manager.navigate_remote("uploads").await.unwrap();
        assert_eq!(manager.remote_path(), "/uploads");

        for name in ["a.txt", "b.txt", "c.txt"] {
            manager.toggle_selection(Side::Local, name);
        }
        let ids = manager.upload_selected().unwrap();
        assert_eq!(ids.len(), 3);
        assert!(manager.cache.selected(Side::Local).is_empty());

        settle(&manager, 3).await;
        let items = manager.transfers();
        let mut paths: Vec<&str> = items.iter().map(|i| i.remote_path.as_str()).collect();
        paths.sort();
        assert_eq!(
            paths,
            vec!["/uploads/a.txt", "/uploads/b.txt", "/uploads/c.txt"]
        );
        assert!(items
            .iter()
            .all(|item| item.status == TransferStatus::Completed));
    }

    #[tokio::test]
    async fn download_selected_writes_local_file() {
        let dir = TempDir::new().unwrap();
        let manager = build(dir.path().to_str().unwrap());
        manager.connect_simulated().await;

        manager.toggle_selection(Side::Remote, "index.html");
        let ids = manager.download_selected().unwrap();
        assert_eq!(ids.len(), 1);
        settle(&manager, 1).await;

        assert_eq!(
            manager.transfers()[0].status,
            TransferStatus::Completed,
            "detail: {:?}",
            manager.transfers()[0].error_detail
        );
        assert!(dir.path().join("index.html").is_file());
    }

    #[tokio::test]
    async fn disconnect_empties_remote_pane() {
        let dir = TempDir::new().unwrap();
        let manager = build(dir.path().to_str().unwrap());
        manager.connect_simulated().await;
        assert!(!manager.entries(Side::Remote).is_empty());

        manager.disconnect().await.unwrap();
        assert!(manager.entries(Side::Remote).is_empty());
        assert_eq!(manager.status(), "Disconnected");
        assert!(matches!(
            manager.connection_state(),
            ConnectionState::Disconnected
        ));
    }

    #[tokio::test]
    async fn picker_reseeds_local_pane() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        tokio::fs::write(second.path().join("only-here.txt"), b"x")
            .await
            .unwrap();

        let manager = build(first.path().to_str().unwrap());
        let picked = manager
            .pick_local_directory(&FixedPicker(Some(second.path().to_path_buf())))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].name, "only-here.txt");
        assert_eq!(manager.local_path(), second.path().to_string_lossy());

        let none = manager
            .pick_local_directory(&FixedPicker(None))
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn remote_mkdir_and_rename_roundtrip() {
        let dir = TempDir::new().unwrap();
        let manager = build(dir.path().to_str().unwrap());
        manager.connect_simulated().await;

        manager.mkdir_remote("incoming").await.unwrap();
        assert!(manager
            .entries(Side::Remote)
            .iter()
            .any(|e| e.name == "incoming" && e.is_dir));

        manager.rename_remote("incoming", "archive").await.unwrap();
        let entries = manager.entries(Side::Remote);
        assert!(entries.iter().any(|e| e.name == "archive"));
        assert!(!entries.iter().any(|e| e.name == "incoming"));

        manager.remove_remote("archive", true).await.unwrap();
        assert!(!manager
            .entries(Side::Remote)
            .iter()
            .any(|e| e.name == "archive"));
    }
}

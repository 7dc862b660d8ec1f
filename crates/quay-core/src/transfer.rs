use crate::events::{Event, EventBus};
use crate::listing::{join_path, DirCache};
use crate::session::ConnectionManager;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

pub type TransferId = Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Direction {
    Upload,
    Download,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum TransferStatus {
    Pending,
    Active,
    Completed,
    Error,
}

impl TransferStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::Completed | TransferStatus::Error)
    }
}

/// One file's upload or download. Mutated only by the queue; callers
/// read snapshots.
#[derive(Clone, Debug, Serialize)]
pub struct TransferItem {
    pub id: TransferId,
    pub local_path: PathBuf,
    pub remote_path: String,
    pub direction: Direction,
    pub status: TransferStatus,
    pub progress: u8,
    pub error_detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

struct QueueInner {
    conn: Arc<ConnectionManager>,
    cache: Arc<DirCache>,
    items: Mutex<Vec<TransferItem>>,
    bus: EventBus,
    refresh_listings: bool,
}

/// Tracks every requested transfer and drives each to completion on
/// its own task. Nothing here serializes unrelated transfers and no
/// admission limit is imposed; a stalled transfer delays nobody.
#[derive(Clone)]
pub struct TransferQueue {
    inner: Arc<QueueInner>,
}

impl TransferQueue {
    pub fn new(
        conn: Arc<ConnectionManager>,
        cache: Arc<DirCache>,
        bus: EventBus,
        refresh_listings: bool,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                conn,
                cache,
                items: Mutex::new(Vec::new()),
                bus,
                refresh_listings,
            }),
        }
    }

    /// Snapshot of every tracked transfer, in submission order.
    pub fn items(&self) -> Vec<TransferItem> {
        self.inner.items.lock().clone()
    }

    /// Create a Pending item and begin dispatch immediately. The
    /// caller observes progress through [`TransferQueue::items`], not
    /// a returned future.
    pub fn submit(
        &self,
        direction: Direction,
        local_path: PathBuf,
        remote_path: String,
    ) -> TransferId {
        let item = TransferItem {
            id: Uuid::new_v4(),
            local_path,
            remote_path,
            direction,
            status: TransferStatus::Pending,
            progress: 0,
            error_detail: None,
            created_at: Utc::now(),
        };
        let id = item.id;
        // Tracked before announced: a subscriber reacting to the
        // event must be able to find the item through `items`.
        self.inner.items.lock().push(item.clone());
        self.inner.bus.send(Event::TransferUpdated { item });

        let inner = self.inner.clone();
        tokio::spawn(async move {
            run_transfer(inner, id).await;
        });
        id
    }

    /// Fan a selection out into one independent transfer per file.
    /// Items are placed in submission order; completion order is
    /// whatever the network decides.
    pub fn submit_batch(
        &self,
        direction: Direction,
        names: &[String],
        local_base: &Path,
        remote_base: &str,
    ) -> Vec<TransferId> {
        names
            .iter()
            .map(|name| {
                self.submit(
                    direction,
                    local_base.join(name),
                    join_path(remote_base, name),
                )
            })
            .collect()
    }

    /// Drop finished items. Pending and Active items are always kept,
    /// so clearing during active transfers never loses in-flight
    /// work.
    pub fn clear(&self) {
        let mut items = self.inner.items.lock();
        let before = items.len();
        items.retain(|item| !item.status.is_terminal());
        debug!(removed = before - items.len(), "transfer queue cleared");
    }
}

async fn run_transfer(inner: Arc<QueueInner>, id: TransferId) {
    let Some((direction, local_path, remote_path)) = update(&inner, id, |item| {
        item.status = TransferStatus::Active;
    })
    .map(|item| (item.direction, item.local_path, item.remote_path)) else {
        return;
    };

    info!(transfer_id = %id, ?direction, remote_path = %remote_path, "transfer start");
    let result = match direction {
        Direction::Upload => inner.conn.upload(&local_path, &remote_path).await,
        Direction::Download => inner.conn.download(&remote_path, &local_path).await,
    };

    match result {
        Ok(()) => {
            update(&inner, id, |item| {
                item.status = TransferStatus::Completed;
                item.progress = 100;
            });
            info!(transfer_id = %id, "transfer completed");
        }
        Err(err) => {
            update(&inner, id, |item| {
                item.status = TransferStatus::Error;
                item.error_detail = Some(err.to_string());
            });
            error!(transfer_id = %id, error = %err, "transfer failed");
        }
    }

    // A finished transfer changed a directory somewhere; re-fetch
    // both panes. Best effort only: a failed refresh never touches
    // the item's terminal state.
    if inner.refresh_listings {
        if let Err(err) = inner.cache.refresh_local().await {
            debug!(error = %err, "post-transfer local refresh failed");
        }
        if let Err(err) = inner.cache.refresh_remote().await {
            debug!(error = %err, "post-transfer remote refresh failed");
        }
    }
}

/// Apply `f` to the tracked item unless it already reached a terminal
/// state; Completed and Error are final.
fn update(
    inner: &QueueInner,
    id: TransferId,
    f: impl FnOnce(&mut TransferItem),
) -> Option<TransferItem> {
    let mut items = inner.items.lock();
    let item = items.iter_mut().find(|item| item.id == id)?;
    if item.status.is_terminal() {
        return None;
    }
    f(item);
    let snapshot = item.clone();
    drop(items);
    inner.bus.send(Event::TransferUpdated {
        item: snapshot.clone(),
    });
    Some(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use quay_config::RemoteDefaults;
    use quay_remote::{SimBackend, SimHandle};
    use std::time::Duration;
    use tempfile::TempDir;

    async fn fixture(latency_ms: u64) -> (TransferQueue, SimHandle, TempDir, Arc<DirCache>) {
        let bus = EventBus::new(64);
        let conn = Arc::new(ConnectionManager::new(RemoteDefaults::default(), bus.clone()));
        let (backend, handle) = SimBackend::new();
        let backend = backend.with_latency(Duration::from_millis(latency_ms));
        conn.connect_with_backend(Arc::new(backend)).await;

        let dir = TempDir::new().unwrap();
        for name in ["a.txt", "b.txt", "c.txt"] {
            tokio::fs::write(dir.path().join(name), b"payload").await.unwrap();
        }
        let cache = Arc::new(DirCache::new(
            conn.clone(),
            dir.path().to_string_lossy().into_owned(),
            false,
        ));
        let queue = TransferQueue::new(conn, cache.clone(), bus, true);
        (queue, handle, dir, cache)
    }

    async fn wait_terminal(queue: &TransferQueue, count: usize) {
        for _ in 0..500 {
            let settled = queue
                .items()
                .iter()
                .filter(|item| item.status.is_terminal())
                .count();
            if settled >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("transfers did not settle: {:?}", queue.items());
    }

    #[tokio::test]
    async fn batch_fans_out_with_joined_paths() {
        let (queue, handle, dir, _cache) = fixture(0).await;
        let names: Vec<String> = ["a.txt", "b.txt", "c.txt"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let ids = queue.submit_batch(Direction::Upload, &names, dir.path(), "/uploads");
        assert_eq!(ids.len(), 3);

        let items = queue.items();
        let remote_paths: Vec<&str> = items.iter().map(|i| i.remote_path.as_str()).collect();
        assert_eq!(
            remote_paths,
            vec!["/uploads/a.txt", "/uploads/b.txt", "/uploads/c.txt"],
            "placement follows submission order"
        );

        wait_terminal(&queue, 3).await;
        for item in queue.items() {
            assert_eq!(item.status, TransferStatus::Completed);
            assert_eq!(item.progress, 100);
        }
        let mut uploaded = handle.entry_names("/uploads");
        uploaded.sort();
        assert_eq!(uploaded, vec!["a.txt", "b.txt", "c.txt"]);
    }

    #[tokio::test]
    async fn ids_are_unique_across_submissions() {
        let (queue, _handle, dir, _cache) = fixture(0).await;
        let mut ids = Vec::new();
        for _ in 0..50 {
            ids.push(queue.submit(
                Direction::Upload,
                dir.path().join("a.txt"),
                "/uploads/a.txt".to_string(),
            ));
        }
        let mut deduped = ids.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), ids.len());
        wait_terminal(&queue, 50).await;
    }

    #[tokio::test]
    async fn clear_keeps_pending_and_active_items() {
        let (queue, _handle, dir, _cache) = fixture(150).await;
        let names: Vec<String> = ["a.txt", "b.txt", "c.txt"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        queue.submit_batch(Direction::Upload, &names, dir.path(), "/done");
        wait_terminal(&queue, 3).await;

        let slow = [
            queue.submit(
                Direction::Upload,
                dir.path().join("a.txt"),
                "/later/a.txt".to_string(),
            ),
            queue.submit(
                Direction::Upload,
                dir.path().join("b.txt"),
                "/later/b.txt".to_string(),
            ),
        ];
        tokio::time::sleep(Duration::from_millis(30)).await;

        queue.clear();
        let remaining = queue.items();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.iter().all(|item| slow.contains(&item.id)));
        assert!(remaining.iter().all(|item| !item.status.is_terminal()));

        wait_terminal(&queue, 2).await;
    }

    #[tokio::test]
    async fn terminal_items_are_never_revived() {
        let (queue, _handle, dir, _cache) = fixture(0).await;
        let id = queue.submit(
            Direction::Upload,
            dir.path().join("a.txt"),
            "/a.txt".to_string(),
        );
        wait_terminal(&queue, 1).await;

        let settled = queue.items().into_iter().find(|i| i.id == id).unwrap();
        assert_eq!(settled.status, TransferStatus::Completed);

        // A straggling state change against a finished item is a
        // no-op, not a revival.
        let revived = update(&queue.inner, id, |item| {
            item.status = TransferStatus::Active;
            item.progress = 0;
        });
        assert!(revived.is_none());

        let after = queue.items().into_iter().find(|i| i.id == id).unwrap();
        assert_eq!(after.status, TransferStatus::Completed);
        assert_eq!(after.progress, 100);
    }

    #[tokio::test]
    async fn submitted_item_is_tracked_before_its_event_fires() {
        let bus = EventBus::new(64);
        let conn = Arc::new(ConnectionManager::new(RemoteDefaults::default(), bus.clone()));
        let (backend, _handle) = SimBackend::new();
        conn.connect_with_backend(Arc::new(backend)).await;

        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("a.txt"), b"payload").await.unwrap();
        let cache = Arc::new(DirCache::new(
            conn.clone(),
            dir.path().to_string_lossy().into_owned(),
            false,
        ));
        let queue = TransferQueue::new(conn, cache, bus.clone(), false);

        let mut rx = bus.subscribe();
        let id = queue.submit(
            Direction::Upload,
            dir.path().join("a.txt"),
            "/a.txt".to_string(),
        );
        // Every update for this id, the submission event included,
        // must arrive with the item already visible through `items`.
        let Ok(Event::TransferUpdated { item }) = rx.recv().await else {
            panic!("expected a transfer event");
        };
        assert_eq!(item.id, id);
        assert!(queue.items().iter().any(|i| i.id == id));
        wait_terminal(&queue, 1).await;
    }

    #[tokio::test]
    async fn failed_transfer_captures_detail_and_spares_others() {
        let (queue, handle, dir, _cache) = fixture(0).await;

        handle.set_fail_transfers(true);
        let failing = queue.submit(
            Direction::Upload,
            dir.path().join("a.txt"),
            "/uploads/a.txt".to_string(),
        );
        wait_terminal(&queue, 1).await;

        handle.set_fail_transfers(false);
        let ok = queue.submit(
            Direction::Upload,
            dir.path().join("b.txt"),
            "/uploads/b.txt".to_string(),
        );
        wait_terminal(&queue, 2).await;

        let items = queue.items();
        let failed = items.iter().find(|i| i.id == failing).unwrap();
        assert_eq!(failed.status, TransferStatus::Error);
        assert!(failed.error_detail.as_deref().unwrap().contains("simulated"));

        let succeeded = items.iter().find(|i| i.id == ok).unwrap();
        assert_eq!(succeeded.status, TransferStatus::Completed);
    }

    #[tokio::test]
    async fn completion_refreshes_both_panes() {
        let (queue, _handle, dir, cache) = fixture(0).await;
        assert!(cache.entries(crate::listing::Side::Remote).is_empty());

        queue.submit(
            Direction::Upload,
            dir.path().join("a.txt"),
            "/a.txt".to_string(),
        );
        wait_terminal(&queue, 1).await;
        // Refresh is asynchronous relative to the terminal state.
        for _ in 0..100 {
            let remote = cache.entries(crate::listing::Side::Remote);
            if remote.iter().any(|e| e.name == "a.txt") {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("remote pane never picked up the uploaded file");
    }

    #[tokio::test]
    async fn disconnect_during_transfer_errors_item() {
        let (queue, _handle, dir, cache) = fixture(200).await;
        let id = queue.submit(
            Direction::Upload,
            dir.path().join("a.txt"),
            "/uploads/a.txt".to_string(),
        );
        tokio::time::sleep(Duration::from_millis(30)).await;

        // No proactive abort: the item fails naturally against the
        // closed session instead of vanishing.
        let (replacement, _h) = SimBackend::new();
        cache_conn(&cache).connect_with_backend(Arc::new(replacement)).await;

        wait_terminal(&queue, 1).await;
        let item = queue
            .items()
            .into_iter()
            .find(|item| item.id == id)
            .unwrap();
        assert_eq!(item.status, TransferStatus::Error);
        assert!(item.error_detail.is_some());
    }

    fn cache_conn(cache: &DirCache) -> Arc<ConnectionManager> {
        cache.connection()
    }
}

use crate::error::CoreError;
use crate::local;
use crate::session::ConnectionManager;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use quay_remote::RemoteEntry;
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Immutable listing snapshot entry, replaced wholesale on refresh.
#[derive(Clone, Debug, Serialize)]
pub struct FileEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

impl From<RemoteEntry> for FileEntry {
    fn from(entry: RemoteEntry) -> Self {
        Self {
            name: entry.name,
            is_dir: entry.is_dir,
            size: entry.size,
            modified: entry.modified,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Local,
    Remote,
}

#[derive(Default)]
struct PaneState {
    path: String,
    entries: Vec<FileEntry>,
    selection: HashSet<String>,
    /// Generation handed to the most recently issued refresh.
    issued: u64,
    /// Generation of the refresh whose result is currently stored.
    applied: u64,
}

/// Last-fetched listings for both panes, each slot independent.
/// Overlapping refreshes for one side are not serialized; instead a
/// stale resolution is discarded if a later-issued refresh already
/// landed.
pub struct DirCache {
    conn: Arc<ConnectionManager>,
    local: Mutex<PaneState>,
    remote: Mutex<PaneState>,
    show_hidden: bool,
}

impl DirCache {
    pub fn new(conn: Arc<ConnectionManager>, local_path: String, show_hidden: bool) -> Self {
        Self {
            conn,
            local: Mutex::new(PaneState {
                path: local_path,
                ..Default::default()
            }),
            remote: Mutex::new(PaneState {
                path: "/".to_string(),
                ..Default::default()
            }),
            show_hidden,
        }
    }

    pub fn connection(&self) -> Arc<ConnectionManager> {
        self.conn.clone()
    }

    pub fn path(&self, side: Side) -> String {
        self.pane(side).lock().path.clone()
    }

    pub fn set_path(&self, side: Side, path: String) {
        self.pane(side).lock().path = path;
    }

    pub fn entries(&self, side: Side) -> Vec<FileEntry> {
        self.pane(side).lock().entries.clone()
    }

    /// Path arithmetic only; existence is confirmed by the refresh
    /// that follows.
    pub fn navigate(&self, side: Side, segment: &str) -> String {
        let mut pane = self.pane(side).lock();
        pane.path = navigate_path(&pane.path, segment);
        pane.path.clone()
    }

    pub fn toggle_selection(&self, side: Side, name: &str) {
        let mut pane = self.pane(side).lock();
        if !pane.selection.remove(name) {
            pane.selection.insert(name.to_string());
        }
    }

    pub fn selected(&self, side: Side) -> Vec<String> {
        let pane = self.pane(side).lock();
        let mut names: Vec<String> = pane.selection.iter().cloned().collect();
        names.sort();
        names
    }

    pub fn clear_selection(&self, side: Side) {
        self.pane(side).lock().selection.clear();
    }

    /// Fully replaces the local slot and clears the local selection.
    pub async fn refresh_local(&self) -> Result<Vec<FileEntry>, CoreError> {
        let (ticket, path) = self.issue(Side::Local);
        let mut entries = local::list_dir(&PathBuf::from(&path), self.show_hidden).await?;
        sort_entries(&mut entries);
        self.apply(Side::Local, ticket, entries.clone());
        Ok(entries)
    }

    /// Fully replaces the remote slot and clears the remote
    /// selection. Requires an active session; an empty success is
    /// never substituted for `NotConnected`.
    pub async fn refresh_remote(&self) -> Result<Vec<FileEntry>, CoreError> {
        let (ticket, path) = self.issue(Side::Remote);
        let mut entries = self.conn.list_remote(&path).await?;
        sort_entries(&mut entries);
        self.apply(Side::Remote, ticket, entries.clone());
        Ok(entries)
    }

    /// Empty a pane outright (remote pane on disconnect).
    pub fn clear_entries(&self, side: Side) {
        let mut pane = self.pane(side).lock();
        pane.entries.clear();
        pane.selection.clear();
    }

    fn pane(&self, side: Side) -> &Mutex<PaneState> {
        match side {
            Side::Local => &self.local,
            Side::Remote => &self.remote,
        }
    }

    fn issue(&self, side: Side) -> (u64, String) {
        let mut pane = self.pane(side).lock();
        pane.issued += 1;
        (pane.issued, pane.path.clone())
    }

    fn apply(&self, side: Side, ticket: u64, entries: Vec<FileEntry>) {
        let mut pane = self.pane(side).lock();
        if ticket <= pane.applied {
            debug!(?side, ticket, applied = pane.applied, "stale listing discarded");
            return;
        }
        pane.applied = ticket;
        pane.entries = entries;
        pane.selection.clear();
    }
}

/// `".."` pops one segment and never underflows past `/`; a named
/// segment joins with exactly one separator.
pub fn navigate_path(current: &str, segment: &str) -> String {
    if segment == ".." {
        let trimmed = current.trim_end_matches('/');
        match trimmed.rfind('/') {
            Some(0) | None => "/".to_string(),
            Some(idx) => trimmed[..idx].to_string(),
        }
    } else if current.ends_with('/') {
        format!("{current}{segment}")
    } else {
        format!("{current}/{segment}")
    }
}

/// Join a base directory and a file name with exactly one separator.
pub fn join_path(base: &str, name: &str) -> String {
    if base.ends_with('/') {
        format!("{base}{name}")
    } else {
        format!("{base}/{name}")
    }
}

fn sort_entries(entries: &mut [FileEntry]) {
    entries.sort_by(|a, b| {
        b.is_dir
            .cmp(&a.is_dir)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });
}

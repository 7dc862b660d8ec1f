use crate::error::CoreError;
use crate::listing::FileEntry;
use chrono::{DateTime, Utc};
use std::path::Path;

/// Local filesystem capability. OS-level failures surface verbatim as
/// [`CoreError::Io`].
pub async fn list_dir(path: &Path, show_hidden: bool) -> Result<Vec<FileEntry>, CoreError> {
    let mut entries = Vec::new();
    let mut rd = tokio::fs::read_dir(path).await?;
    while let Some(entry) = rd.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !show_hidden && name.starts_with('.') {
            continue;
        }
        let meta = entry.metadata().await?;
        let is_dir = meta.is_dir();
        entries.push(FileEntry {
            name,
            is_dir,
            size: if is_dir { 0 } else { meta.len() },
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
        });
    }
    Ok(entries)
}

pub async fn mkdir(parent: &Path, name: &str) -> Result<(), CoreError> {
    tokio::fs::create_dir(parent.join(name)).await?;
    Ok(())
}

pub async fn remove(path: &Path) -> Result<(), CoreError> {
    let meta = tokio::fs::metadata(path).await?;
    if meta.is_dir() {
        tokio::fs::remove_dir_all(path).await?;
    } else {
        tokio::fs::remove_file(path).await?;
    }
    Ok(())
}

pub async fn rename(from: &Path, to: &Path) -> Result<(), CoreError> {
    tokio::fs::rename(from, to).await?;
    Ok(())
}

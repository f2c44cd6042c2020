// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::checkpoint::{checkpoint_key, CheckpointEntry};
use crate::domain::repositories::checkpoint_store::CheckpointStore;
use crate::utils::errors::CheckpointError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// 文件检查点存储
///
/// 全部条目保存在一个 JSON 数组中。每次写入先写临时文件、落盘，
/// 再原子重命名覆盖，进程在任意时刻退出都不会留下半个文件。
pub struct FileCheckpointStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, CheckpointEntry>>,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, entries: &HashMap<String, CheckpointEntry>) -> Result<(), CheckpointError> {
        let mut sorted: Vec<&CheckpointEntry> = entries.values().collect();
        sorted.sort_by(|a, b| (a.job_id, &a.url).cmp(&(b.job_id, &b.url)));
        let body = serde_json::to_vec_pretty(&sorted)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let mut file = fs::File::create(&tmp).await?;
        file.write_all(&body).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp, &self.path).await?;
        debug!(entries = sorted.len(), path = %self.path.display(), "Checkpoint file written");
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self) -> Result<(), CheckpointError> {
        let body = match fs::read(&self.path).await {
            Ok(body) => body,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No checkpoint file yet");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let loaded: Vec<CheckpointEntry> = serde_json::from_slice(&body)?;
        let mut entries = self.entries.lock().await;
        entries.clear();
        entries.extend(loaded.into_iter().map(|e| (e.key(), e)));
        info!(entries = entries.len(), path = %self.path.display(), "Checkpoints loaded");
        Ok(())
    }

    async fn is_done(&self, job_id: Uuid, url: &str) -> Result<bool, CheckpointError> {
        let entries = self.entries.lock().await;
        Ok(entries.contains_key(&checkpoint_key(job_id, url)))
    }

    async fn get(&self, job_id: Uuid, url: &str) -> Result<Option<CheckpointEntry>, CheckpointError> {
        let entries = self.entries.lock().await;
        Ok(entries.get(&checkpoint_key(job_id, url)).cloned())
    }

    async fn record(&self, entry: CheckpointEntry) -> Result<(), CheckpointError> {
        let mut entries = self.entries.lock().await;
        if entries
            .get(&entry.key())
            .is_some_and(|existing| existing.same_result(&entry))
        {
            return Ok(());
        }

        let key = entry.key();
        let previous = entries.insert(key.clone(), entry);
        if let Err(e) = self.persist(&entries).await {
            // 内存状态不能领先于磁盘
            match previous {
                Some(previous) => entries.insert(key, previous),
                None => entries.remove(&key),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn clear(&self, job_id: Uuid, url: &str) -> Result<(), CheckpointError> {
        let mut entries = self.entries.lock().await;
        if entries.remove(&checkpoint_key(job_id, url)).is_some() {
            self.persist(&entries).await?;
        }
        Ok(())
    }

    async fn clear_job(&self, job_id: Uuid) -> Result<u64, CheckpointError> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, e| e.job_id != job_id);
        let removed = (before - entries.len()) as u64;
        if removed > 0 {
            self.persist(&entries).await?;
        }
        Ok(removed)
    }

    async fn flush(&self) -> Result<(), CheckpointError> {
        let entries = self.entries.lock().await;
        self.persist(&entries).await
    }
}

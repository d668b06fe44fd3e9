//! 检查点存储
//!
//! 检查点即序列化后的 [`BatchRun`]。写入时先写临时文件再重命名，
//! 中途被打断也不会留下半个文件。

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{AppError, AppResult, BatchError};
use crate::models::BatchRun;

pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn error(&self, reason: impl ToString) -> AppError {
        AppError::Batch(BatchError::Checkpoint {
            path: self.path.display().to_string(),
            reason: reason.to_string(),
        })
    }

    pub async fn save(&self, run: &BatchRun) -> AppResult<()> {
        let json = serde_json::to_vec_pretty(run).map_err(|e| self.error(e))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.error(e))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| self.error(e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.error(e))?;

        debug!(
            "检查点已保存: {} (cursor={}, cost={:.4})",
            self.path.display(),
            run.cursor,
            run.cost_spent
        );
        Ok(())
    }

    /// 读取检查点，文件不存在时返回 `None`
    pub async fn load(&self) -> AppResult<Option<BatchRun>> {
        let exists = tokio::fs::try_exists(&self.path)
            .await
            .map_err(|e| self.error(e))?;
        if !exists {
            return Ok(None);
        }

        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| self.error(e))?;
        let run = serde_json::from_slice(&bytes).map_err(|e| self.error(e))?;
        Ok(Some(run))
    }

    pub async fn clear(&self) -> AppResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.error(e)),
        }
    }
}

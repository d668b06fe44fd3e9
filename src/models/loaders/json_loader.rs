//! 法条 / 考题 / 预计算向量的 JSON 加载

use std::collections::HashMap;
use std::path::Path;

use serde::de::DeserializeOwned;
use tokio::fs;
use tracing::{info, warn};

use crate::error::{AppError, AppResult, FileError};
use crate::models::{ExamQuestion, LawArticle};

async fn read_json<T: DeserializeOwned>(path: &Path) -> AppResult<T> {
    if !fs::try_exists(path).await.unwrap_or(false) {
        return Err(AppError::File(FileError::NotFound {
            path: path.display().to_string(),
        }));
    }

    let content = fs::read_to_string(path)
        .await
        .map_err(|e| AppError::file_read_failed(path.display().to_string(), e))?;

    serde_json::from_str(&content).map_err(|e| {
        AppError::File(FileError::JsonParseFailed {
            path: path.display().to_string(),
            source: e,
        })
    })
}

/// 加载法条列表
///
/// 重复的法条编号只保留第一条
pub async fn load_articles(path: impl AsRef<Path>) -> AppResult<Vec<LawArticle>> {
    let path = path.as_ref();
    let articles: Vec<LawArticle> = read_json(path).await?;

    let mut seen = std::collections::HashSet::new();
    let total = articles.len();
    let articles: Vec<LawArticle> = articles
        .into_iter()
        .filter(|a| {
            let fresh = seen.insert(a.article_id());
            if !fresh {
                warn!("重复的法条编号，已忽略: {}", a.article_id());
            }
            fresh
        })
        .collect();

    info!(
        "✓ 成功加载 {} 条法条 (原始 {} 条): {}",
        articles.len(),
        total,
        path.display()
    );
    Ok(articles)
}

/// 加载考题列表
pub async fn load_questions(path: impl AsRef<Path>) -> AppResult<Vec<ExamQuestion>> {
    let path = path.as_ref();
    let questions: Vec<ExamQuestion> = read_json(path).await?;
    info!("✓ 成功加载 {} 道考题: {}", questions.len(), path.display());
    Ok(questions)
}

/// 加载预计算向量（编号 → 向量）
pub async fn load_vectors(path: impl AsRef<Path>) -> AppResult<HashMap<String, Vec<f32>>> {
    let path = path.as_ref();
    let vectors: HashMap<String, Vec<f32>> = read_json(path).await?;
    info!("✓ 成功加载 {} 个向量: {}", vectors.len(), path.display());
    Ok(vectors)
}

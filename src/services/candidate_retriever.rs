/// 候选法条检索服务
///
/// 在只读的法条索引上为题目挑选有限数量的候选法条：
/// 题目与全部法条都带有预计算向量时使用余弦相似度，否则全部退化为字符二元组重合度。
/// 选择题另按"题干 + 单个选项"逐项召回，命中的法条标注对应的选项字母。
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::config::RetrievalConfig;
use crate::models::{ExamQuestion, LawArticle};

/// 候选法条
#[derive(Debug, Clone)]
pub struct Candidate {
    pub article: Arc<LawArticle>,
    pub article_id: String,
    pub similarity: f32,
    /// 按选项召回时命中该法条的选项字母，按字母顺序排列
    pub options: Vec<char>,
}

struct IndexedArticle {
    article: Arc<LawArticle>,
    article_id: String,
    vector: Option<Vec<f32>>,
    bigrams: HashSet<(char, char)>,
}

/// 法条索引，启动时构建一次，之后在所有任务间共享
pub struct ArticleIndex {
    entries: Vec<IndexedArticle>,
}

impl ArticleIndex {
    /// `vectors` 以法条编号为键，缺失的法条只能参与字面匹配
    pub fn new(articles: Vec<LawArticle>, mut vectors: HashMap<String, Vec<f32>>) -> Self {
        let entries = articles
            .into_iter()
            .map(|article| {
                let article_id = article.article_id();
                let vector = vectors.remove(&article_id).filter(|v| !v.is_empty());
                let bigrams = bigrams(&format!("{} {}", article.full_title(), article.content));
                IndexedArticle {
                    article: Arc::new(article),
                    article_id,
                    vector,
                    bigrams,
                }
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn vectorized_count(&self) -> usize {
        self.entries.iter().filter(|e| e.vector.is_some()).count()
    }

    pub fn get(&self, article_id: &str) -> Option<Arc<LawArticle>> {
        self.entries
            .iter()
            .find(|e| e.article_id == article_id)
            .map(|e| Arc::clone(&e.article))
    }
}

/// 候选法条检索器
#[derive(Clone)]
pub struct CandidateRetriever {
    index: Arc<ArticleIndex>,
    config: RetrievalConfig,
}

impl CandidateRetriever {
    pub fn new(index: Arc<ArticleIndex>, config: RetrievalConfig) -> Self {
        Self { index, config }
    }

    pub fn index(&self) -> &ArticleIndex {
        &self.index
    }

    /// 为题目检索候选法条
    ///
    /// 题目级结果按相似度降序排列，相似度相同时按法条编号升序，数量不超过 `top_k`；
    /// 之后追加只在选项级召回中出现的法条（按选项字母顺序），每个选项最多 `option_top_k` 条
    pub fn retrieve(
        &self,
        question: &ExamQuestion,
        query_vector: Option<&[f32]>,
    ) -> Vec<Candidate> {
        // 余弦相似度与字面重合度量纲不同，只有全部法条都有向量时才使用向量
        let query_vector = query_vector
            .filter(|v| !v.is_empty())
            .filter(|_| !self.index.is_empty() && self.index.vectorized_count() == self.index.len());

        let mut scored = match query_vector {
            Some(q) => self.rank(|entry| {
                entry
                    .vector
                    .as_deref()
                    .map_or(0.0, |a| cosine_similarity(q, a))
            }),
            None => {
                let mut text = question.content.clone();
                for option in &question.options {
                    text.push(' ');
                    text.push_str(option);
                }
                let query = bigrams(&text);
                self.rank(|entry| overlap_score(&query, &entry.bigrams))
            }
        };
        scored.truncate(self.config.top_k);

        for (letter, hits) in self.retrieve_options(question) {
            for hit in hits {
                match scored.iter_mut().find(|c| c.article_id == hit.article_id) {
                    Some(existing) => existing.options.push(letter),
                    None => scored.push(Candidate {
                        options: vec![letter],
                        ..hit
                    }),
                }
            }
        }

        debug!(
            "题目 {} 检索到 {} 条候选法条",
            question.question_id,
            scored.len()
        );
        scored
    }

    /// 逐个选项召回法条，查询文本为"题干 + 该选项"
    ///
    /// 选项没有独立向量，始终使用字面重合度
    pub fn retrieve_options(&self, question: &ExamQuestion) -> Vec<(char, Vec<Candidate>)> {
        if self.config.option_top_k == 0 {
            return Vec::new();
        }
        question
            .lettered_options()
            .filter(|(_, option)| !option.trim().is_empty())
            .map(|(letter, option)| {
                let query = bigrams(&format!("{} {}", question.content, option));
                let mut hits = self.rank(|entry| overlap_score(&query, &entry.bigrams));
                hits.truncate(self.config.option_top_k);
                (letter, hits)
            })
            .collect()
    }

    fn rank(&self, score: impl Fn(&IndexedArticle) -> f32) -> Vec<Candidate> {
        let mut scored: Vec<Candidate> = self
            .index
            .entries
            .iter()
            .map(|entry| Candidate {
                article: Arc::clone(&entry.article),
                article_id: entry.article_id.clone(),
                similarity: score(entry),
                options: Vec::new(),
            })
            .filter(|c| c.similarity > 0.0 && c.similarity >= self.config.min_similarity)
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.article_id.cmp(&b.article_id))
        });
        scored
    }
}

/// 余弦相似度，维度不一致或零向量时为 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

fn bigrams(text: &str) -> HashSet<(char, char)> {
    let chars: Vec<char> = text
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_ascii_punctuation())
        .collect();
    chars.windows(2).map(|w| (w[0], w[1])).collect()
}

/// 题目二元组中被法条覆盖的比例
fn overlap_score(query: &HashSet<(char, char)>, article: &HashSet<(char, char)>) -> f32 {
    if query.is_empty() {
        return 0.0;
    }
    let shared = query.intersection(article).count();
    shared as f32 / query.len() as f32
}

pub mod analysis;
pub mod article;
pub mod batch_run;
pub mod loaders;
pub mod question;

pub use analysis::{AnalysisResult, ConfidenceLevel, MatchPayload, Provenance};
pub use article::LawArticle;
pub use batch_run::{fingerprint, BatchRun, QuestionOutcome, RunStatus};
pub use loaders::{load_articles, load_questions, load_vectors};
pub use question::{ExamQuestion, QuestionType};

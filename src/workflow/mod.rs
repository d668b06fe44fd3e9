pub mod matching_engine;
pub mod question_ctx;

pub use matching_engine::{Evaluation, MatchingEngine};
pub use question_ctx::QuestionCtx;

pub mod candidate_retriever;
pub mod retry_controller;

pub use candidate_retriever::{ArticleIndex, Candidate, CandidateRetriever};
pub use retry_controller::{CallOutcome, CallState, ChainFailure, RetryController};

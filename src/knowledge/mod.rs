//! 醫學知識庫：預處理、TF-IDF 索引與檢索。

pub mod preprocessor;
pub mod retriever;
pub mod tfidf;

pub use preprocessor::KnowledgeBasePreprocessor;
pub use retriever::{KnowledgeBaseRetriever, RetrievedKnowledge};

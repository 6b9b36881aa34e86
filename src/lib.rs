//! Top News: daily AI newsletter digest: fetch, clean, extract, rank,
//! enrich, persist.

pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod scheduler;
pub mod source;
pub mod store;

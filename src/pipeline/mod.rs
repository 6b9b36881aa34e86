//! News pipeline.
//!
//! Every run flows through:
//! 1. `MailSource::fetch()`: whitelisted newsletter emails
//! 2. `Stages::clean()` / `Stages::extract()`: per-email model calls
//! 3. `Scorer`: keyword hits times sender authority
//! 4. `ranker::rank_with_stats()`: global sort, fuzzy title dedup, truncate
//! 5. `Stages::enrich()`: social content per surviving story
//! 6. `Database::insert_stories()`: persisted in rank order

pub mod chunker;
pub mod guard;
pub mod orchestrator;
pub mod prompts;
pub mod ranker;
pub mod scorer;
pub mod stages;
pub mod types;

pub use chunker::{ChunkMode, Chunker};
pub use guard::{CancelFlag, RunGuard, RunToken};
pub use orchestrator::{NewsPipeline, RunSettings};
pub use prompts::Prompts;
pub use scorer::Scorer;
pub use stages::Stages;
pub use types::{
    Email, EnrichedStory, RankingConfig, RunOutcome, RunReport, RunStage, SocialContent,
    StoryCandidate,
};

//! Pipeline orchestrator: turns a batch of newsletter emails into ranked,
//! enriched, persisted stories.
//!
//! Flow per run:
//! 1. Persist every email (insert-if-absent)
//! 2. Per email, in input order: clean → extract (chunked) → stamp → score
//! 3. Global rank + fuzzy dedup over all candidates
//! 4. Enrich each survivor with social content
//! 5. Persist the enriched stories
//!
//! Model failures degrade a single item; only persistence and mail-source
//! failures end a run early.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::pipeline::guard::{CancelFlag, RunGuard, RunToken};
use crate::pipeline::ranker;
use crate::pipeline::scorer::Scorer;
use crate::pipeline::stages::Stages;
use crate::pipeline::types::{
    Email, EnrichedStory, RankingConfig, RunOutcome, RunReport, RunStage, StoryCandidate,
};
use crate::source::MailSource;
use crate::store::Database;

/// Whitelist and ranking inputs for one run, after merging stored settings.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub whitelist: Vec<String>,
    pub ranking: RankingConfig,
}

/// Per-email result of the clean + extract step.
enum EmailResult {
    Skipped,
    Extracted(Vec<StoryCandidate>),
}

/// The news pipeline. Admits one run at a time.
pub struct NewsPipeline {
    stages: Stages,
    store: Arc<dyn Database>,
    guard: RunGuard,
    concurrency: usize,
}

impl NewsPipeline {
    pub fn new(stages: Stages, store: Arc<dyn Database>) -> Self {
        Self {
            stages,
            store,
            guard: RunGuard::new(),
            concurrency: 1,
        }
    }

    /// Emails cleaned and extracted concurrently. Results keep input order.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn guard(&self) -> &RunGuard {
        &self.guard
    }

    pub fn store(&self) -> &Arc<dyn Database> {
        &self.store
    }

    /// Merge configured settings with those stored in the database.
    ///
    /// Whitelist: configured senders plus stored newsletter addresses.
    /// Keywords: stored priority keywords when any exist, else configured.
    pub async fn resolve_settings(
        &self,
        senders: &[String],
        ranking: &RankingConfig,
    ) -> Result<RunSettings, PipelineError> {
        let mut whitelist: Vec<String> = Vec::new();
        let stored = self.store.newsletter_addresses().await?;
        for sender in senders.iter().chain(stored.iter()) {
            let sender = sender.trim();
            if !sender.is_empty() && !whitelist.iter().any(|w| w.eq_ignore_ascii_case(sender)) {
                whitelist.push(sender.to_string());
            }
        }

        let mut ranking = ranking.clone();
        let stored_keywords = self.store.priority_keywords().await?;
        if !stored_keywords.is_empty() {
            debug!(count = stored_keywords.len(), "Using stored priority keywords");
            ranking.keywords = stored_keywords;
        }

        Ok(RunSettings { whitelist, ranking })
    }

    /// Fetch from `source` and run the pipeline over the result.
    pub async fn run_from_source(
        &self,
        source: &dyn MailSource,
        settings: &RunSettings,
        since: Option<DateTime<Utc>>,
        limit: usize,
        cancel: &CancelFlag,
    ) -> Result<RunOutcome, PipelineError> {
        let token = self.guard.try_acquire()?;

        if settings.whitelist.is_empty() {
            warn!("No newsletter senders configured, skipping fetch");
            return Ok(RunOutcome::EmptyWhitelist);
        }

        token.advance(RunStage::Fetching);
        info!(senders = settings.whitelist.len(), ?since, limit, "Fetching newsletter emails");
        let emails = source.fetch(&settings.whitelist, since, limit).await?;

        self.execute(&token, emails, &settings.ranking, cancel).await
    }

    /// Run the pipeline over an already-fetched batch.
    pub async fn run(
        &self,
        emails: Vec<Email>,
        ranking: &RankingConfig,
        cancel: &CancelFlag,
    ) -> Result<RunOutcome, PipelineError> {
        let token = self.guard.try_acquire()?;
        self.execute(&token, emails, ranking, cancel).await
    }

    async fn execute(
        &self,
        token: &RunToken,
        emails: Vec<Email>,
        ranking: &RankingConfig,
        cancel: &CancelFlag,
    ) -> Result<RunOutcome, PipelineError> {
        if emails.is_empty() {
            info!("No emails to process");
            return Ok(RunOutcome::NoEmails);
        }

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, emails = emails.len(), model = self.stages.client().model_name(), "Pipeline run started");

        // ── Persist inputs ──────────────────────────────────────────
        cancel.check()?;
        let mut new_emails = 0usize;
        for email in &emails {
            if self.store.insert_email_if_absent(email).await? {
                new_emails += 1;
            }
        }
        debug!(new_emails, total = emails.len(), "Emails recorded");

        // ── Per-email clean + extract ───────────────────────────────
        token.advance(RunStage::PerEmailProcessing);
        let scorer = Scorer::new(&ranking.keywords, &ranking.authority);
        let work: Vec<BoxFuture<'_, Result<EmailResult, PipelineError>>> = emails
            .iter()
            .map(|email| self.process_email(email, &scorer, cancel).boxed())
            .collect();
        let results: Vec<Result<EmailResult, PipelineError>> = futures::stream::iter(work)
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut candidates = Vec::new();
        let mut emails_skipped = 0usize;
        for result in results {
            match result? {
                EmailResult::Skipped => emails_skipped += 1,
                EmailResult::Extracted(found) => candidates.extend(found),
            }
        }
        let candidate_count = candidates.len();

        // ── Global ranking ──────────────────────────────────────────
        token.advance(RunStage::GlobalRanking);
        let ranked = ranker::rank_with_stats(
            candidates,
            ranking.target_count,
            ranking.similarity_threshold,
        );
        info!(
            candidates = candidate_count,
            kept = ranked.kept.len(),
            duplicates = ranked.duplicates_dropped,
            "Ranking complete"
        );

        // ── Enrichment ──────────────────────────────────────────────
        token.advance(RunStage::Enriching);
        let mut stories = Vec::with_capacity(ranked.kept.len());
        for story in ranked.kept {
            cancel.check()?;
            let social = self.stages.enrich(&story.title, &story.summary).await;
            stories.push(EnrichedStory::new(story, social));
        }

        // ── Persistence ─────────────────────────────────────────────
        cancel.check()?;
        token.advance(RunStage::Persisting);
        self.store.insert_stories(&stories).await?;

        token.advance(RunStage::Done);
        let report = RunReport {
            run_id,
            stories,
            emails_fetched: emails.len(),
            emails_skipped,
            candidates: candidate_count,
            duplicates_dropped: ranked.duplicates_dropped,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            %run_id,
            stories = report.stories.len(),
            skipped = emails_skipped,
            elapsed_ms = (report.finished_at - started_at).num_milliseconds(),
            "Pipeline run complete"
        );
        Ok(RunOutcome::Completed(report))
    }

    async fn process_email(
        &self,
        email: &Email,
        scorer: &Scorer,
        cancel: &CancelFlag,
    ) -> Result<EmailResult, PipelineError> {
        cancel.check()?;

        if email.body.trim().is_empty() {
            warn!(id = %email.id, "Email body is empty, skipping");
            return Ok(EmailResult::Skipped);
        }

        let cleaned = self.stages.clean(&email.body).await;
        if cleaned.is_empty() {
            warn!(id = %email.id, subject = %email.subject, "Clean produced no text, skipping");
            return Ok(EmailResult::Skipped);
        }

        let mut candidates: Vec<StoryCandidate> = self
            .stages
            .extract(&cleaned, cancel)
            .await?
            .into_iter()
            .map(|story| story.into_candidate(email))
            .collect();
        scorer.score_all(&mut candidates);

        debug!(id = %email.id, stories = candidates.len(), "Email processed");
        Ok(EmailResult::Extracted(candidates))
    }
}

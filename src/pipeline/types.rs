//! Shared types for the news pipeline.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Email ───────────────────────────────────────────────────────────

/// A newsletter email as delivered by the mail source.
///
/// Immutable once fetched. Persisted once per `id`; the first write wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Email {
    /// Unique, source-native identifier (Message-ID, provider id).
    pub id: String,
    pub subject: String,
    /// Bare sender address (no display name).
    pub sender_email: String,
    /// RFC 3339 send date.
    pub date_iso: String,
    /// Plain-text body.
    pub body: String,
}

// ── Story candidate ─────────────────────────────────────────────────

/// An extracted, scored, not-yet-deduplicated story.
///
/// Carries the provenance (`sender_email`, `date_iso`) of the email it was
/// extracted from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryCandidate {
    pub title: String,
    pub summary: String,
    pub date_iso: String,
    pub sender_email: String,
    pub score: f64,
}

impl StoryCandidate {
    /// Build an unscored candidate stamped with its email's provenance.
    pub fn from_email(title: impl Into<String>, summary: impl Into<String>, email: &Email) -> Self {
        Self {
            title: title.into(),
            summary: summary.into(),
            date_iso: email.date_iso.clone(),
            sender_email: email.sender_email.clone(),
            score: 0.0,
        }
    }
}

// ── Enrichment ──────────────────────────────────────────────────────

/// Social-post variants produced for one story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialContent {
    #[serde(rename = "linkedIn")]
    pub linkedin: String,
    /// ≤280 characters by prompt contract; not enforced on model output.
    pub x_post: String,
    pub branding_tag: String,
    pub action_suggestion: String,
}

/// A surviving story with its social content, ready to persist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedStory {
    pub id: Uuid,
    #[serde(flatten)]
    pub story: StoryCandidate,
    #[serde(flatten)]
    pub social: SocialContent,
}

impl EnrichedStory {
    /// Attach social content and assign a fresh identifier.
    pub fn new(story: StoryCandidate, social: SocialContent) -> Self {
        Self {
            id: Uuid::new_v4(),
            story,
            social,
        }
    }
}

// ── Run configuration ───────────────────────────────────────────────

/// Resolved ranking inputs for one run.
#[derive(Debug, Clone)]
pub struct RankingConfig {
    /// Maximum number of stories kept.
    pub target_count: usize,
    /// Titles more similar than this (0.0–1.0) are duplicates.
    pub similarity_threshold: f64,
    /// Priority keywords, each worth 1.0 when present.
    pub keywords: Vec<String>,
    /// Sender → score multiplier.
    pub authority: HashMap<String, f64>,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            target_count: 10,
            similarity_threshold: 0.85,
            keywords: Vec::new(),
            authority: HashMap::new(),
        }
    }
}

// ── Run results ─────────────────────────────────────────────────────

/// Stage of an active run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Idle,
    Fetching,
    PerEmailProcessing,
    GlobalRanking,
    Enriching,
    Persisting,
    Done,
}

impl RunStage {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::PerEmailProcessing => "per_email_processing",
            Self::GlobalRanking => "global_ranking",
            Self::Enriching => "enriching",
            Self::Persisting => "persisting",
            Self::Done => "done",
        }
    }

    pub(crate) fn as_u8(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Fetching,
            2 => Self::PerEmailProcessing,
            3 => Self::GlobalRanking,
            4 => Self::Enriching,
            5 => Self::Persisting,
            6 => Self::Done,
            _ => Self::Idle,
        }
    }
}

/// Statistics and results of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    /// Persisted stories in rank order.
    pub stories: Vec<EnrichedStory>,
    pub emails_fetched: usize,
    /// Emails whose clean step produced nothing.
    pub emails_skipped: usize,
    /// Candidates extracted across all emails.
    pub candidates: usize,
    /// Candidates dropped as near-duplicates of a kept story.
    pub duplicates_dropped: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// How a run ended.
///
/// `EmptyWhitelist` and `NoEmails` are normal terminal states, kept
/// distinct from a completed run that found nothing worth keeping.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// No newsletter senders configured; nothing was fetched.
    EmptyWhitelist,
    /// The source returned no emails.
    NoEmails,
    /// Emails were processed; `stories` may still be empty.
    Completed(RunReport),
}

impl RunOutcome {
    /// Stories produced by the run (empty for the no-op outcomes).
    pub fn stories(&self) -> &[EnrichedStory] {
        match self {
            Self::Completed(report) => &report.stories,
            Self::EmptyWhitelist | Self::NoEmails => &[],
        }
    }

    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::EmptyWhitelist => "empty_whitelist",
            Self::NoEmails => "no_emails",
            Self::Completed(_) => "completed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email() -> Email {
        Email {
            id: "m-1".into(),
            subject: "Daily AI".into(),
            sender_email: "news@example.com".into(),
            date_iso: "2026-10-16T07:00:00+00:00".into(),
            body: "body".into(),
        }
    }

    #[test]
    fn candidate_carries_email_provenance() {
        let c = StoryCandidate::from_email("Title", "Summary", &email());
        assert_eq!(c.sender_email, "news@example.com");
        assert_eq!(c.date_iso, "2026-10-16T07:00:00+00:00");
        assert_eq!(c.score, 0.0);
    }

    #[test]
    fn enriched_story_gets_unique_ids() {
        let social = SocialContent {
            linkedin: "l".into(),
            x_post: "x".into(),
            branding_tag: "#AI".into(),
            action_suggestion: "Read more".into(),
        };
        let c = StoryCandidate::from_email("T", "S", &email());
        let a = EnrichedStory::new(c.clone(), social.clone());
        let b = EnrichedStory::new(c, social);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn enriched_story_serializes_flat() {
        let social = SocialContent {
            linkedin: "post".into(),
            x_post: "tweet".into(),
            branding_tag: "#AI".into(),
            action_suggestion: "Share".into(),
        };
        let story = EnrichedStory::new(StoryCandidate::from_email("T", "S", &email()), social);
        let json = serde_json::to_value(&story).unwrap();
        assert_eq!(json["title"], "T");
        assert_eq!(json["linkedIn"], "post");
        assert_eq!(json["x_post"], "tweet");
    }

    #[test]
    fn run_stage_u8_roundtrip() {
        for stage in [
            RunStage::Idle,
            RunStage::Fetching,
            RunStage::PerEmailProcessing,
            RunStage::GlobalRanking,
            RunStage::Enriching,
            RunStage::Persisting,
            RunStage::Done,
        ] {
            assert_eq!(RunStage::from_u8(stage.as_u8()), stage);
        }
    }

    #[test]
    fn no_op_outcomes_have_no_stories() {
        assert!(RunOutcome::EmptyWhitelist.stories().is_empty());
        assert!(RunOutcome::NoEmails.stories().is_empty());
        assert_eq!(RunOutcome::NoEmails.label(), "no_emails");
    }
}

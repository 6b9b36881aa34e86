//! `Database` trait: the single async interface for all persistence.
//!
//! Writes are append or idempotent-insert only. Settings tables are
//! replaced wholesale.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::DatabaseError;
use crate::pipeline::types::{Email, EnrichedStory};

/// An email row with its ingestion time.
#[derive(Debug, Clone, Serialize)]
pub struct StoredEmail {
    #[serde(flatten)]
    pub email: Email,
    pub fetched_at: DateTime<Utc>,
}

/// A story row with its processing time.
#[derive(Debug, Clone, Serialize)]
pub struct StoredStory {
    #[serde(flatten)]
    pub story: EnrichedStory,
    pub processed_at: DateTime<Utc>,
}

/// A whitelisted newsletter sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsletterAddress {
    /// Display name of the newsletter.
    pub sender: String,
    pub email: String,
    /// Higher sorts first.
    pub priority: i64,
}

impl NewsletterAddress {
    pub fn new(sender: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            email: email.into(),
            priority: 0,
        }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }
}

/// Backend-agnostic persistence for emails, stories, and run settings.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Emails ──────────────────────────────────────────────────────

    /// Insert unless an email with the same id exists. Returns whether a row
    /// was written; the first write wins.
    async fn insert_email_if_absent(&self, email: &Email) -> Result<bool, DatabaseError>;

    /// Most recently fetched emails first.
    async fn fetched_emails(&self, limit: usize) -> Result<Vec<StoredEmail>, DatabaseError>;

    // ── Stories ─────────────────────────────────────────────────────

    async fn insert_story(&self, story: &EnrichedStory) -> Result<(), DatabaseError>;

    /// Insert one run's stories in rank order.
    async fn insert_stories(&self, stories: &[EnrichedStory]) -> Result<(), DatabaseError> {
        for story in stories {
            self.insert_story(story).await?;
        }
        Ok(())
    }

    /// Most recently processed stories first, highest score first within a run.
    async fn latest_stories(&self, limit: usize) -> Result<Vec<StoredStory>, DatabaseError>;

    // ── Settings ────────────────────────────────────────────────────

    /// Whitelisted sender addresses, highest priority first.
    async fn newsletter_addresses(&self) -> Result<Vec<String>, DatabaseError>;

    async fn replace_newsletter_addresses(
        &self,
        addresses: &[NewsletterAddress],
    ) -> Result<(), DatabaseError>;

    /// Stored priority keywords, empty when none are configured.
    async fn priority_keywords(&self) -> Result<Vec<String>, DatabaseError>;

    async fn replace_priority_keywords(&self, keywords: &[String]) -> Result<(), DatabaseError>;
}

//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::pipeline::types::{Email, EnrichedStory, SocialContent, StoryCandidate};
use crate::store::migrations;
use crate::store::traits::{Database, NewsletterAddress, StoredEmail, StoredStory};

const EMAIL_COLUMNS: &str = "id, subject, sender_email, date_iso, body, fetched_at";

const STORY_COLUMNS: &str = "id, title, summary, linkedin, x_post, branding_tag, \
     action_suggestion, score, date_iso, sender_email, processed_at";

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Canonical timestamp format; sorts lexicographically.
fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Map a libsql Row to a StoredEmail. Column order matches EMAIL_COLUMNS.
fn row_to_email(row: &libsql::Row) -> Result<StoredEmail, libsql::Error> {
    let fetched_str: String = row.get(5)?;
    Ok(StoredEmail {
        email: Email {
            id: row.get(0)?,
            subject: row.get(1)?,
            sender_email: row.get(2)?,
            date_iso: row.get(3)?,
            body: row.get(4)?,
        },
        fetched_at: parse_datetime(&fetched_str),
    })
}

/// Map a libsql Row to a StoredStory. Column order matches STORY_COLUMNS.
fn row_to_story(row: &libsql::Row) -> Result<StoredStory, libsql::Error> {
    let id_str: String = row.get(0)?;
    let processed_str: String = row.get(10)?;
    // SQLite stores NaN as NULL.
    let score: f64 = row.get(7).unwrap_or(f64::NAN);

    Ok(StoredStory {
        story: EnrichedStory {
            id: Uuid::parse_str(&id_str).unwrap_or_default(),
            story: StoryCandidate {
                title: row.get(1)?,
                summary: row.get(2)?,
                date_iso: row.get(8)?,
                sender_email: row.get(9)?,
                score,
            },
            social: SocialContent {
                linkedin: row.get(3)?,
                x_post: row.get(4)?,
                branding_tag: row.get(5)?,
                action_suggestion: row.get(6)?,
            },
        },
        processed_at: parse_datetime(&processed_str),
    })
}

async fn insert_story_row(
    conn: &Connection,
    story: &EnrichedStory,
    processed_at: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        &format!(
            "INSERT INTO top_stories ({STORY_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
        ),
        params![
            story.id.to_string(),
            story.story.title.as_str(),
            story.story.summary.as_str(),
            story.social.linkedin.as_str(),
            story.social.x_post.as_str(),
            story.social.branding_tag.as_str(),
            story.social.action_suggestion.as_str(),
            story.story.score,
            story.story.date_iso.as_str(),
            story.story.sender_email.as_str(),
            processed_at,
        ],
    )
    .await
    .map_err(|e| DatabaseError::Query(format!("insert_story: {e}")))?;
    Ok(())
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Emails ──────────────────────────────────────────────────────

    async fn insert_email_if_absent(&self, email: &Email) -> Result<bool, DatabaseError> {
        let inserted = self
            .conn()
            .execute(
                &format!(
                    "INSERT OR IGNORE INTO emails ({EMAIL_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
                ),
                params![
                    email.id.as_str(),
                    email.subject.as_str(),
                    email.sender_email.as_str(),
                    email.date_iso.as_str(),
                    email.body.as_str(),
                    timestamp(Utc::now()),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_email_if_absent: {e}")))?;

        debug!(id = %email.id, inserted = inserted > 0, "Email persisted");
        Ok(inserted > 0)
    }

    async fn fetched_emails(&self, limit: usize) -> Result<Vec<StoredEmail>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {EMAIL_COLUMNS} FROM emails ORDER BY fetched_at DESC, rowid DESC LIMIT ?1"
                ),
                params![limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("fetched_emails: {e}")))?;

        let mut emails = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_email(&row) {
                Ok(email) => emails.push(email),
                Err(e) => warn!("Skipping email row: {e}"),
            }
        }
        Ok(emails)
    }

    // ── Stories ─────────────────────────────────────────────────────

    async fn insert_story(&self, story: &EnrichedStory) -> Result<(), DatabaseError> {
        insert_story_row(self.conn(), story, &timestamp(Utc::now())).await?;
        debug!(id = %story.id, title = %story.story.title, "Story persisted");
        Ok(())
    }

    async fn insert_stories(&self, stories: &[EnrichedStory]) -> Result<(), DatabaseError> {
        let processed_at = timestamp(Utc::now());
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_stories: {e}")))?;

        for story in stories {
            insert_story_row(&tx, story, &processed_at).await?;
        }

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_stories commit: {e}")))?;
        info!(count = stories.len(), "Stories persisted");
        Ok(())
    }

    async fn latest_stories(&self, limit: usize) -> Result<Vec<StoredStory>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {STORY_COLUMNS} FROM top_stories
                     ORDER BY processed_at DESC, rowid ASC LIMIT ?1"
                ),
                params![limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("latest_stories: {e}")))?;

        let mut stories = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_story(&row) {
                Ok(story) => stories.push(story),
                Err(e) => warn!("Skipping story row: {e}"),
            }
        }
        Ok(stories)
    }

    // ── Settings ────────────────────────────────────────────────────

    async fn newsletter_addresses(&self) -> Result<Vec<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT email FROM newsletter_addresses
                 WHERE TRIM(email) != '' ORDER BY priority DESC, email ASC",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("newsletter_addresses: {e}")))?;

        let mut addresses = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row.get::<String>(0) {
                Ok(email) => addresses.push(email.trim().to_string()),
                Err(e) => warn!("Skipping newsletter address row: {e}"),
            }
        }
        Ok(addresses)
    }

    async fn replace_newsletter_addresses(
        &self,
        addresses: &[NewsletterAddress],
    ) -> Result<(), DatabaseError> {
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("replace_newsletter_addresses: {e}")))?;

        tx.execute("DELETE FROM newsletter_addresses", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("replace_newsletter_addresses: {e}")))?;

        for address in addresses {
            tx.execute(
                "INSERT INTO newsletter_addresses (id, sender, email, priority)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    Uuid::new_v4().to_string(),
                    address.sender.as_str(),
                    address.email.as_str(),
                    address.priority,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("replace_newsletter_addresses: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Query(format!("replace_newsletter_addresses commit: {e}")))?;
        info!(count = addresses.len(), "Newsletter addresses replaced");
        Ok(())
    }

    async fn priority_keywords(&self) -> Result<Vec<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT keyword FROM priority_keywords WHERE TRIM(keyword) != '' ORDER BY rowid",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("priority_keywords: {e}")))?;

        let mut keywords = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row.get::<String>(0) {
                Ok(keyword) => keywords.push(keyword),
                Err(e) => warn!("Skipping keyword row: {e}"),
            }
        }
        Ok(keywords)
    }

    async fn replace_priority_keywords(&self, keywords: &[String]) -> Result<(), DatabaseError> {
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("replace_priority_keywords: {e}")))?;

        tx.execute("DELETE FROM priority_keywords", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("replace_priority_keywords: {e}")))?;

        for keyword in keywords {
            let keyword = keyword.trim();
            if keyword.is_empty() {
                continue;
            }
            tx.execute(
                "INSERT OR IGNORE INTO priority_keywords (keyword) VALUES (?1)",
                params![keyword],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("replace_priority_keywords: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Query(format!("replace_priority_keywords commit: {e}")))?;
        info!(count = keywords.len(), "Priority keywords replaced");
        Ok(())
    }
}

//! Mail source backed by a directory of `.eml` files.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mail_parser::MessageParser;
use tracing::{debug, info, warn};

use super::{MailSource, is_sender_allowed, strip_html};
use crate::error::SourceError;
use crate::pipeline::types::Email;

/// Reads RFC 5322 messages (`*.eml`) from a directory, e.g. one filled by
/// a mail client export or a fetchmail/maildrop rule.
#[derive(Debug, Clone)]
pub struct EmlDirSource {
    dir: PathBuf,
}

impl EmlDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn eml_files(&self) -> Result<Vec<PathBuf>, SourceError> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| SourceError::Unreadable {
                path: self.dir.display().to_string(),
                reason: e.to_string(),
            })?;

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_eml = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("eml"));
            if is_eml && entry.file_type().await?.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl MailSource for EmlDirSource {
    async fn fetch(
        &self,
        whitelist: &[String],
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Email>, SourceError> {
        if whitelist.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let files = self.eml_files().await?;
        let scanned = files.len();
        let mut found: Vec<(DateTime<Utc>, Email)> = Vec::new();

        for path in files {
            let raw = match tokio::fs::read(&path).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable message");
                    continue;
                }
            };
            let modified = modified_at(&path).await;
            let Some((sent_at, email)) = parse_eml(&raw, &path, modified) else {
                warn!(path = %path.display(), "Skipping unparseable message");
                continue;
            };

            if !is_sender_allowed(whitelist, &email.sender_email) {
                debug!(sender = %email.sender_email, "Sender not whitelisted");
                continue;
            }
            if since.is_some_and(|since| sent_at < since) {
                continue;
            }
            found.push((sent_at, email));
        }

        found.sort_by(|a, b| b.0.cmp(&a.0));
        found.truncate(limit);

        info!(
            dir = %self.dir.display(),
            scanned,
            matched = found.len(),
            "Fetched newsletter emails"
        );
        Ok(found.into_iter().map(|(_, email)| email).collect())
    }
}

/// File modification time, if the platform reports one.
async fn modified_at(path: &Path) -> Option<DateTime<Utc>> {
    let metadata = tokio::fs::metadata(path).await.ok()?;
    metadata.modified().ok().map(DateTime::<Utc>::from)
}

/// Parse one message. Returns `None` when the bytes are not a message,
/// carry no sender address, or have neither a `Date` header nor `fallback_date`.
///
/// A message without a `Date` header is dated by `fallback_date` (the file
/// mtime) so repeated fetches see a stable date.
fn parse_eml(
    raw: &[u8],
    path: &Path,
    fallback_date: Option<DateTime<Utc>>,
) -> Option<(DateTime<Utc>, Email)> {
    let parsed = MessageParser::default().parse(raw)?;

    let sender_email = parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())?;

    let id = parsed
        .message_id()
        .map(|s| s.to_string())
        .or_else(|| {
            path.file_stem()
                .and_then(|stem| stem.to_str())
                .map(str::to_string)
        })?;

    let sent_at = parsed
        .date()
        .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0))
        .or(fallback_date)?;

    let body = if let Some(text) = parsed.body_text(0) {
        text.trim().to_string()
    } else if let Some(html) = parsed.body_html(0) {
        strip_html(html.as_ref())
    } else {
        String::new()
    };

    let email = Email {
        id,
        subject: parsed.subject().unwrap_or("(no subject)").to_string(),
        sender_email,
        date_iso: sent_at.to_rfc3339(),
        body,
    };
    Some((sent_at, email))
}

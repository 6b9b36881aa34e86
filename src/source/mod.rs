//! Mail sources: where newsletter emails come from.
//!
//! The pipeline trusts a source to apply the sender whitelist, the date
//! filter, and the limit itself.

mod eml_dir;

pub use eml_dir::EmlDirSource;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::SourceError;
use crate::pipeline::types::Email;

/// Supplies newsletter emails.
#[async_trait]
pub trait MailSource: Send + Sync {
    /// Emails from whitelisted senders sent at or after `since`, newest
    /// first, at most `limit`.
    async fn fetch(
        &self,
        whitelist: &[String],
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Email>, SourceError>;
}

/// Check if a sender email is in the whitelist.
///
/// Entries may be `*`, an exact address, `@domain`, or a bare `domain`.
/// An empty whitelist allows nobody.
pub fn is_sender_allowed(allowed: &[String], email: &str) -> bool {
    if allowed.is_empty() {
        return false;
    }
    let email_lower = email.trim().to_lowercase();
    allowed.iter().any(|entry| {
        let entry = entry.trim().to_lowercase();
        if entry == "*" {
            true
        } else if entry.starts_with('@') {
            email_lower.ends_with(&entry)
        } else if entry.contains('@') {
            entry == email_lower
        } else if entry.is_empty() {
            false
        } else {
            email_lower.ends_with(&format!("@{entry}"))
        }
    })
}

/// Strip HTML tags and collapse whitespace.
pub fn strip_html(html: &str) -> String {
    let mut result = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => {
                in_tag = true;
                result.push(' ');
            }
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

//! Persistence layer: libSQL-backed storage for emails, stories, and run settings.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{Database, NewsletterAddress, StoredEmail, StoredStory};

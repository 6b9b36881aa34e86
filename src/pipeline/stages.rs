//! Stage functions: clean, extract, and enrich, each one prompt-templated
//! model call.
//!
//! None of these fail outward on model trouble: a failed clean yields an
//! empty string, a failed extract chunk yields no stories, and a failed
//! enrich yields default social content.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::llm::{ModelClient, ModelOutput};
use crate::pipeline::chunker::Chunker;
use crate::pipeline::guard::CancelFlag;
use crate::pipeline::prompts::Prompts;
use crate::pipeline::types::{Email, SocialContent, StoryCandidate};

/// Maximum length of the default X post, in characters.
pub const X_POST_MAX_CHARS: usize = 280;

const DEFAULT_BRANDING_TAG: &str = "#AI";
const DEFAULT_ACTION: &str = "Read more";

/// A story as the model extracted it, before provenance and scoring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedStory {
    pub title: String,
    pub summary: String,
}

impl ExtractedStory {
    /// Stamp with the source email's provenance.
    pub fn into_candidate(self, email: &Email) -> StoryCandidate {
        StoryCandidate::from_email(self.title, self.summary, email)
    }
}

/// The three model-backed stages, sharing one client.
pub struct Stages {
    client: ModelClient,
    prompts: Prompts,
    chunker: Chunker,
}

impl Stages {
    pub fn new(client: ModelClient, prompts: Prompts, chunker: Chunker) -> Self {
        Self {
            client,
            prompts,
            chunker,
        }
    }

    pub fn client(&self) -> &ModelClient {
        &self.client
    }

    /// Strip boilerplate from a newsletter body. Empty on failure.
    pub async fn clean(&self, body: &str) -> String {
        let prompt = self.prompts.render_clean(body);
        match self.client.generate(&prompt, false).await {
            ModelOutput::Failed(failure) => {
                warn!(attempts = failure.attempts, "Clean failed, email will be skipped");
                String::new()
            }
            output => output.into_text().unwrap_or_default().trim().to_string(),
        }
    }

    /// Extract stories from cleaned text, one structured call per chunk.
    ///
    /// Results are concatenated in chunk order. Only cancellation is an error.
    pub async fn extract(
        &self,
        cleaned: &str,
        cancel: &CancelFlag,
    ) -> Result<Vec<ExtractedStory>, PipelineError> {
        let chunks = self.chunker.chunk(cleaned);
        let mut stories = Vec::new();

        for (index, chunk) in chunks.iter().enumerate() {
            cancel.check()?;
            let prompt = self.prompts.render_extract(chunk);
            let found = match self.client.generate(&prompt, true).await {
                ModelOutput::Structured(value) => parse_stories(value),
                ModelOutput::PlainText(text) => {
                    warn!(chunk = index, chars = text.chars().count(), "Extract returned no JSON");
                    Vec::new()
                }
                ModelOutput::Failed(failure) => {
                    warn!(chunk = index, attempts = failure.attempts, "Extract chunk failed");
                    Vec::new()
                }
            };
            debug!(chunk = index, of = chunks.len(), found = found.len(), "Chunk extracted");
            stories.extend(found);
        }

        Ok(stories)
    }

    /// Produce social content for one story. Never fails.
    pub async fn enrich(&self, title: &str, summary: &str) -> SocialContent {
        let prompt = self.prompts.render_social(title, summary);
        match self.client.generate(&prompt, true).await {
            ModelOutput::Structured(Value::Object(map)) => social_from_map(&map, summary),
            ModelOutput::Failed(failure) => {
                warn!(title, attempts = failure.attempts, "Enrich failed, using defaults");
                default_social(summary)
            }
            other => {
                warn!(title, output = ?other, "Enrich returned no JSON object, using defaults");
                default_social(summary)
            }
        }
    }
}

// ── Output parsing ──────────────────────────────────────────────────

/// Accepts `{"stories": [...]}` or a bare list. Non-object entries are skipped.
fn parse_stories(value: Value) -> Vec<ExtractedStory> {
    let entries = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("stories") {
            Some(Value::Array(items)) => items,
            _ => {
                warn!("Extract output has no stories list");
                return Vec::new();
            }
        },
        other => {
            warn!(kind = json_kind(&other), "Extract output is not a list");
            return Vec::new();
        }
    };

    entries
        .into_iter()
        .filter_map(|entry| match entry {
            Value::Object(map) => Some(ExtractedStory {
                title: string_field(&map, "title").unwrap_or_default(),
                summary: string_field(&map, "summary").unwrap_or_default(),
            }),
            other => {
                debug!(kind = json_kind(&other), "Skipping non-object story entry");
                None
            }
        })
        .collect()
}

fn social_from_map(map: &Map<String, Value>, summary: &str) -> SocialContent {
    let defaults = default_social(summary);
    SocialContent {
        linkedin: valid_field(map, "linkedIn").unwrap_or(defaults.linkedin),
        x_post: valid_field(map, "x")
            .or_else(|| valid_field(map, "x_post"))
            .unwrap_or(defaults.x_post),
        branding_tag: valid_field(map, "branding_tag").unwrap_or(defaults.branding_tag),
        action_suggestion: valid_field(map, "action_suggestion")
            .unwrap_or(defaults.action_suggestion),
    }
}

fn default_social(summary: &str) -> SocialContent {
    SocialContent {
        linkedin: summary.to_string(),
        x_post: truncate_chars(summary, X_POST_MAX_CHARS),
        branding_tag: DEFAULT_BRANDING_TAG.to_string(),
        action_suggestion: DEFAULT_ACTION.to_string(),
    }
}

fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).map(str::to_string)
}

/// A present, non-blank string field.
fn valid_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    string_field(map, key).filter(|s| !s.trim().is_empty())
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use serde_json::json;

    use crate::error::LlmError;
    use crate::llm::RetryPolicy;
    use crate::llm::client::tests::{ScriptedService, timeout_err};

    fn scripted_stages(script: Vec<Result<String, LlmError>>) -> (Stages, Arc<ScriptedService>) {
        let service = Arc::new(ScriptedService::new(script));
        let client = ModelClient::new(
            service.clone(),
            RetryPolicy::new(0, Duration::ZERO),
            Duration::from_secs(5),
        );
        (
            Stages::new(client, Prompts::default(), Chunker::default()),
            service,
        )
    }

    fn envelope(inner: &str) -> Result<String, LlmError> {
        Ok(json!({ "response": inner }).to_string())
    }

    fn email() -> Email {
        Email {
            id: "m-1".into(),
            subject: "AI Daily".into(),
            sender_email: "news@example.com".into(),
            date_iso: "2026-10-16T07:00:00+00:00".into(),
            body: "raw".into(),
        }
    }

    #[tokio::test]
    async fn clean_returns_trimmed_text() {
        let (stages, _) = scripted_stages(vec![envelope("  Cleaned [1] body \n")]);
        assert_eq!(stages.clean("raw").await, "Cleaned [1] body");
    }

    #[tokio::test]
    async fn clean_failure_is_empty() {
        let (stages, _) = scripted_stages(vec![Err(timeout_err())]);
        assert_eq!(stages.clean("raw").await, "");
    }

    #[tokio::test]
    async fn extract_accepts_envelope_and_bare_list() {
        let (stages, _) = scripted_stages(vec![envelope(
            r#"{"stories": [{"title": "A", "summary": "a"}, {"title": "B"}]}"#,
        )]);
        let stories = stages.extract("text", &CancelFlag::new()).await.unwrap();
        assert_eq!(
            stories,
            vec![
                ExtractedStory { title: "A".into(), summary: "a".into() },
                ExtractedStory { title: "B".into(), summary: String::new() },
            ]
        );

        let (stages, _) = scripted_stages(vec![envelope(
            r#"Here: [{"title": "C", "summary": "c"}, "junk", 3]"#,
        )]);
        let stories = stages.extract("text", &CancelFlag::new()).await.unwrap();
        assert_eq!(stories.len(), 1);
        assert_eq!(stories[0].title, "C");
    }

    #[tokio::test]
    async fn extract_concatenates_chunks_in_order() {
        let service = Arc::new(ScriptedService::new(vec![
            envelope(r#"{"stories": [{"title": "first", "summary": "1"}]}"#),
            envelope("no json at all"),
            envelope(r#"[{"title": "third", "summary": "3"}]"#),
        ]));
        let client = ModelClient::new(
            service.clone(),
            RetryPolicy::new(0, Duration::ZERO),
            Duration::from_secs(5),
        );
        let stages = Stages::new(client, Prompts::default(), Chunker::new(4, 0));

        let text = "one two three four five six seven eight nine ten eleven twelve";
        let stories = stages.extract(text, &CancelFlag::new()).await.unwrap();
        let titles: Vec<_> = stories.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["first", "third"]);
        assert_eq!(service.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn extract_stops_when_cancelled() {
        let (stages, service) = scripted_stages(vec![envelope("[]")]);
        let cancel = CancelFlag::new();
        cancel.cancel();
        let result = stages.extract("text", &cancel).await;
        assert!(matches!(result, Err(PipelineError::Cancelled)));
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn extract_of_empty_text_makes_no_calls() {
        let (stages, service) = scripted_stages(vec![]);
        let stories = stages.extract("", &CancelFlag::new()).await.unwrap();
        assert!(stories.is_empty());
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn enrich_reads_model_fields() {
        let (stages, _) = scripted_stages(vec![envelope(
            r##"{"linkedIn": "L", "x": "X", "branding_tag": "#GenAI", "action_suggestion": "Try it"}"##,
        )]);
        let social = stages.enrich("T", "S").await;
        assert_eq!(social.linkedin, "L");
        assert_eq!(social.x_post, "X");
        assert_eq!(social.branding_tag, "#GenAI");
        assert_eq!(social.action_suggestion, "Try it");
    }

    #[tokio::test]
    async fn enrich_fills_invalid_fields_with_defaults() {
        let (stages, _) = scripted_stages(vec![envelope(
            r#"{"linkedIn": "  ", "x_post": "fallback key", "branding_tag": 7}"#,
        )]);
        let social = stages.enrich("T", "the summary").await;
        assert_eq!(social.linkedin, "the summary");
        assert_eq!(social.x_post, "fallback key");
        assert_eq!(social.branding_tag, "#AI");
        assert_eq!(social.action_suggestion, "Read more");
    }

    #[tokio::test]
    async fn enrich_failure_truncates_summary_for_x() {
        let (stages, _) = scripted_stages(vec![Err(timeout_err())]);
        let summary = "é".repeat(300);
        let social = stages.enrich("T", &summary).await;
        assert_eq!(social.linkedin, summary);
        assert_eq!(social.x_post.chars().count(), X_POST_MAX_CHARS);
    }

    #[test]
    fn parse_stories_rejects_other_shapes() {
        assert!(parse_stories(json!({"items": []})).is_empty());
        assert!(parse_stories(json!(42)).is_empty());
        assert!(parse_stories(json!({"stories": "none"})).is_empty());
    }
}

//! End-to-end tests: `.eml` files on disk → fake Ollama server over HTTP →
//! ranked stories in an on-disk libSQL database.
//!
//! The fake server is a small Axum app that answers by prompt kind, so the
//! real `OllamaService` and `ModelClient` are exercised.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;

use top_news::llm::{OllamaConfig, RetryPolicy, create_client};
use top_news::pipeline::{
    CancelFlag, Chunker, NewsPipeline, Prompts, RankingConfig, RunOutcome, Stages,
};
use top_news::scheduler::Job;
use top_news::source::{EmlDirSource, MailSource};
use top_news::store::{Database, LibSqlBackend, NewsletterAddress};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

// ── Fake Ollama server ──────────────────────────────────────────────

/// Inner model reply for a prompt.
fn reply_for(prompt: &str) -> String {
    if let Some(body) = prompt.split("Newsletter:\n").nth(1) {
        return body.trim().to_string();
    }
    if let Some(text) = prompt.split("Text:\n").nth(1) {
        // Each newsletter body is one "title | summary" line per story.
        let stories: Vec<Value> = text
            .lines()
            .filter_map(|line| line.split_once(" | "))
            .map(|(title, summary)| json!({"title": title.trim(), "summary": summary.trim()}))
            .collect();
        return format!("Here you go:\n```json\n{}\n```", json!({ "stories": stories }));
    }
    let title = prompt
        .split("Title: ")
        .nth(1)
        .and_then(|rest| rest.lines().next())
        .unwrap_or_default();
    json!({
        "linkedIn": format!("Big news: {title}"),
        "x": format!("{title} #AI"),
        "branding_tag": "#AILeadership",
        "action_suggestion": "Share this with your team"
    })
    .to_string()
}

/// `POST /api/generate`: count the call and wrap the scripted reply.
async fn generate(
    State(requests): State<Arc<AtomicUsize>>,
    Json(request): Json<Value>,
) -> Json<Value> {
    requests.fetch_add(1, Ordering::SeqCst);
    let prompt = request["prompt"].as_str().unwrap_or_default();
    Json(json!({
        "model": request["model"],
        "response": reply_for(prompt),
        "done": true
    }))
}

/// Start a fake Ollama server on a random port. Returns (url, request count).
async fn start_fake_ollama() -> (String, Arc<AtomicUsize>) {
    let requests = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/api/generate", post(generate))
        .with_state(requests.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    (format!("http://127.0.0.1:{port}/api/generate"), requests)
}

// ── Fixtures ────────────────────────────────────────────────────────

fn write_eml(dir: &std::path::Path, name: &str, from: &str, date: &str, body: &str) {
    let raw = format!(
        "From: Newsletter <{from}>\r\nTo: reader@example.com\r\nSubject: {name}\r\nDate: {date}\r\nMessage-ID: <{name}@example.test>\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n{body}\r\n"
    );
    std::fs::write(dir.join(format!("{name}.eml")), raw).unwrap();
}

fn ranking() -> RankingConfig {
    RankingConfig {
        target_count: 10,
        similarity_threshold: 0.85,
        keywords: vec!["openai".into(), "gpt".into(), "nvidia".into()],
        authority: [("daily@bignews.ai".to_string(), 2.0)].into_iter().collect(),
    }
}

async fn build_job(
    url: String,
    mail_dir: &std::path::Path,
    store: Arc<LibSqlBackend>,
    senders: Vec<String>,
) -> Arc<Job> {
    let client = create_client(
        OllamaConfig {
            url,
            model: "stub-model".into(),
            api_key: None,
            timeout: Duration::from_secs(5),
        },
        RetryPolicy::new(1, Duration::from_millis(10)),
    )
    .unwrap();
    let stages = Stages::new(client, Prompts::default(), Chunker::default());
    let pipeline = Arc::new(NewsPipeline::new(stages, store));
    let source: Arc<dyn MailSource> = Arc::new(EmlDirSource::new(mail_dir));
    Arc::new(
        Job::new(pipeline, source, senders, ranking())
            .with_fetch(10, Duration::from_secs(100 * 365 * 24 * 3600)),
    )
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn newsletters_become_ranked_persisted_stories() {
    timeout(TEST_TIMEOUT, async {
        let (url, requests) = start_fake_ollama().await;
        let mail = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        let db_path = data.path().join("top-news.db");

        write_eml(
            mail.path(),
            "tldr",
            "news@tldr.tech",
            "Wed, 14 Oct 2026 07:00:00 +0000",
            "OpenAI launches GPT-5 | OpenAI released GPT-5.\nWeather update | Sunny all week.",
        );
        write_eml(
            mail.path(),
            "bignews",
            "daily@bignews.ai",
            "Thu, 15 Oct 2026 07:00:00 +0000",
            "Nvidia unveils new chips | Nvidia shipped new GPUs.\nOpenAI launches GPT 5 today | More GPT-5 coverage.",
        );
        write_eml(
            mail.path(),
            "ads",
            "promo@shop.com",
            "Thu, 15 Oct 2026 08:00:00 +0000",
            "Nvidia discount | Buy now.",
        );

        let store = Arc::new(LibSqlBackend::new_local(&db_path).await.unwrap());
        let job = build_job(
            url,
            mail.path(),
            store.clone(),
            vec!["news@tldr.tech".into(), "bignews.ai".into()],
        )
        .await;

        let outcome = job.run_once(&CancelFlag::new()).await.unwrap();
        let RunOutcome::Completed(report) = outcome else {
            panic!("Expected a completed run");
        };

        // bignews (x2 authority): "OpenAI launches GPT 5 today" = 2 hits * 2 = 4,
        // "Nvidia unveils new chips" = 1 * 2 = 2. tldr: "OpenAI launches GPT-5" = 2,
        // a near-duplicate of the first, dropped. "Weather update" = 0.
        let titles: Vec<_> = report.stories.iter().map(|s| s.story.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["OpenAI launches GPT 5 today", "Nvidia unveils new chips", "Weather update"]
        );
        assert_eq!(report.emails_fetched, 2);
        assert_eq!(report.duplicates_dropped, 1);
        assert_eq!(report.stories[0].story.score, 4.0);
        assert_eq!(report.stories[0].story.sender_email, "daily@bignews.ai");
        assert_eq!(report.stories[0].social.x_post, "OpenAI launches GPT 5 today #AI");
        assert_eq!(report.stories[0].social.branding_tag, "#AILeadership");

        // 2 cleans + 2 extracts + 3 enrichments.
        assert_eq!(requests.load(Ordering::SeqCst), 7);

        // Reopen from disk: rank order survives.
        drop(job);
        drop(store);
        let reopened = LibSqlBackend::new_local(&db_path).await.unwrap();
        let stored = reopened.latest_stories(10).await.unwrap();
        let stored_titles: Vec<_> = stored.iter().map(|s| s.story.story.title.as_str()).collect();
        assert_eq!(stored_titles, titles);
        assert_eq!(reopened.fetched_emails(10).await.unwrap().len(), 2);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn stored_senders_extend_the_whitelist() {
    timeout(TEST_TIMEOUT, async {
        let (url, _requests) = start_fake_ollama().await;
        let mail = tempfile::tempdir().unwrap();
        write_eml(
            mail.path(),
            "batch",
            "batch@deeplearning.ai",
            "Wed, 14 Oct 2026 07:00:00 +0000",
            "Agents everywhere | Agent frameworks keep shipping.",
        );

        let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let job = build_job(url, mail.path(), store.clone(), Vec::new()).await;

        let outcome = job.run_once(&CancelFlag::new()).await.unwrap();
        assert!(matches!(outcome, RunOutcome::EmptyWhitelist));

        store
            .replace_newsletter_addresses(&[NewsletterAddress::new("The Batch", "batch@deeplearning.ai")])
            .await
            .unwrap();
        store
            .replace_priority_keywords(&["agent".to_string()])
            .await
            .unwrap();

        let outcome = job.run_once(&CancelFlag::new()).await.unwrap();
        let stories = outcome.stories();
        assert_eq!(stories.len(), 1);
        assert_eq!(stories[0].story.title, "Agents everywhere");
        // Stored keywords replace the configured ones.
        assert_eq!(stories[0].story.score, 1.0);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unreachable_model_degrades_to_no_stories() {
    timeout(TEST_TIMEOUT, async {
        // Bind then drop to get a port with nothing listening.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let mail = tempfile::tempdir().unwrap();
        write_eml(
            mail.path(),
            "tldr",
            "news@tldr.tech",
            "Wed, 14 Oct 2026 07:00:00 +0000",
            "OpenAI launches GPT-5 | OpenAI released GPT-5.",
        );

        let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let job = build_job(
            format!("http://127.0.0.1:{port}/api/generate"),
            mail.path(),
            store.clone(),
            vec!["*".into()],
        )
        .await;

        let outcome = job.run_once(&CancelFlag::new()).await.unwrap();
        let RunOutcome::Completed(report) = outcome else {
            panic!("Expected a completed run");
        };
        assert!(report.stories.is_empty());
        assert_eq!(report.emails_skipped, 1);
        // The email is still recorded.
        assert_eq!(store.fetched_emails(10).await.unwrap().len(), 1);
    })
    .await
    .expect("test timed out");
}

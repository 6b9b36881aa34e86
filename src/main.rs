use std::sync::Arc;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use top_news::config::PipelineConfig;
use top_news::pipeline::{CancelFlag, RunOutcome};
use top_news::scheduler::{self, Job};
use top_news::store::{Database, LibSqlBackend};

const USAGE: &str = "usage: top-news [run | watch | stories [N] | emails [N]]";

enum Command {
    Run,
    Watch,
    Stories(usize),
    Emails(usize),
}

fn parse_command(args: &[String]) -> anyhow::Result<Command> {
    let count = |arg: Option<&String>| -> anyhow::Result<usize> {
        match arg {
            Some(n) => n.parse().with_context(|| format!("invalid count '{n}'")),
            None => Ok(10),
        }
    };
    match args.first().map(String::as_str) {
        None | Some("run") => Ok(Command::Run),
        Some("watch") => Ok(Command::Watch),
        Some("stories") => Ok(Command::Stories(count(args.get(1))?)),
        Some("emails") => Ok(Command::Emails(count(args.get(1))?)),
        Some(other) => anyhow::bail!("unknown command '{other}'\n{USAGE}"),
    }
}

/// Console logging, plus a daily rolling file when `TOP_NEWS_LOG_DIR` is set.
fn init_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = tracing_subscriber::fmt::layer().with_target(false);

    match std::env::var("TOP_NEWS_LOG_DIR") {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir.trim(), "top-news.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        _ => {
            tracing_subscriber::registry().with(filter).with(console).init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _log_guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = parse_command(&args)?;
    let config = PipelineConfig::from_env().context("loading configuration")?;

    // ── Database ─────────────────────────────────────────────────────────
    let store = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("opening database at {}", config.db_path.display()))?,
    );

    match command {
        Command::Stories(limit) => {
            for stored in store.latest_stories(limit).await? {
                let story = &stored.story;
                println!(
                    "{:>6.2}  {}  [{}]\n        {}\n        {} | {}",
                    story.story.score,
                    story.story.title,
                    story.story.sender_email,
                    story.story.summary,
                    story.social.branding_tag,
                    story.social.action_suggestion,
                );
            }
            return Ok(());
        }
        Command::Emails(limit) => {
            for stored in store.fetched_emails(limit).await? {
                println!(
                    "{}  {:<32}  {}",
                    stored.email.date_iso, stored.email.sender_email, stored.email.subject
                );
            }
            return Ok(());
        }
        Command::Run | Command::Watch => {}
    }

    // ── Pipeline ─────────────────────────────────────────────────────────
    eprintln!("📰 Top News v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.ollama.model);
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!("   Mail dir: {}", config.mail_dir.display());

    let store: Arc<dyn Database> = store;
    let job = Arc::new(Job::from_config(&config, store).context("building pipeline")?);

    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received, cancelling");
                cancel.cancel();
            }
        });
    }

    match command {
        Command::Watch => {
            let schedule = scheduler::parse_schedule(&config.schedule)?;
            eprintln!("   Schedule: {}", config.schedule);
            if let Some(next) = scheduler::next_run(&config.schedule)? {
                eprintln!("   Next run: {next}\n");
            }
            scheduler::spawn_scheduled_runner(job, schedule, cancel).await?;
        }
        _ => {
            eprintln!();
            match job.run_once(&cancel).await? {
                RunOutcome::Completed(report) => {
                    for (rank, story) in report.stories.iter().enumerate() {
                        println!(
                            "{:>2}. ({:.2}) {}\n    {}",
                            rank + 1,
                            story.story.score,
                            story.story.title,
                            story.social.x_post
                        );
                    }
                    eprintln!(
                        "\n{} stories from {} emails ({} skipped, {} duplicates dropped)",
                        report.stories.len(),
                        report.emails_fetched,
                        report.emails_skipped,
                        report.duplicates_dropped
                    );
                }
                outcome => eprintln!("Nothing to do: {}", outcome.label()),
            }
        }
    }

    Ok(())
}

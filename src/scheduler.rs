//! Scheduled runs.
//!
//! A [`Job`] bundles everything one run needs beyond the pipeline itself:
//! the mail source, configured senders and ranking, and the fetch window.
//! [`spawn_scheduled_runner`] fires it on a cron schedule until cancelled.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::error::{ConfigError, PipelineError};
use crate::llm::create_client;
use crate::pipeline::guard::CancelFlag;
use crate::pipeline::orchestrator::NewsPipeline;
use crate::pipeline::prompts::Prompts;
use crate::pipeline::stages::Stages;
use crate::pipeline::types::{RankingConfig, RunOutcome};
use crate::source::{EmlDirSource, MailSource};
use crate::store::Database;

/// How often a waiting runner wakes to check for cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Parse a cron expression (six fields, seconds first).
pub fn parse_schedule(schedule: &str) -> Result<cron::Schedule, ConfigError> {
    cron::Schedule::from_str(schedule).map_err(|e| ConfigError::InvalidValue {
        key: "RUN_SCHEDULE".to_string(),
        message: format!("invalid cron: {e}"),
    })
}

/// Next fire time for a cron expression.
pub fn next_run(schedule: &str) -> Result<Option<DateTime<Utc>>, ConfigError> {
    Ok(parse_schedule(schedule)?.upcoming(Utc).next())
}

/// One configured run: source, senders, ranking, and window.
pub struct Job {
    pipeline: Arc<NewsPipeline>,
    source: Arc<dyn MailSource>,
    senders: Vec<String>,
    ranking: RankingConfig,
    fetch_limit: usize,
    fetch_window: Duration,
}

impl Job {
    pub fn new(
        pipeline: Arc<NewsPipeline>,
        source: Arc<dyn MailSource>,
        senders: Vec<String>,
        ranking: RankingConfig,
    ) -> Self {
        Self {
            pipeline,
            source,
            senders,
            ranking,
            fetch_limit: 10,
            fetch_window: Duration::from_secs(24 * 60 * 60),
        }
    }

    pub fn with_fetch(mut self, limit: usize, window: Duration) -> Self {
        self.fetch_limit = limit;
        self.fetch_window = window;
        self
    }

    /// Wire a job from config: prompts, model client, stages, `.eml` source.
    pub fn from_config(config: &PipelineConfig, store: Arc<dyn Database>) -> crate::error::Result<Self> {
        let prompts = match &config.prompts_dir {
            Some(dir) => Prompts::load(dir)?,
            None => Prompts::default(),
        };
        let client = create_client(config.ollama.clone(), config.retry)?;
        let stages = Stages::new(client, prompts, config.chunker.clone());
        let pipeline =
            Arc::new(NewsPipeline::new(stages, store).with_concurrency(config.concurrency));

        let source = EmlDirSource::new(&config.mail_dir);
        info!(
            mail_dir = %source.dir().display(),
            senders = config.newsletter_senders.len(),
            "Job configured"
        );

        Ok(Self::new(
            pipeline,
            Arc::new(source),
            config.newsletter_senders.clone(),
            config.ranking.clone(),
        )
        .with_fetch(config.fetch_limit, config.fetch_window))
    }

    /// Resolve settings against the store and run once.
    pub async fn run_once(&self, cancel: &CancelFlag) -> Result<RunOutcome, PipelineError> {
        let settings = self
            .pipeline
            .resolve_settings(&self.senders, &self.ranking)
            .await?;
        let since = chrono::Duration::from_std(self.fetch_window)
            .ok()
            .and_then(|window| Utc::now().checked_sub_signed(window));

        self.pipeline
            .run_from_source(self.source.as_ref(), &settings, since, self.fetch_limit, cancel)
            .await
    }
}

/// Spawn a task that runs `job` at every fire time of `schedule`.
///
/// A fire time that lands while a run is active is skipped. The task exits
/// once `cancel` is set or the schedule has no further fire times.
pub fn spawn_scheduled_runner(
    job: Arc<Job>,
    schedule: cron::Schedule,
    cancel: CancelFlag,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!("Scheduled runner started");

        loop {
            let Some(next) = schedule.upcoming(Utc).next() else {
                warn!("Schedule has no further fire times, stopping");
                break;
            };
            debug!(next = %next, "Waiting for next scheduled run");

            let mut ticker = tokio::time::interval(POLL_INTERVAL);
            while Utc::now() < next && !cancel.is_cancelled() {
                ticker.tick().await;
            }
            if cancel.is_cancelled() {
                break;
            }

            match job.run_once(&cancel).await {
                Ok(outcome) => info!(
                    outcome = outcome.label(),
                    stories = outcome.stories().len(),
                    "Scheduled run finished"
                ),
                Err(PipelineError::Busy) => warn!("Previous run still active, skipping tick"),
                Err(PipelineError::Cancelled) => {
                    info!("Scheduled run cancelled");
                    break;
                }
                Err(e) => error!("Scheduled run failed: {e}"),
            }
        }

        info!("Scheduled runner stopped");
    })
}

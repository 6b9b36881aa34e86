//! Configuration types, read from the environment.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use tracing::warn;

use crate::error::ConfigError;
use crate::llm::{DEFAULT_TIMEOUT, OllamaConfig, RetryPolicy};
use crate::pipeline::chunker::{ChunkMode, Chunker};
use crate::pipeline::types::RankingConfig;

const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "qwen3:8b";
const DEFAULT_KEYWORDS: &[&str] = &[
    "ai",
    "ml",
    "openai",
    "gpt",
    "model",
    "llm",
    "langchain",
    "nvidia",
    "huggingface",
];
const DEFAULT_FETCH_WINDOW_HOURS: u64 = 24;
/// Six-field cron: 07:00:00 every day.
pub const DEFAULT_SCHEDULE: &str = "0 0 7 * * *";

/// Everything a pipeline process needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub ollama: OllamaConfig,
    pub retry: RetryPolicy,
    /// Configured ranking inputs; stored keywords may override at run time.
    pub ranking: RankingConfig,
    pub chunker: Chunker,
    /// Emails processed concurrently (clean + extract).
    pub concurrency: usize,
    /// Maximum emails fetched per run.
    pub fetch_limit: usize,
    /// How far back a run looks for emails.
    pub fetch_window: Duration,
    /// Configured newsletter senders, merged with stored ones at run time.
    pub newsletter_senders: Vec<String>,
    pub mail_dir: PathBuf,
    pub db_path: PathBuf,
    pub prompts_dir: Option<PathBuf>,
    /// Cron expression for `watch` mode.
    pub schedule: String,
}

impl PipelineConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        // ── Model service ───────────────────────────────────────────
        let base_url = get("OLLAMA_BASE_URL").unwrap_or_else(|| DEFAULT_OLLAMA_BASE_URL.to_string());
        let url = get("OLLAMA_URL")
            .unwrap_or_else(|| format!("{}/api/generate", base_url.trim_end_matches('/')));
        let ollama = OllamaConfig {
            url,
            model: get("OLLAMA_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_key: get("OLLAMA_API_KEY").map(SecretString::from),
            timeout: parse_or(&get, "MODEL_TIMEOUT_SECS", DEFAULT_TIMEOUT.as_secs())
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_TIMEOUT),
        };
        let retry = RetryPolicy::new(
            parse_or(&get, "MODEL_RETRIES", 2).unwrap_or(2),
            Duration::from_millis(parse_or(&get, "MODEL_RETRY_BACKOFF_MS", 500).unwrap_or(500)),
        );

        // ── Ranking ─────────────────────────────────────────────────
        let threshold_key = if get("SIMILARITY_THRESHOLD").is_some() {
            "SIMILARITY_THRESHOLD"
        } else {
            "SIM_THRESHOLD"
        };
        let similarity_threshold: f64 = parse_or(&get, threshold_key, 0.85).unwrap_or(0.85);
        if !(0.0..=1.0).contains(&similarity_threshold) {
            return Err(ConfigError::InvalidValue {
                key: threshold_key.to_string(),
                message: format!("{similarity_threshold} is outside 0.0..=1.0"),
            });
        }

        let keywords = get("PRIORITY_KEYWORDS")
            .map(|v| split_list(&v))
            .unwrap_or_else(|| DEFAULT_KEYWORDS.iter().map(|s| s.to_string()).collect());

        let mut authority = HashMap::new();
        if let Some(path) = get("AUTHORITY_SCORES_PATH") {
            let raw = std::fs::read_to_string(&path)?;
            authority.extend(parse_authority("AUTHORITY_SCORES_PATH", &raw)?);
        }
        if let Some(raw) = get("AUTHORITY_SCORES") {
            authority.extend(parse_authority("AUTHORITY_SCORES", &raw)?);
        }

        let ranking = RankingConfig {
            target_count: parse_or(&get, "TOP_N", 10).unwrap_or(10),
            similarity_threshold,
            keywords,
            authority,
        };

        // ── Chunking ────────────────────────────────────────────────
        let chunk_mode = get("CHUNK_MODE")
            .and_then(|v| {
                v.parse::<ChunkMode>()
                    .inspect_err(|e| warn!(key = "CHUNK_MODE", error = %e, "Ignoring invalid value"))
                    .ok()
            })
            .unwrap_or(ChunkMode::Tokens);
        let chunker = Chunker::new(
            parse_or(&get, "CHUNK_MAX_TOKENS", 2000).unwrap_or(2000),
            parse_or(&get, "CHUNK_OVERLAP_TOKENS", 100).unwrap_or(100),
        )
        .with_mode(chunk_mode);

        // ── Schedule ────────────────────────────────────────────────
        let schedule = get("RUN_SCHEDULE").unwrap_or_else(|| DEFAULT_SCHEDULE.to_string());
        crate::scheduler::parse_schedule(&schedule)?;

        let fetch_window = parse_or(&get, "FETCH_WINDOW_HOURS", DEFAULT_FETCH_WINDOW_HOURS)
            .and_then(|hours| {
                let secs = hours.checked_mul(3600);
                if secs.is_none() {
                    warn!(hours, "FETCH_WINDOW_HOURS out of range, using default");
                }
                secs
            })
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_FETCH_WINDOW_HOURS * 3600));

        Ok(Self {
            ollama,
            retry,
            ranking,
            chunker,
            concurrency: parse_or(&get, "PIPELINE_CONCURRENCY", 1).unwrap_or(1).max(1),
            fetch_limit: parse_or(&get, "FETCH_LIMIT", 10).unwrap_or(10),
            fetch_window,
            newsletter_senders: get("NEWSLETTER_SENDERS")
                .map(|v| split_list(&v))
                .unwrap_or_default(),
            mail_dir: get("MAIL_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("./mail")),
            db_path: get("TOP_NEWS_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/top-news.db")),
            prompts_dir: get("PROMPTS_DIR").map(PathBuf::from),
            schedule,
        })
    }
}

/// Parse `key` if set; `None` (after a warning) when the value is malformed.
fn parse_or<T, G>(get: &G, key: &str, default: T) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Some(default),
        Some(raw) => match raw.parse() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, value = %raw, error = %e, "Ignoring invalid value, using default");
                None
            }
        },
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// A JSON object of sender → multiplier. Senders are lowercased.
fn parse_authority(key: &str, raw: &str) -> Result<HashMap<String, f64>, ConfigError> {
    let map: HashMap<String, f64> = serde_json::from_str(raw)
        .map_err(|e| ConfigError::ParseError(format!("{key}: {e}")))?;
    Ok(map
        .into_iter()
        .map(|(sender, weight)| (sender.trim().to_lowercase(), weight))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn config(vars: &[(&str, &str)]) -> Result<PipelineConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        PipelineConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.ollama.url, "http://localhost:11434/api/generate");
        assert_eq!(cfg.ollama.model, "qwen3:8b");
        assert!(cfg.ollama.api_key.is_none());
        assert_eq!(cfg.ollama.timeout, Duration::from_secs(300));
        assert_eq!(cfg.retry.retries, 2);
        assert_eq!(cfg.ranking.target_count, 10);
        assert_eq!(cfg.ranking.similarity_threshold, 0.85);
        assert_eq!(cfg.ranking.keywords.len(), 9);
        assert!(cfg.ranking.authority.is_empty());
        assert_eq!(cfg.fetch_limit, 10);
        assert_eq!(cfg.fetch_window, Duration::from_secs(24 * 3600));
        assert_eq!(cfg.concurrency, 1);
        assert_eq!(cfg.chunker, Chunker::default());
        assert!(cfg.newsletter_senders.is_empty());
        assert_eq!(cfg.schedule, DEFAULT_SCHEDULE);
    }

    #[test]
    fn base_url_builds_generate_endpoint() {
        let cfg = config(&[("OLLAMA_BASE_URL", "http://gpu-box:11434/")]).unwrap();
        assert_eq!(cfg.ollama.url, "http://gpu-box:11434/api/generate");

        let cfg = config(&[
            ("OLLAMA_BASE_URL", "http://ignored"),
            ("OLLAMA_URL", "http://proxy/generate"),
        ])
        .unwrap();
        assert_eq!(cfg.ollama.url, "http://proxy/generate");
    }

    #[test]
    fn api_key_is_secret() {
        let cfg = config(&[("OLLAMA_API_KEY", "sk-test")]).unwrap();
        assert_eq!(cfg.ollama.api_key.unwrap().expose_secret(), "sk-test");
    }

    #[test]
    fn lists_are_split_and_trimmed() {
        let cfg = config(&[
            ("PRIORITY_KEYWORDS", "gpt, nvidia,,  llm "),
            ("NEWSLETTER_SENDERS", "news@tldr.tech, @substack.com"),
        ])
        .unwrap();
        assert_eq!(cfg.ranking.keywords, vec!["gpt", "nvidia", "llm"]);
        assert_eq!(cfg.newsletter_senders, vec!["news@tldr.tech", "@substack.com"]);
    }

    #[test]
    fn threshold_alias_and_range() {
        let cfg = config(&[("SIM_THRESHOLD", "0.9")]).unwrap();
        assert_eq!(cfg.ranking.similarity_threshold, 0.9);

        let cfg = config(&[("SIMILARITY_THRESHOLD", "0.7"), ("SIM_THRESHOLD", "0.9")]).unwrap();
        assert_eq!(cfg.ranking.similarity_threshold, 0.7);

        let err = config(&[("SIMILARITY_THRESHOLD", "1.5")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "SIMILARITY_THRESHOLD"));
    }

    #[test]
    fn malformed_numbers_fall_back_to_defaults() {
        let cfg = config(&[("TOP_N", "ten"), ("MODEL_RETRIES", "-1"), ("PIPELINE_CONCURRENCY", "0")]).unwrap();
        assert_eq!(cfg.ranking.target_count, 10);
        assert_eq!(cfg.retry.retries, 2);
        assert_eq!(cfg.concurrency, 1);
    }

    #[test]
    fn authority_scores_from_json_and_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("authority.json");
        std::fs::write(&path, r#"{"A@News.com": 2.0, "b@news.com": 0.5}"#).unwrap();

        let cfg = config(&[
            ("AUTHORITY_SCORES_PATH", path.to_str().unwrap()),
            ("AUTHORITY_SCORES", r#"{"b@news.com": 3.0}"#),
        ])
        .unwrap();
        assert_eq!(cfg.ranking.authority["a@news.com"], 2.0);
        assert_eq!(cfg.ranking.authority["b@news.com"], 3.0);

        let err = config(&[("AUTHORITY_SCORES", "{not json")]).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn chunking_settings() {
        let cfg = config(&[
            ("CHUNK_MAX_TOKENS", "500"),
            ("CHUNK_OVERLAP_TOKENS", "50"),
            ("CHUNK_MODE", "chars"),
        ])
        .unwrap();
        assert_eq!(cfg.chunker, Chunker::new(500, 50).with_mode(ChunkMode::Characters));
    }

    #[test]
    fn fetch_window_out_of_range_uses_default() {
        let cfg = config(&[("FETCH_WINDOW_HOURS", "18446744073709551615")]).unwrap();
        assert_eq!(cfg.fetch_window, Duration::from_secs(24 * 3600));

        let cfg = config(&[("FETCH_WINDOW_HOURS", "-3")]).unwrap();
        assert_eq!(cfg.fetch_window, Duration::from_secs(24 * 3600));

        let cfg = config(&[("FETCH_WINDOW_HOURS", "48")]).unwrap();
        assert_eq!(cfg.fetch_window, Duration::from_secs(48 * 3600));
    }

    #[test]
    fn invalid_schedule_is_rejected() {
        let err = config(&[("RUN_SCHEDULE", "every morning")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "RUN_SCHEDULE"));
    }
}

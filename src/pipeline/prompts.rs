//! Prompt templates for the clean, extract, and social stages.
//!
//! Built-in defaults can be overridden from a prompts directory. Sources are
//! applied in order, later ones winning:
//! 1. `prompts.json` with `CLEAN_PROMPT` / `EXTRACT_PROMPT` / `SOCIAL_PROMPT` keys
//! 2. `CLEAN_PROMPT.txt`, `EXTRACT_PROMPT.txt`, `SOCIAL_PROMPT.txt`
//! 3. `prompts.txt` (or `prompt.txt`) split by header lines such as
//!    `### CLEAN_PROMPT` or `== EXTRACT_PROMPT ==`

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use crate::error::ConfigError;

const CLEAN_KEY: &str = "CLEAN_PROMPT";
const EXTRACT_KEY: &str = "EXTRACT_PROMPT";
const SOCIAL_KEY: &str = "SOCIAL_PROMPT";

const DEFAULT_CLEAN: &str = "Clean this newsletter email aggressively. Remove advertising, \
sponsor blocks, subscribe and unsubscribe footers, tracking fragments, social links, repeated \
headers, navigation, 'view in browser' text, and any other marketing boilerplate. Keep only \
genuine news, reporting, analysis, and actionable items. Reply with the cleaned newsletter \
text only, no commentary.\n\nNewsletter:\n{newsletter}";

const DEFAULT_EXTRACT: &str = "Extract every distinct story or announcement from the cleaned \
newsletter text below. For each story write a \"title\" (a 6-12 word headline) and a \
\"summary\" (2-4 factual sentences covering what happened and why it matters). Do not write \
bullet lists or prose. Reply with a single JSON object of exactly this shape: \
{{\"stories\": [{{\"title\": \"...\", \"summary\": \"...\"}}]}}\n\nText:\n{cleaned}";

const DEFAULT_SOCIAL: &str = "You write concise social media content for a professional \
audience. Given a story title and summary, produce JSON with the fields \"linkedIn\" (a 2-4 \
sentence LinkedIn post), \"x\" (a punchy, factual post of at most 280 characters), \
\"branding_tag\" (one recommended hashtag, e.g. '#AILeadership'), and \"action_suggestion\" \
(one short call to action, e.g. 'Share this with your team'). Reply with JSON only, exactly: \
{{\"linkedIn\": \"...\", \"x\": \"...\", \"branding_tag\": \"...\", \"action_suggestion\": \"...\"}}\
\n\nTitle: {title}\nSummary: {summary}";

static SECTION_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:#+|=+|-+)[ \t]*(CLEAN_PROMPT|EXTRACT_PROMPT|SOCIAL_PROMPT)[ \t]*(?:#+|=+|-+)?[ \t]*\r?$")
        .expect("static regex")
});

/// The three stage templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompts {
    pub clean: String,
    pub extract: String,
    pub social: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            clean: DEFAULT_CLEAN.to_string(),
            extract: DEFAULT_EXTRACT.to_string(),
            social: DEFAULT_SOCIAL.to_string(),
        }
    }
}

impl Prompts {
    /// Defaults overlaid with whatever the directory provides.
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        let mut overrides: HashMap<String, String> = HashMap::new();

        let json_path = dir.join("prompts.json");
        if json_path.exists() {
            let raw = std::fs::read_to_string(&json_path)?;
            let map: HashMap<String, serde_json::Value> = serde_json::from_str(&raw)
                .map_err(|e| ConfigError::ParseError(format!("{}: {e}", json_path.display())))?;
            for (key, value) in map {
                if let Some(text) = value.as_str() {
                    overrides.insert(key, text.to_string());
                }
            }
        }

        for key in [CLEAN_KEY, EXTRACT_KEY, SOCIAL_KEY] {
            let path = dir.join(format!("{key}.txt"));
            if path.exists() {
                overrides.insert(key.to_string(), std::fs::read_to_string(&path)?.trim().to_string());
            }
        }

        for name in ["prompts.txt", "prompt.txt"] {
            let path = dir.join(name);
            if path.exists() {
                let raw = std::fs::read_to_string(&path)?;
                overrides.extend(parse_sections(&raw));
                break;
            }
        }

        let mut prompts = Self::default();
        if let Some(text) = overrides.remove(CLEAN_KEY) {
            prompts.clean = text;
        }
        if let Some(text) = overrides.remove(EXTRACT_KEY) {
            prompts.extract = text;
        }
        if let Some(text) = overrides.remove(SOCIAL_KEY) {
            prompts.social = text;
        }
        info!(dir = %dir.display(), "Prompt templates loaded");
        Ok(prompts)
    }

    pub fn render_clean(&self, newsletter: &str) -> String {
        render(&self.clean, &[("newsletter", newsletter)])
    }

    pub fn render_extract(&self, cleaned: &str) -> String {
        render(&self.extract, &[("cleaned", cleaned)])
    }

    pub fn render_social(&self, title: &str, summary: &str) -> String {
        render(&self.social, &[("title", title), ("summary", summary)])
    }
}

/// Split a sectioned prompts file. A file with no headers is the clean prompt.
fn parse_sections(raw: &str) -> HashMap<String, String> {
    let headers: Vec<_> = SECTION_HEADER.captures_iter(raw).collect();
    let mut out = HashMap::new();

    if headers.is_empty() {
        debug!("No section headers in prompts file, using it as the clean prompt");
        out.insert(CLEAN_KEY.to_string(), raw.trim().to_string());
        return out;
    }

    for (i, caps) in headers.iter().enumerate() {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let end = headers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(raw.len(), |m| m.start());
        out.insert(name.as_str().to_string(), raw[whole.end()..end].trim().to_string());
    }
    out
}

/// Substitute `{name}` placeholders. `{{` and `}}` are literal braces;
/// unknown placeholders are left as written.
fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len() + 256);
    let mut rest = template;

    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") || tail.starts_with("}}") {
            out.push_str(&tail[..1]);
            rest = &tail[2..];
            continue;
        }

        if tail.starts_with('{')
            && let Some(close) = tail.find('}')
            && let Some((_, value)) = vars.iter().find(|(name, _)| *name == &tail[1..close])
        {
            out.push_str(value);
            rest = &tail[close + 1..];
            continue;
        }

        out.push_str(&tail[..1]);
        rest = &tail[1..];
    }
    out.push_str(rest);
    out
}

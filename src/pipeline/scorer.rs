//! Keyword and sender-authority scoring.

use std::collections::HashMap;

use crate::pipeline::types::StoryCandidate;

/// Scores candidates: +1.0 per priority keyword present in the title or
/// summary, then multiplied by the sender's authority if one is configured.
#[derive(Debug, Clone, Default)]
pub struct Scorer {
    /// Lowercased, non-empty, deduplicated, in first-seen order.
    keywords: Vec<String>,
    /// Lowercased sender → multiplier.
    authority: HashMap<String, f64>,
}

impl Scorer {
    pub fn new(keywords: &[String], authority: &HashMap<String, f64>) -> Self {
        let mut normalized: Vec<String> = Vec::with_capacity(keywords.len());
        for keyword in keywords {
            let keyword = keyword.trim().to_lowercase();
            if !keyword.is_empty() && !normalized.contains(&keyword) {
                normalized.push(keyword);
            }
        }

        let authority = authority
            .iter()
            .map(|(sender, weight)| (sender.trim().to_lowercase(), *weight))
            .collect();

        Self {
            keywords: normalized,
            authority,
        }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn score(&self, story: &StoryCandidate) -> f64 {
        let text = format!("{} {}", story.title, story.summary).to_lowercase();
        let hits = self
            .keywords
            .iter()
            .filter(|keyword| text.contains(keyword.as_str()))
            .count();

        let base = hits as f64;
        match self.authority.get(&story.sender_email.to_lowercase()) {
            Some(multiplier) => base * multiplier,
            None => base,
        }
    }

    /// Set `score` on every candidate in place.
    pub fn score_all(&self, stories: &mut [StoryCandidate]) {
        for story in stories {
            story.score = self.score(story);
        }
    }
}

/// One-off scoring without building a [`Scorer`].
pub fn score(story: &StoryCandidate, keywords: &[String], authority: &HashMap<String, f64>) -> f64 {
    Scorer::new(keywords, authority).score(story)
}

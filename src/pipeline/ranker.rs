//! Global ranking with fuzzy-title deduplication.
//!
//! Candidates are stably sorted by score, then kept greedily: a candidate
//! survives only if its title is no more similar than the threshold to every
//! title already kept. Order-sensitive by construction; a near-duplicate of a
//! kept story is always dropped, whatever its own score.

use std::cmp::Ordering;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::pipeline::types::StoryCandidate;

static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\W+").expect("static regex"));

/// Result of a ranking pass.
#[derive(Debug, Clone, Default)]
pub struct Ranked {
    pub kept: Vec<StoryCandidate>,
    /// Candidates rejected as near-duplicates before the target was reached.
    pub duplicates_dropped: usize,
}

/// Sort, deduplicate, and truncate to at most `target_count` stories.
pub fn rank(candidates: Vec<StoryCandidate>, target_count: usize, threshold: f64) -> Vec<StoryCandidate> {
    rank_with_stats(candidates, target_count, threshold).kept
}

pub fn rank_with_stats(
    mut candidates: Vec<StoryCandidate>,
    target_count: usize,
    threshold: f64,
) -> Ranked {
    candidates.sort_by(|a, b| by_score_desc(a.score, b.score));

    let mut ranked = Ranked::default();
    let mut kept_titles: Vec<String> = Vec::new();

    for candidate in candidates {
        if ranked.kept.len() >= target_count {
            break;
        }
        let title = normalize_title(&candidate.title);
        let closest = kept_titles
            .iter()
            .map(|kept| normalized_similarity(&title, kept))
            .fold(0.0_f64, f64::max);

        if closest > threshold {
            debug!(title = %candidate.title, similarity = closest, "Dropping near-duplicate");
            ranked.duplicates_dropped += 1;
            continue;
        }
        kept_titles.push(title);
        ranked.kept.push(candidate);
    }

    ranked
}

/// Descending by score; NaN sorts after every number.
fn by_score_desc(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

/// Lowercase, collapse runs of non-word characters to one space, trim.
pub fn normalize_title(title: &str) -> String {
    NON_WORD
        .replace_all(&title.to_lowercase(), " ")
        .trim()
        .to_string()
}

/// Similarity of two titles in `[0, 1]` after normalization.
pub fn similarity(a: &str, b: &str) -> f64 {
    normalized_similarity(&normalize_title(a), &normalize_title(b))
}

/// Gestalt pattern-matching ratio `2M / (|a| + |b|)`.
fn normalized_similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_chars(&a, &b) as f64 / total as f64
}

/// Total size of the recursively found longest common blocks.
fn matching_chars(a: &[char], b: &[char]) -> usize {
    let mut matched = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];

    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let (i, j, size) = longest_block(a, b, alo, ahi, blo, bhi);
        if size == 0 {
            continue;
        }
        matched += size;
        if alo < i && blo < j {
            pending.push((alo, i, blo, j));
        }
        if i + size < ahi && j + size < bhi {
            pending.push((i + size, ahi, j + size, bhi));
        }
    }
    matched
}

/// Longest common run of `a[alo..ahi]` and `b[blo..bhi]`, earliest on ties.
fn longest_block(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best) = (alo, blo, 0);
    // run[j + 1] = length of the common run ending at (i, j).
    let mut prev = vec![0usize; bhi - blo + 1];
    let mut run = vec![0usize; bhi - blo + 1];

    for i in alo..ahi {
        for j in blo..bhi {
            let k = j - blo;
            run[k + 1] = if a[i] == b[j] { prev[k] + 1 } else { 0 };
            if run[k + 1] > best {
                best = run[k + 1];
                best_i = i + 1 - best;
                best_j = j + 1 - best;
            }
        }
        std::mem::swap(&mut prev, &mut run);
    }
    (best_i, best_j, best)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(title: &str, score: f64) -> StoryCandidate {
        StoryCandidate {
            title: title.into(),
            summary: String::new(),
            date_iso: "2026-10-16T07:00:00+00:00".into(),
            sender_email: "news@example.com".into(),
            score,
        }
    }

    fn titles(stories: &[StoryCandidate]) -> Vec<&str> {
        stories.iter().map(|s| s.title.as_str()).collect()
    }

    #[test]
    fn near_duplicate_headline_is_dropped() {
        let candidates = vec![
            candidate("OpenAI launches GPT 5 today", 2.0),
            candidate("Weather update", 1.0),
            candidate("OpenAI launches GPT-5", 3.0),
        ];
        let ranked = rank_with_stats(candidates, 2, 0.85);
        assert_eq!(
            titles(&ranked.kept),
            vec!["OpenAI launches GPT-5", "Weather update"]
        );
        assert_eq!(ranked.duplicates_dropped, 1);
    }

    #[test]
    fn similarity_matches_gestalt_ratio() {
        assert!((similarity("OpenAI launches GPT-5", "OpenAI launches GPT 5 today") - 0.875).abs() < 1e-9);
        assert_eq!(similarity("abc", "abc"), 1.0);
        assert_eq!(similarity("abc", "xyz"), 0.0);
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("", "abc"), 0.0);
        // "abcd" vs "bcda": longest block "bcd", nothing on either side.
        assert!((similarity("abcd", "bcda") - 0.75).abs() < 1e-9);
    }

    #[test]
    fn normalization_ignores_case_and_punctuation() {
        assert_eq!(normalize_title("  GPT-5: What's New?! "), "gpt 5 what s new");
        assert_eq!(similarity("GPT-5 Launch!", "gpt 5 launch"), 1.0);
    }

    #[test]
    fn ranking_is_bounded() {
        let candidates: Vec<_> = (0..6)
            .map(|i| candidate(&format!("distinct headline number {}", "x".repeat(i * 7)), i as f64))
            .collect();
        for n in 0..10 {
            let kept = rank(candidates.clone(), n, 0.85);
            assert!(kept.len() <= n.min(candidates.len()));
        }
        assert!(rank(candidates, 0, 0.85).is_empty());
    }

    #[test]
    fn reranking_deduplicated_set_is_idempotent() {
        let candidates = vec![
            candidate("OpenAI launches GPT-5", 3.0),
            candidate("OpenAI launches GPT 5 today", 2.5),
            candidate("Nvidia earnings beat expectations", 2.0),
            candidate("Hugging Face raises new round", 1.0),
            candidate("Weather update", 1.0),
        ];
        let once = rank(candidates, 10, 0.85);
        let twice = rank(once.clone(), 10, 0.85);
        assert_eq!(once, twice);
    }

    #[test]
    fn equal_scores_keep_input_order() {
        let candidates = vec![
            candidate("first story", 1.0),
            candidate("second item", 1.0),
            candidate("third thing", 1.0),
        ];
        let kept = rank(candidates, 10, 0.85);
        assert_eq!(titles(&kept), vec!["first story", "second item", "third thing"]);
    }

    #[test]
    fn nan_scores_sort_last() {
        let candidates = vec![
            candidate("not a number", f64::NAN),
            candidate("low", 0.5),
            candidate("high", 2.0),
        ];
        let kept = rank(candidates, 10, 0.85);
        assert_eq!(titles(&kept), vec!["high", "low", "not a number"]);
    }

    #[test]
    fn threshold_one_keeps_only_exact_duplicates_out() {
        let candidates = vec![candidate("same", 2.0), candidate("Same!", 1.0)];
        // Identical after normalization: ratio 1.0 does not exceed 1.0.
        assert_eq!(rank(candidates.clone(), 10, 1.0).len(), 2);
        assert_eq!(rank(candidates, 10, 0.99).len(), 1);
    }
}

//! Link scoring: per-link signals in, ranked candidate list out.
//!
//! The score is a weighted sum of bounded terms plus flat bonuses. It is not
//! clamped, so a visible, clicked link inside a heading can exceed 1.0.

use crate::collector::LinkObservation;
use crate::config::ScoringConfig;
use crate::types::ScoredLink;

/// Anchor text fragments that signal "continue reading" intent.
pub const INTENT_KEYWORDS: &[&str] = &[
    "next",
    "more",
    "continue",
    "read more",
    "details",
    "次へ",
    "続き",
    "もっと見る",
    "詳細",
];

/// Whether `text` contains any intent keyword (case-insensitive).
pub fn has_intent_keyword(text: &str) -> bool {
    let lower = text.to_lowercase();
    INTENT_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Score a single observation.
pub fn score_observation(obs: &LinkObservation, config: &ScoringConfig) -> f64 {
    let w = &config.weights;
    let mut score = 0.0;

    if obs.visible {
        score += w.visibility;
        let distance = (obs.relative_position.1 - 0.5).abs();
        if config.position_falloff > 0.0 && distance < config.position_falloff {
            score += w.position * (1.0 - distance / config.position_falloff);
        }
    }

    if obs.relative_area > config.min_area_fraction {
        let saturation = config.saturating_area_fraction.max(config.min_area_fraction);
        let fraction = if saturation > 0.0 {
            (obs.relative_area / saturation).min(1.0)
        } else {
            1.0
        };
        score += w.relative_size * fraction;
    }

    if config.click_cap > 0 {
        let clicks = obs.click_count.min(config.click_cap) as f64;
        score += w.clicks * clicks / config.click_cap as f64;
    }
    if config.hover_cap > 0 {
        let hovers = obs.hover_count.min(config.hover_cap) as f64;
        score += w.hovers * hovers / config.hover_cap as f64;
    }

    if has_intent_keyword(&obs.anchor_text) {
        score += config.keyword_bonus;
    }

    if obs.near_heading {
        score += config.heading_bonus;
    }
    if obs.in_main_content {
        score += config.main_content_bonus;
    }

    score
}

/// Score every attached link and return the best, highest first.
///
/// Equal scores keep their input order. The result is truncated to
/// `max_links_to_report`.
pub fn score_links<'a, I>(observations: I, config: &ScoringConfig) -> Vec<ScoredLink>
where
    I: IntoIterator<Item = (&'a str, &'a LinkObservation)>,
{
    let mut scored: Vec<ScoredLink> = observations
        .into_iter()
        .filter(|(_, obs)| obs.attached)
        .map(|(url, obs)| ScoredLink {
            url: url.to_string(),
            score: score_observation(obs, config),
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(config.max_links_to_report);
    scored
}

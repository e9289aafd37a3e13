// ── Inference: Rule-Based Fallback Tier ─────────────────────────────────────
//
// The last tier of the inference chain. Deterministic keyword/rule
// heuristics per task type: no model, no network, no failure path.
//
//   intent          "I want to buy this now"  → purchase (0.8)
//   sentiment       lexicon polarity          → positive / negative / neutral
//   recommendation  popularity over unseen candidates
//   classification  label-name mentions in the text
//   anything else   {"prediction": null} at 0.1
//
// Confidence stays at or below HEURISTIC_MATCH_CONFIDENCE so callers can
// tell these answers apart from model output.

use crate::atoms::constants::{
    HEURISTIC_DEFAULT_CONFIDENCE, HEURISTIC_MATCH_CONFIDENCE, HEURISTIC_UNKNOWN_TASK_CONFIDENCE,
    HEURISTIC_WEAK_CONFIDENCE,
};
use serde_json::{json, Value};

/// Run the heuristic for `task_type`. Returns (output, confidence).
pub fn heuristic(task_type: &str, input: &Value) -> (Value, f64) {
    match task_type {
        "intent" => classify_intent(&input_text(input)),
        "sentiment" => score_sentiment(&input_text(input)),
        "recommendation" => recommend(input),
        "classification" => classify_labels(input),
        other => (
            json!({ "prediction": null, "reason": format!("no heuristic for task '{other}'") }),
            HEURISTIC_UNKNOWN_TASK_CONFIDENCE,
        ),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Intent
// ═══════════════════════════════════════════════════════════════════════════

const INTENT_RULES: &[(&str, &[&str])] = &[
    ("purchase", &["buy", "purchase", "order", "checkout", "add to cart", "pay", "price", "subscribe"]),
    ("support", &["help", "problem", "issue", "broken", "refund", "return", "support", "not working"]),
    ("search", &["find", "search", "looking for", "where is", "show me"]),
    ("cancel", &["cancel", "unsubscribe", "stop", "close my account"]),
];

/// Keyword vote; ties go to the earlier rule. No hit → "browse".
pub fn classify_intent(text: &str) -> (Value, f64) {
    let q = text.to_lowercase();
    let words = tokenize(&q);

    let mut best: Option<(&str, Vec<&str>)> = None;
    for (intent, terms) in INTENT_RULES {
        let hits: Vec<&str> = terms.iter().copied().filter(|t| has_term(&q, &words, t)).collect();
        if hits.is_empty() {
            continue;
        }
        if best.as_ref().map_or(true, |(_, b)| hits.len() > b.len()) {
            best = Some((*intent, hits));
        }
    }

    match best {
        Some((intent, hits)) => (
            json!({ "intent": intent, "keywords": hits }),
            HEURISTIC_MATCH_CONFIDENCE,
        ),
        None => (json!({ "intent": "browse", "keywords": [] }), HEURISTIC_DEFAULT_CONFIDENCE),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Sentiment
// ═══════════════════════════════════════════════════════════════════════════

const POSITIVE: &[&str] = &[
    "good", "great", "love", "excellent", "amazing", "happy", "awesome", "like", "perfect", "thanks",
];
const NEGATIVE: &[&str] = &[
    "bad", "terrible", "hate", "awful", "poor", "angry", "worst", "broken", "slow", "disappointed",
];

pub fn score_sentiment(text: &str) -> (Value, f64) {
    let q = text.to_lowercase();
    let words = tokenize(&q);
    let pos = POSITIVE.iter().filter(|t| words.contains(*t)).count() as f64;
    let neg = NEGATIVE.iter().filter(|t| words.contains(*t)).count() as f64;

    if pos + neg == 0.0 {
        return (json!({ "sentiment": "neutral", "score": 0.0 }), HEURISTIC_DEFAULT_CONFIDENCE);
    }
    let score = (pos - neg) / (pos + neg);
    let label = if score > 0.0 {
        "positive"
    } else if score < 0.0 {
        "negative"
    } else {
        "neutral"
    };
    (json!({ "sentiment": label, "score": score }), HEURISTIC_WEAK_CONFIDENCE)
}

// ═══════════════════════════════════════════════════════════════════════════
// Recommendation
// ═══════════════════════════════════════════════════════════════════════════

const DEFAULT_RECOMMENDATION_LIMIT: usize = 5;

/// Input: {"candidates": [{"id", "popularity"?}], "history": [id], "limit"?}.
/// Most popular unseen candidates first; equal popularity keeps input order.
pub fn recommend(input: &Value) -> (Value, f64) {
    let history: Vec<&str> = input["history"]
        .as_array()
        .map(|h| h.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();
    let limit = input["limit"]
        .as_u64()
        .map(|l| l as usize)
        .unwrap_or(DEFAULT_RECOMMENDATION_LIMIT);

    let mut candidates: Vec<(&str, f64)> = input["candidates"]
        .as_array()
        .map(|list| {
            list.iter()
                .filter_map(|c| {
                    let id = c["id"].as_str().or_else(|| c.as_str())?;
                    Some((id, c["popularity"].as_f64().unwrap_or(0.0)))
                })
                .filter(|(id, _)| !history.contains(id))
                .collect()
        })
        .unwrap_or_default();
    candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let items: Vec<&str> = candidates.into_iter().take(limit).map(|(id, _)| id).collect();
    let confidence = if items.is_empty() {
        HEURISTIC_UNKNOWN_TASK_CONFIDENCE
    } else {
        HEURISTIC_DEFAULT_CONFIDENCE
    };
    (json!({ "items": items, "strategy": "popularity" }), confidence)
}

// ═══════════════════════════════════════════════════════════════════════════
// Classification
// ═══════════════════════════════════════════════════════════════════════════

/// Input: {"text", "labels": [..]}. Picks the label mentioned most often.
pub fn classify_labels(input: &Value) -> (Value, f64) {
    let q = input_text(input).to_lowercase();
    let labels: Vec<&str> = input["labels"]
        .as_array()
        .map(|l| l.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    let best = labels
        .iter()
        .map(|label| (*label, q.matches(&label.to_lowercase()).count()))
        .filter(|(_, n)| *n > 0)
        .fold(None::<(&str, usize)>, |acc, cur| match acc {
            Some(a) if a.1 >= cur.1 => Some(a),
            _ => Some(cur),
        });

    match (best, labels.first()) {
        (Some((label, _)), _) => (json!({ "label": label }), HEURISTIC_WEAK_CONFIDENCE),
        (None, Some(first)) => (json!({ "label": first }), HEURISTIC_UNKNOWN_TASK_CONFIDENCE),
        (None, None) => (json!({ "label": "unknown" }), HEURISTIC_UNKNOWN_TASK_CONFIDENCE),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════════════

/// Text from a string input or from its `text` / `query` field.
fn input_text(input: &Value) -> String {
    match input {
        Value::String(s) => s.clone(),
        other => other["text"]
            .as_str()
            .or_else(|| other["query"].as_str())
            .unwrap_or_default()
            .to_string(),
    }
}

fn tokenize(s: &str) -> Vec<&str> {
    s.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .collect()
}

/// Phrases match as substrings, single words as whole tokens.
fn has_term(q: &str, words: &[&str], term: &str) -> bool {
    if term.contains(' ') {
        q.contains(term)
    } else {
        words.contains(&term)
    }
}

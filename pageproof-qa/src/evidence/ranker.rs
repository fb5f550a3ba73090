//! Line grouping, scoring, and selection (C6), as pure functions over
//! in-memory span slices so they can be unit tested without a store.

use pageproof_model::domain::{BBox, EvidenceItem, Span};
use pageproof_model::Settings;
use regex::Regex;
use std::sync::OnceLock;

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "of", "to", "in", "on", "for", "and", "or", "is", "was", "were", "are", "be",
    "who", "what", "when", "where", "which", "how", "did", "does", "do", "from", "with", "by", "at",
    "as", "about",
];

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[A-Za-z0-9]+").expect("static regex"))
}

/// Tokenizes `text` into lowercase `[A-Za-z0-9]+` runs of length >= 3,
/// excluding the fixed stopword set.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    token_pattern()
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .filter(|t| t.len() >= 3 && !STOPWORDS.contains(&t.as_str()))
        .collect()
}

fn term_matches(term: &str, token: &str) -> bool {
    term == token || token.contains(term) || term.contains(token)
}

/// Number of `terms` for which any line token matches (per `term_matches`).
#[must_use]
pub fn overlap_count(line_tokens: &[String], terms: &[String]) -> usize {
    terms
        .iter()
        .filter(|term| line_tokens.iter().any(|t| term_matches(term, t)))
        .count()
}

/// Weighted overlap: longer matched terms are more discriminative, capped.
#[must_use]
pub fn weighted_overlap(line_tokens: &[String], terms: &[String]) -> f64 {
    terms
        .iter()
        .filter(|term| line_tokens.iter().any(|t| term_matches(term, t)))
        .map(|term| 1.0 + (0.6_f64).min(0.0_f64.max((term.len() as f64 - 4.0) * 0.08)))
        .sum()
}

/// Dice coefficient over character bigrams — a cheap, dependency-free
/// stand-in for `difflib.SequenceMatcher.ratio`, used only for the small
/// fuzzy-match checks in signature-mode scoring.
#[must_use]
pub fn similarity(a: &str, b: &str) -> f64 {
    fn bigrams(s: &str) -> Vec<(char, char)> {
        let chars: Vec<char> = s.chars().collect();
        chars.windows(2).map(|w| (w[0], w[1])).collect()
    }
    let ba = bigrams(a);
    let bb = bigrams(b);
    if ba.is_empty() || bb.is_empty() {
        return if a == b { 1.0 } else { 0.0 };
    }
    let mut bb_remaining = bb.clone();
    let mut matches = 0usize;
    for pair in &ba {
        if let Some(pos) = bb_remaining.iter().position(|p| p == pair) {
            bb_remaining.remove(pos);
            matches += 1;
        }
    }
    2.0 * matches as f64 / (ba.len() + bb.len()) as f64
}

/// One grouped line of spans on a page, in left-to-right order.
#[derive(Debug, Clone)]
pub struct Line {
    pub spans: Vec<Span>,
    pub text: String,
    pub y1: f64,
}

fn mid_y(span: &Span) -> f64 {
    (span.bbox.y1 + span.bbox.y2) / 2.0
}

fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Groups same-page spans into lines by sweeping in `(mid_y, x1)` order and
/// appending to the running line while within a per-page adaptive
/// tolerance.
#[must_use]
pub fn group_lines(spans: &[Span]) -> Vec<Line> {
    if spans.is_empty() {
        return Vec::new();
    }
    let mut sorted: Vec<Span> = spans.to_vec();
    sorted.sort_by(|a, b| mid_y(a).total_cmp(&mid_y(b)).then_with(|| a.bbox.x1.total_cmp(&b.bbox.x1)));

    let mut heights: Vec<f64> = sorted.iter().map(|s| (0.5_f64).max(s.bbox.y2 - s.bbox.y1)).collect();
    let tolerance = (median(&mut heights) * 0.65).clamp(2.5, 10.0);

    let mut lines: Vec<Vec<Span>> = Vec::new();
    let mut line_center = 0.0f64;

    for span in sorted {
        let y = mid_y(&span);
        if let Some(current) = lines.last_mut() {
            if (y - line_center).abs() <= tolerance {
                let n = current.len() as f64;
                line_center = (line_center * n + y) / (n + 1.0);
                current.push(span);
                continue;
            }
        }
        line_center = y;
        lines.push(vec![span]);
    }

    lines
        .into_iter()
        .map(|mut spans| {
            spans.sort_by(|a, b| a.bbox.x1.total_cmp(&b.bbox.x1));
            let text = spans
                .iter()
                .map(|s| s.text.as_str())
                .collect::<Vec<_>>()
                .join(" ")
                .trim()
                .to_string();
            let y1 = spans.iter().map(|s| s.bbox.y1).fold(f64::INFINITY, f64::min);
            Line { spans, text, y1 }
        })
        .collect()
}

const OPERATIONAL_PENALTY_TABLE: &[(&str, f64)] = &[
    ("order source", 1.00),
    ("order receive", 1.00),
    ("order continued", 0.95),
    ("order acknowledged", 0.95),
    ("order enter", 0.90),
    ("order from set", 0.85),
    ("in pom", 0.85),
    ("order's status changed", 0.75),
];

fn operational_penalty(lower_text: &str) -> f64 {
    let mut penalty = 0.0;
    if lower_text.contains("ordering doctor") {
        penalty += 1.35;
    }
    for (marker, weight) in OPERATIONAL_PENALTY_TABLE {
        if lower_text.contains(marker) {
            penalty += weight;
        }
    }
    penalty
}

fn signature_signal(lower_text: &str) -> f64 {
    let padded = format!(" {lower_text} ");
    if padded.contains(" signed by ") || padded.contains(" signature ") {
        let mut signal = 2.0;
        if padded.contains(" by ") {
            signal += 0.25;
        }
        return signal;
    }

    let mut best = 0.0f64;
    for token in tokenize(lower_text) {
        if token.len() < 4 {
            continue;
        }
        let candidate = if token.starts_with("sig") {
            1.6
        } else if token.starts_with('s') && similarity(&token, "signed") >= 0.60 {
            1.35
        } else if similarity(&token, "electronic") >= 0.68 {
            1.15
        } else {
            0.0
        };
        best = best.max(candidate);
    }

    if best > 0.0 && padded.contains(" by ") {
        best += 0.25;
    }
    best
}

/// Whether the question triggers signature-mode scoring.
#[must_use]
pub fn is_signature_question(question: &str) -> bool {
    let lower = question.to_lowercase();
    lower.contains("signed") || lower.contains("signature") || lower.contains("who signed")
}

struct ScoredLine {
    line: Line,
    base_score: f64,
    signature_signal: f64,
    answer_overlap: usize,
    question_overlap: usize,
}

fn score_lines(
    lines: Vec<Line>,
    question_terms: &[String],
    answer_terms: &[String],
    w_q: f64,
    w_a: f64,
    signature_mode: bool,
) -> Vec<ScoredLine> {
    lines
        .into_iter()
        .map(|line| {
            let tokens = tokenize(&line.text);
            let question_overlap = overlap_count(&tokens, question_terms);
            let answer_overlap = overlap_count(&tokens, answer_terms);
            let mut base_score =
                w_q * weighted_overlap(&tokens, question_terms) + w_a * weighted_overlap(&tokens, answer_terms);

            let signature = if signature_mode {
                let lower = line.text.to_lowercase();
                let signal = signature_signal(&lower);
                let penalty = operational_penalty(&lower);
                base_score += 1.35 * signal - penalty;
                signal
            } else {
                0.0
            };

            ScoredLine { line, base_score, signature_signal: signature, answer_overlap, question_overlap }
        })
        .collect()
}

struct FinalScoredLine {
    line: Line,
    base_score: f64,
    signature_signal: f64,
    final_score: f64,
    answer_overlap: usize,
    question_overlap: usize,
}

fn context_rerank(
    scored: Vec<ScoredLine>,
    question_terms: &[String],
    answer_terms: &[String],
    w_q: f64,
    w_a: f64,
) -> Vec<FinalScoredLine> {
    let n = scored.len();
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let lo = i.saturating_sub(1);
        let hi = (i + 2).min(n);
        let joined: String = scored[lo..hi].iter().map(|s| s.line.text.as_str()).collect::<Vec<_>>().join(" ");
        let joined_tokens = tokenize(&joined);
        let context_score =
            w_q * weighted_overlap(&joined_tokens, question_terms) + w_a * weighted_overlap(&joined_tokens, answer_terms);

        let mut neighbor_overlap = 0.0;
        for (j, other) in scored.iter().enumerate().take(hi).skip(lo) {
            if j == i {
                continue;
            }
            neighbor_overlap += (2.0_f64).min((other.answer_overlap + other.question_overlap) as f64);
        }

        let s = &scored[i];
        let final_score =
            0.72 * s.base_score + 0.28 * context_score + 0.08 * neighbor_overlap + 0.12 * s.signature_signal;

        out.push(FinalScoredLine {
            line: s.line.clone(),
            base_score: s.base_score,
            signature_signal: s.signature_signal,
            final_score,
            answer_overlap: s.answer_overlap,
            question_overlap: s.question_overlap,
        });
    }
    out
}

fn sort_ranked(lines: &mut [FinalScoredLine]) {
    lines.sort_by(|a, b| {
        b.final_score
            .total_cmp(&a.final_score)
            .then_with(|| b.signature_signal.total_cmp(&a.signature_signal))
            .then_with(|| b.base_score.total_cmp(&a.base_score))
            .then_with(|| {
                let sum_a = (a.answer_overlap + a.question_overlap) as f64;
                let sum_b = (b.answer_overlap + b.question_overlap) as f64;
                sum_b.total_cmp(&sum_a)
            })
            .then_with(|| a.line.y1.total_cmp(&b.line.y1))
    });
}

fn select_indices(
    ranked: &[FinalScoredLine],
    signature_mode: bool,
    min_keyword_overlap: u32,
) -> Vec<usize> {
    if signature_mode {
        return ranked
            .iter()
            .enumerate()
            .filter(|(_, l)| l.signature_signal >= 0.9)
            .map(|(i, _)| i)
            .collect();
    }

    let is_relevant = |l: &FinalScoredLine| {
        (l.answer_overlap + l.question_overlap) as u32 > 0 || l.base_score >= 0.75 || l.signature_signal >= 0.9
    };

    let candidates: Vec<usize> = ranked
        .iter()
        .enumerate()
        .filter(|(_, l)| (l.answer_overlap + l.question_overlap) as u32 >= min_keyword_overlap)
        .map(|(i, _)| i)
        .collect();
    let candidates = if candidates.is_empty() && !ranked.is_empty() { vec![0] } else { candidates };

    let mut chosen: Vec<usize> = Vec::new();
    let seeds: Vec<usize> = candidates.iter().take(2).copied().collect();
    for &seed in &seeds {
        if !chosen.contains(&seed) {
            chosen.push(seed);
        }
        for neighbor in [seed + 1, seed.wrapping_sub(1)] {
            if neighbor == usize::MAX || neighbor >= ranked.len() || chosen.contains(&neighbor) {
                continue;
            }
            if is_relevant(&ranked[neighbor]) {
                chosen.push(neighbor);
            }
        }
    }

    for &idx in &candidates {
        if !chosen.contains(&idx) && is_relevant(&ranked[idx]) {
            chosen.push(idx);
        }
    }

    if chosen.is_empty() {
        chosen = candidates;
    }
    if chosen.is_empty() && !ranked.is_empty() {
        chosen.push(0);
    }

    chosen
}

/// Result of ranking one page's spans: evidence items with their score,
/// for cross-page deduplication and global filtering.
pub struct PageEvidence {
    pub item: EvidenceItem,
    pub score: f64,
}

/// Full per-page ranking pipeline: group lines, score, re-rank, select.
#[must_use]
pub fn rank_page(
    page_number: i32,
    page_width: Option<f64>,
    page_height: Option<f64>,
    spans: &[Span],
    question: &str,
    answer: &str,
    settings: &Settings,
) -> Vec<PageEvidence> {
    let lines = group_lines(spans);
    if lines.is_empty() {
        return Vec::new();
    }

    let question_terms = tokenize(question);
    let answer_terms = tokenize(answer);
    let (w_q, w_a) = settings.evidence_weights();
    let signature_mode = is_signature_question(question);

    let scored = score_lines(lines, &question_terms, &answer_terms, w_q, w_a, signature_mode);
    let mut ranked = context_rerank(scored, &question_terms, &answer_terms, w_q, w_a);
    sort_ranked(&mut ranked);

    let indices = select_indices(&ranked, signature_mode, settings.retrieval_min_keyword_overlap);

    indices
        .into_iter()
        .filter_map(|i| {
            let line = &ranked[i];
            let boxes: Vec<&BBox> = line.line.spans.iter().map(|s| &s.bbox).collect();
            let bbox = BBox::union(&boxes)?;
            if bbox.is_degenerate() {
                return None;
            }
            Some(PageEvidence {
                item: EvidenceItem { page: page_number, text: line.line.text.clone(), bbox, page_width, page_height },
                score: line.final_score,
            })
        })
        .collect()
}

/// Cross-page de-duplication: key on the bbox rounded to 0.1pt; on
/// collision keep the higher-scoring item.
#[must_use]
pub fn dedup_cross_page(items: Vec<PageEvidence>) -> Vec<PageEvidence> {
    use std::collections::HashMap;
    let mut by_key: HashMap<String, PageEvidence> = HashMap::new();
    for evidence in items {
        let b = &evidence.item.bbox;
        let key = format!(
            "{}:{:.1}:{:.1}:{:.1}:{:.1}",
            evidence.item.page, b.x1, b.y1, b.x2, b.y2
        );
        match by_key.get(&key) {
            Some(existing) if existing.score >= evidence.score => {}
            _ => {
                by_key.insert(key, evidence);
            }
        }
    }
    by_key.into_values().collect()
}

/// Global filtering: scores floor, drop-ratio stop, max-items truncation,
/// always keeping the top-1. Returns items re-sorted for display order
/// `(page, y1, x1)`.
#[must_use]
pub fn filter_and_order_for_display(mut items: Vec<PageEvidence>, settings: &Settings) -> Vec<EvidenceItem> {
    if items.is_empty() {
        return Vec::new();
    }

    items.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.item.page.cmp(&b.item.page))
            .then_with(|| a.item.bbox.y1.total_cmp(&b.item.bbox.y1))
            .then_with(|| a.item.bbox.x1.total_cmp(&b.item.bbox.x1))
    });

    let best = items[0].score;
    let floor = settings.evidence_min_absolute_score.max(best * settings.evidence_relative_score_threshold);

    let mut kept = Vec::with_capacity(items.len());
    let mut prev_score = best;
    for (i, evidence) in items.into_iter().enumerate() {
        if i > 0 {
            if evidence.score < floor {
                break;
            }
            if prev_score > 0.0 && evidence.score / prev_score < settings.evidence_drop_ratio_stop {
                break;
            }
        }
        prev_score = evidence.score;
        kept.push(evidence);
        if settings.answer_max_evidence_items > 0 && kept.len() >= settings.answer_max_evidence_items {
            break;
        }
    }

    kept.sort_by(|a, b| {
        a.item
            .page
            .cmp(&b.item.page)
            .then_with(|| a.item.bbox.y1.total_cmp(&b.item.bbox.y1))
            .then_with(|| a.item.bbox.x1.total_cmp(&b.item.bbox.x1))
            .then_with(|| b.score.total_cmp(&a.score))
    });

    kept.into_iter().map(|e| e.item).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn span(id: i64, x1: f64, y1: f64, x2: f64, y2: f64, text: &str) -> Span {
        Span {
            id,
            document_id: Uuid::nil(),
            page_id: 1,
            page_number: 1,
            span_index: id as i32,
            text: text.to_string(),
            bbox: BBox { x1, y1, x2, y2 },
            char_start: None,
            char_end: None,
        }
    }

    #[test]
    fn tokenize_drops_stopwords_and_short_tokens() {
        let tokens = tokenize("Who signed the order for Dr. A. Patel?");
        assert!(!tokens.contains(&"who".to_string()));
        assert!(!tokens.contains(&"the".to_string()));
        assert!(tokens.contains(&"signed".to_string()));
        assert!(tokens.contains(&"order".to_string()));
        assert!(tokens.contains(&"patel".to_string()));
    }

    #[test]
    fn group_lines_separates_distinct_rows() {
        let spans = vec![
            span(1, 0.0, 0.0, 10.0, 10.0, "Line1"),
            span(2, 12.0, 0.0, 20.0, 10.0, "End"),
            span(3, 0.0, 50.0, 10.0, 60.0, "Line2"),
        ];
        let lines = group_lines(&spans);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "Line1 End");
        assert_eq!(lines[1].text, "Line2");
    }

    #[test]
    fn s5_signature_question_selects_only_signature_line() {
        let spans = vec![
            span(1, 0.0, 0.0, 50.0, 10.0, "Signed"),
            span(2, 52.0, 0.0, 60.0, 10.0, "by"),
            span(3, 62.0, 0.0, 90.0, 10.0, "Dr. A. Patel"),
            span(4, 0.0, 20.0, 60.0, 30.0, "Ordering doctor:"),
            span(5, 62.0, 20.0, 90.0, 30.0, "B. Smith"),
        ];
        let settings = Settings::default();
        let results = rank_page(1, None, None, &spans, "Who signed the order?", "Dr. A. Patel signed.", &settings);
        assert_eq!(results.len(), 1);
        assert!(results[0].item.text.to_lowercase().contains("signed"));
    }

    #[test]
    fn normal_mode_prefers_overlapping_lines() {
        let spans = vec![
            span(1, 0.0, 0.0, 60.0, 10.0, "The patient received medication"),
            span(2, 0.0, 20.0, 60.0, 30.0, "Completely unrelated filler text"),
        ];
        let settings = Settings::default();
        let results = rank_page(1, None, None, &spans, "What medication did the patient receive?", "medication", &settings);
        assert!(!results.is_empty());
        assert!(results[0].item.text.to_lowercase().contains("medication"));
    }

    #[test]
    fn dedup_keeps_higher_scoring_item_on_key_collision() {
        let bbox = BBox { x1: 0.0, y1: 0.0, x2: 10.0, y2: 10.0 };
        let item = EvidenceItem { page: 1, text: "a".to_string(), bbox, page_width: None, page_height: None };
        let low = PageEvidence { item: item.clone(), score: 0.3 };
        let high = PageEvidence { item, score: 0.9 };
        let deduped = dedup_cross_page(vec![low, high]);
        assert_eq!(deduped.len(), 1);
        assert!((deduped[0].score - 0.9).abs() < 1e-9);
    }

    #[test]
    fn global_filter_always_keeps_top_one() {
        let settings = Settings::default();
        let make = |page: i32, score: f64| PageEvidence {
            item: EvidenceItem {
                page,
                text: "x".to_string(),
                bbox: BBox { x1: 0.0, y1: f64::from(page), x2: 10.0, y2: f64::from(page) + 1.0 },
                page_width: None,
                page_height: None,
            },
            score,
        };
        let items = vec![make(1, 0.9), make(2, 0.01)];
        let filtered = filter_and_order_for_display(items, &settings);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].page, 1);
    }

    #[test]
    fn similarity_identical_strings_is_one() {
        assert!((similarity("signed", "signed") - 1.0).abs() < 1e-9);
    }
}

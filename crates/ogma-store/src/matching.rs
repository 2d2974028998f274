//! Canonicalization and fuzzy matching.
//!
//! Concept names are canonicalized to Title Case (preserving acronyms and
//! internal-capital forms), and chunk titles are resolved with a bigram
//! Dice coefficient so agent-reported titles survive punctuation and case
//! drift. Question labels use a stricter exact/prefix/substring ladder.

use ogma_types::{Chunk, Question};

/// Minimum Dice similarity for a fuzzy chunk-title match to be accepted.
pub const CHUNK_MATCH_THRESHOLD: f64 = 0.6;

// ─────────────────────────────────────────────────────────────────────────────
// Canonicalization
// ─────────────────────────────────────────────────────────────────────────────

/// Canonicalize a raw concept name to Title Case.
///
/// Words that are all-caps ("ODE") or carry a capital after the first
/// character ("pH", "LaTeX") are preserved as written; everything else is
/// first-letter-uppercased. Whitespace is collapsed to single spaces.
pub fn canonicalize_concept_name(raw: &str) -> String {
    raw.split_whitespace()
        .map(title_case_word)
        .collect::<Vec<_>>()
        .join(" ")
}

fn title_case_word(word: &str) -> String {
    let has_internal_capital = word.chars().skip(1).any(|c| c.is_uppercase());
    let is_all_caps = word.chars().filter(|c| c.is_alphabetic()).count() > 0
        && word.chars().filter(|c| c.is_alphabetic()).all(|c| c.is_uppercase());

    if has_internal_capital || is_all_caps {
        return word.to_string();
    }

    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
        None => String::new(),
    }
}

/// Lowercase, strip punctuation, and collapse whitespace for comparison.
pub fn normalize_for_match(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_space = true;
    for c in s.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
            last_was_space = false;
        } else if !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }
    if out.ends_with(' ') {
        out.pop();
    }
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Dice coefficient
// ─────────────────────────────────────────────────────────────────────────────

/// Bigram Dice coefficient between two strings after normalization.
///
/// Computed as `2·|A∩B| / (|A| + |B|)` over character-bigram multisets.
/// Returns 1.0 for identical normalized strings and 0.0 when either side
/// is too short to form a bigram (unless both normalize equal).
pub fn dice_coefficient(a: &str, b: &str) -> f64 {
    let a = normalize_for_match(a);
    let b = normalize_for_match(b);

    if a == b {
        return 1.0;
    }

    let a_bigrams = bigrams(&a);
    let b_bigrams = bigrams(&b);
    if a_bigrams.is_empty() || b_bigrams.is_empty() {
        return 0.0;
    }

    let mut counts = std::collections::HashMap::new();
    for bg in &a_bigrams {
        *counts.entry(*bg).or_insert(0usize) += 1;
    }

    let mut overlap = 0usize;
    for bg in &b_bigrams {
        if let Some(n) = counts.get_mut(bg) {
            if *n > 0 {
                *n -= 1;
                overlap += 1;
            }
        }
    }

    (2.0 * overlap as f64) / (a_bigrams.len() + b_bigrams.len()) as f64
}

fn bigrams(s: &str) -> Vec<(char, char)> {
    let chars: Vec<char> = s.chars().collect();
    chars.windows(2).map(|w| (w[0], w[1])).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolution ladders
// ─────────────────────────────────────────────────────────────────────────────

/// Resolve an agent-reported chunk title against a resource's chunks.
///
/// Exact case-insensitive title match wins; otherwise the best Dice match
/// at or above [`CHUNK_MATCH_THRESHOLD`] is used. `None` means the caller
/// should attach the relationship to the resource itself.
pub fn resolve_chunk<'a>(title: &str, chunks: &'a [Chunk]) -> Option<&'a Chunk> {
    let wanted = title.trim().to_lowercase();
    if let Some(exact) = chunks.iter().find(|c| c.title.trim().to_lowercase() == wanted) {
        return Some(exact);
    }

    let mut best: Option<(&Chunk, f64)> = None;
    for chunk in chunks {
        let score = dice_coefficient(title, &chunk.title);
        if score >= CHUNK_MATCH_THRESHOLD {
            match best {
                Some((_, prev)) if prev >= score => {}
                _ => best = Some((chunk, score)),
            }
        }
    }
    best.map(|(c, _)| c)
}

/// Resolve an agent-reported question label against a resource's questions.
///
/// Ladder: exact label match, then label-prefix match, then
/// label-or-mark-scheme substring match. `None` means the caller should
/// attach the relationship to the resource itself.
pub fn resolve_question<'a>(label: &str, questions: &'a [Question]) -> Option<&'a Question> {
    let wanted = label.trim().to_lowercase();
    if wanted.is_empty() {
        return None;
    }

    if let Some(exact) = questions.iter().find(|q| q.label.trim().to_lowercase() == wanted) {
        return Some(exact);
    }

    if let Some(prefix) = questions
        .iter()
        .find(|q| q.label.trim().to_lowercase().starts_with(&wanted))
    {
        return Some(prefix);
    }

    questions.iter().find(|q| {
        q.label.to_lowercase().contains(&wanted)
            || q.mark_scheme
                .as_deref()
                .is_some_and(|ms| ms.to_lowercase().contains(&wanted))
    })
}

//! Title-similarity scoring for duplicate detection.
//!
//! Advisory only: scores rank candidates, nothing here mutates state.

use std::collections::HashSet;

/// Weight of the trigram component in [`duplicate_score`].
const TITLE_WEIGHT: f64 = 0.7;
/// Weight of the label-overlap component.
const LABEL_WEIGHT: f64 = 0.3;

/// Lowercases and collapses non-alphanumeric runs to single spaces.
pub fn normalize_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut last_space = true;
    for ch in title.chars() {
        if ch.is_alphanumeric() {
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    if out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Character trigrams of a normalized string, padded so short titles still
/// produce a usable set.
pub fn trigrams(normalized: &str) -> HashSet<String> {
    let padded: Vec<char> = format!("  {normalized} ").chars().collect();
    padded
        .windows(3)
        .map(|w| w.iter().collect::<String>())
        .collect()
}

/// Jaccard similarity of two sets; 1.0 when both are empty.
fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// Similarity score in [0, 1]: trigram Jaccard of normalized titles plus
/// label-set overlap, weighted 0.7 / 0.3.
pub fn duplicate_score(
    title_a: &str,
    labels_a: &[String],
    title_b: &str,
    labels_b: &[String],
) -> f64 {
    let tri_a = trigrams(&normalize_title(title_a));
    let tri_b = trigrams(&normalize_title(title_b));
    let title_score = jaccard(&tri_a, &tri_b);

    let label_score = if labels_a.is_empty() && labels_b.is_empty() {
        // No label signal either way; fall back on the title alone.
        title_score
    } else {
        let set_a: HashSet<String> = labels_a.iter().cloned().collect();
        let set_b: HashSet<String> = labels_b.iter().cloned().collect();
        jaccard(&set_a, &set_b)
    };

    TITLE_WEIGHT * title_score + LABEL_WEIGHT * label_score
}

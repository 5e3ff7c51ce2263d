//! Word-set text similarity shared by community, bot, and coordination scoring.

use std::collections::HashSet;
use std::hash::Hash;

/// Lowercased alphanumeric words of `text`.
pub fn word_set(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '#' && c != '@')
        .map(|w| w.trim_matches(|c| c == '#' || c == '@').to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

/// |a ∩ b| / |a ∪ b|. Two empty sets score 0.
pub fn jaccard<T: Eq + Hash>(a: &HashSet<T>, b: &HashSet<T>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}

/// Mean Jaccard similarity over every unordered pair of `sets`.
/// Fewer than two sets score 0.
pub fn mean_pairwise_jaccard<T: Eq + Hash>(sets: &[HashSet<T>]) -> f64 {
    if sets.len() < 2 {
        return 0.0;
    }
    let mut total = 0.0;
    let mut pairs = 0usize;
    for i in 0..sets.len() {
        for j in (i + 1)..sets.len() {
            total += jaccard(&sets[i], &sets[j]);
            pairs += 1;
        }
    }
    total / pairs as f64
}

/// Mean Jaccard similarity over every cross pair `(a[i], b[j])`.
pub fn mean_cross_jaccard<T: Eq + Hash>(a: &[HashSet<T>], b: &[HashSet<T>]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let total: f64 = a
        .iter()
        .flat_map(|x| b.iter().map(move |y| jaccard(x, y)))
        .sum();
    total / (a.len() * b.len()) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_set_ignores_case_and_punctuation() {
        let words = word_set("Breaking: the DAM has failed!! #Flood @city");
        assert!(words.contains("breaking"));
        assert!(words.contains("dam"));
        assert!(words.contains("flood"));
        assert!(words.contains("city"));
        assert!(!words.contains(""));
    }

    #[test]
    fn identical_text_is_fully_similar() {
        let a = word_set("vote early vote often");
        let b = word_set("Vote often, vote early");
        assert!((jaccard(&a, &b) - 1.0).abs() < 1e-10);
    }

    #[test]
    fn disjoint_text_scores_zero() {
        let a = word_set("red green");
        let b = word_set("blue yellow");
        assert_eq!(jaccard(&a, &b), 0.0);
    }

    #[test]
    fn empty_sets_score_zero() {
        let empty: HashSet<String> = HashSet::new();
        assert_eq!(jaccard(&empty, &empty), 0.0);
    }

    #[test]
    fn partial_overlap() {
        let a = word_set("a b c");
        let b = word_set("b c d");
        assert!((jaccard(&a, &b) - 0.5).abs() < 1e-10);
    }

    #[test]
    fn single_set_has_no_pairs() {
        assert_eq!(mean_pairwise_jaccard(&[word_set("only one")]), 0.0);
    }

    #[test]
    fn cross_similarity_of_repeated_text() {
        let a = vec![word_set("same words"), word_set("same words")];
        let b = vec![word_set("same words")];
        assert!((mean_cross_jaccard(&a, &b) - 1.0).abs() < 1e-10);
    }
}

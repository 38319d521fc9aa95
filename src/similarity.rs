//! Word, pronunciation and time-span similarity measures.
//!
//! All similarities are in `(0, 1]`: `1 - distance / (len_a + len_b)`, with
//! the configured `min_similarity` standing in for zero so that the value
//! can still weight a posterior product.

use crate::prob::LnProb;
use crate::settings::settings;

/// Levenshtein distance with unit insertion, deletion and substitution costs.
pub fn edit_distance<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, x) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, y) in b.iter().enumerate() {
            let sub = prev[j] + usize::from(x != y);
            curr[j + 1] = sub.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

fn normalized<T: PartialEq>(a: &[T], b: &[T]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let sim = 1.0 - edit_distance(a, b) as f64 / total as f64;
    if sim <= 0.0 {
        settings().similarity.min_similarity
    } else {
        sim
    }
}

/// Similarity of two space-separated phone strings.
pub fn phonetic_similarity(pron1: &str, pron2: &str) -> f64 {
    let a: Vec<&str> = pron1.split_whitespace().collect();
    let b: Vec<&str> = pron2.split_whitespace().collect();
    normalized(&a, &b)
}

/// Similarity of two words' spellings.
pub fn word_similarity(word1: &str, word2: &str) -> f64 {
    let a: Vec<char> = word1.chars().collect();
    let b: Vec<char> = word2.chars().collect();
    normalized(&a, &b)
}

/// Signed overlap coefficient of `[p1, p2]` and `[q1, q2]`.
///
/// `2 * overlap / (len_p + len_q)`: 1 for identical spans, 0 for spans that
/// only touch, negative (scaled by the gap) for disjoint spans. Two
/// zero-length spans give 1 at the same point and -1 otherwise.
pub fn time_overlap_ph(p1: f64, p2: f64, q1: f64, q2: f64) -> f64 {
    let overlap = p2.min(q2) - p1.max(q1);
    let total = (p2 - p1) + (q2 - q1);
    if total > 0.0 {
        2.0 * overlap / total
    } else if overlap < 0.0 {
        -1.0
    } else {
        1.0
    }
}

/// Overlap coefficient clipped at zero for disjoint spans.
pub fn time_overlap(p1: f64, p2: f64, q1: f64, q2: f64) -> f64 {
    time_overlap_ph(p1, p2, q1, q2).max(0.0)
}

/// `exp(posterior - total)`, kept off exactly 1 when the two coincide.
pub fn relative_prob(posterior: LnProb, total: LnProb) -> f64 {
    let mut diff = posterior - total;
    if diff.abs() < (-20f64).exp() {
        diff = settings().similarity.posterior_floor;
    }
    diff.exp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance(b"kitten", b"sitting"), 3);
        assert_eq!(edit_distance(b"", b"abc"), 3);
        assert_eq!(edit_distance(b"abc", b""), 3);
        assert_eq!(edit_distance(b"same", b"same"), 0);
        assert_eq!(edit_distance(&["hh", "ah"], &["hh", "ay"]), 1);
    }

    #[test]
    fn test_word_similarity() {
        assert_eq!(word_similarity("HELLO", "HELLO"), 1.0);
        // HELLO -> HI: keep H, substitute E->I, delete LLO
        assert!((word_similarity("HELLO", "HI") - (1.0 - 4.0 / 7.0)).abs() < 1e-12);
        assert_eq!(word_similarity("", ""), 1.0);
    }

    #[test]
    fn test_disjoint_words_get_floor() {
        // Equal-length words with nothing in common still share the length.
        let sim = word_similarity("AB", "CD");
        assert!((sim - 0.5).abs() < 1e-12);
        let sim = word_similarity("A", "");
        assert_eq!(sim, settings().similarity.min_similarity);
    }

    #[test]
    fn test_phonetic_similarity() {
        assert_eq!(phonetic_similarity("w er l d", "w er l d"), 1.0);
        assert!((phonetic_similarity("w er l d", "w er d") - (1.0 - 1.0 / 7.0)).abs() < 1e-12);
        assert!((phonetic_similarity("hh ah l ow", "hh ay") - (1.0 - 3.0 / 6.0)).abs() < 1e-12);
    }

    #[test]
    fn test_time_overlap_orderings() {
        // identical
        assert_eq!(time_overlap(0.0, 1.0, 0.0, 1.0), 1.0);
        // q inside p
        assert!((time_overlap(0.0, 1.0, 0.25, 0.75) - 2.0 * 0.5 / 1.5).abs() < 1e-12);
        // p inside q
        assert!((time_overlap(0.25, 0.75, 0.0, 1.0) - 2.0 * 0.5 / 1.5).abs() < 1e-12);
        // partial, p first
        assert!((time_overlap(0.0, 1.0, 0.5, 1.5) - 0.5).abs() < 1e-12);
        // partial, q first
        assert!((time_overlap(0.5, 1.5, 0.0, 1.0) - 0.5).abs() < 1e-12);
        // touching and disjoint
        assert_eq!(time_overlap(0.0, 1.0, 1.0, 2.0), 0.0);
        assert_eq!(time_overlap(0.0, 1.0, 3.0, 4.0), 0.0);
    }

    #[test]
    fn test_time_overlap_ph_is_signed() {
        assert!((time_overlap_ph(0.0, 1.0, 3.0, 4.0) + 2.0).abs() < 1e-12);
        assert!((time_overlap_ph(3.0, 4.0, 0.0, 1.0) + 2.0).abs() < 1e-12);
        assert_eq!(time_overlap_ph(0.0, 1.0, 1.0, 2.0), 0.0);
        assert_eq!(time_overlap_ph(2.0, 2.0, 2.0, 2.0), 1.0);
        assert_eq!(time_overlap_ph(2.0, 2.0, 3.0, 3.0), -1.0);
    }

    #[test]
    fn test_relative_prob() {
        assert!((relative_prob(-3.0, -2.0) - (-1f64).exp()).abs() < 1e-12);
        let p = relative_prob(-2.0, -2.0);
        assert!(p < 1.0);
        assert!((p - settings().similarity.posterior_floor.exp()).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn word_similarity_is_symmetric(a in "[A-Z]{0,8}", b in "[A-Z]{0,8}") {
            prop_assert_eq!(word_similarity(&a, &b), word_similarity(&b, &a));
        }

        #[test]
        fn word_similarity_is_in_unit_interval(a in "[A-Z]{0,8}", b in "[A-Z]{0,8}") {
            let s = word_similarity(&a, &b);
            prop_assert!(s > 0.0 && s <= 1.0);
            prop_assert_eq!(s == 1.0, a == b);
        }

        #[test]
        fn phonetic_similarity_is_symmetric(
            a in prop::collection::vec("[a-z]{1,2}", 0..6),
            b in prop::collection::vec("[a-z]{1,2}", 0..6),
        ) {
            let (a, b) = (a.join(" "), b.join(" "));
            prop_assert_eq!(phonetic_similarity(&a, &b), phonetic_similarity(&b, &a));
        }

        #[test]
        fn time_overlap_is_symmetric(
            p1 in 0.0f64..5.0, lp in 0.0f64..2.0,
            q1 in 0.0f64..5.0, lq in 0.0f64..2.0,
        ) {
            let a = time_overlap_ph(p1, p1 + lp, q1, q1 + lq);
            let b = time_overlap_ph(q1, q1 + lq, p1, p1 + lp);
            prop_assert!((a - b).abs() < 1e-12);
            prop_assert!(a <= 1.0 + 1e-12);
        }
    }
}

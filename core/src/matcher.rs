//! Word and phrase scoring against weighted term maps.
//!
//! Word terms are matched by a sorted sweep: dictionary keys are visited in
//! case-insensitive alphabetical order while a single cursor moves forward
//! through the sorted tokens. Each key's run of matches is consumed once, so
//! total work stays proportional to a few passes over the tokens instead of
//! terms × tokens.
//!
//! Scores saturate at the `i64` bounds.

use crate::dictionary::{Term, TermMap};
use crate::tokenizer::TokenSequence;
use regex::Regex;
use serde::Serialize;

/// How many times one term matched and what that was worth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TermHit {
    pub key: String,
    pub count: usize,
    pub weight: i64,
}

impl TermHit {
    pub fn worth(&self) -> i64 {
        (self.count as i64).saturating_mul(self.weight)
    }
}

/// Score a sorted token sequence against word terms.
pub fn word_score(tokens: &TokenSequence, terms: &TermMap) -> i64 {
    sweep(tokens.as_slice(), terms, |_, _| {})
}

/// The matches [`word_score`] counts, in the order the sweep visits them.
pub fn word_matches(tokens: &TokenSequence, terms: &TermMap) -> Vec<TermHit> {
    let mut hits = Vec::new();
    sweep(tokens.as_slice(), terms, |term, count| {
        hits.push(TermHit { key: term.key.clone(), count, weight: term.weight });
    });
    hits
}

/// Score normalized text against phrase terms, counting non-overlapping matches.
pub fn phrase_score(text: &str, terms: &TermMap) -> i64 {
    terms
        .values()
        .map(|term| {
            let count = term.pattern.find_iter(text).count();
            if count > 0 {
                tracing::debug!(key = %term.key, count, weight = term.weight, "phrase match");
            }
            (count as i64).saturating_mul(term.weight)
        })
        .fold(0i64, i64::saturating_add)
}

/// The non-zero phrase matches [`phrase_score`] counts.
pub fn phrase_matches(text: &str, terms: &TermMap) -> Vec<TermHit> {
    terms
        .values()
        .filter_map(|term| {
            let count = term.pattern.find_iter(text).count();
            (count > 0).then(|| TermHit { key: term.key.clone(), count, weight: term.weight })
        })
        .collect()
}

/// Dictionary terms ordered by lower-cased key, ties broken by the raw key.
pub fn alphabetized(terms: &TermMap) -> Vec<&Term> {
    let mut ordered: Vec<&Term> = terms.values().collect();
    ordered.sort_by_cached_key(|term| (term.key.to_lowercase(), term.key.clone()));
    ordered
}

fn sweep(tokens: &[String], terms: &TermMap, mut on_hit: impl FnMut(&Term, usize)) -> i64 {
    let mut score = 0i64;
    let mut cursor = 0usize;
    for term in alphabetized(terms) {
        if cursor == tokens.len() {
            break;
        }
        let Some(first) = find_first_match(&term.pattern, &tokens[cursor..]) else {
            continue;
        };
        let start = cursor + first;
        let count = count_matches(&term.pattern, &tokens[start..]);
        let worth = (count as i64).saturating_mul(term.weight);
        score = score.saturating_add(worth);
        tracing::debug!(key = %term.key, count, weight = term.weight, worth, score, "word match");
        on_hit(term, count);
        cursor = start + count;
    }
    score
}

/// Offset of the first token the pattern matches.
fn find_first_match(pattern: &Regex, tokens: &[String]) -> Option<usize> {
    tokens.iter().position(|token| pattern.is_match(token))
}

/// Length of the run of matching tokens at the head of `tokens`.
fn count_matches(pattern: &Regex, tokens: &[String]) -> usize {
    tokens.iter().take_while(|token| pattern.is_match(token)).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(entries: &[(&str, &str, i64)]) -> TermMap {
        entries
            .iter()
            .map(|(key, pattern, weight)| (key.to_string(), Term::new(*key, pattern, *weight).unwrap()))
            .collect()
    }

    #[test]
    fn single_term_exact_count() {
        let tokens = TokenSequence::from_text("foo foo bar foo");
        assert_eq!(word_score(&tokens, &terms(&[("foo", "foo", 5)])), 15);
    }

    #[test]
    fn empty_tokens_score_zero() {
        let tokens = TokenSequence::from_text("   ");
        assert!(tokens.is_empty());
        assert_eq!(word_score(&tokens, &terms(&[("foo", "foo", 5)])), 0);
    }

    #[test]
    fn unmatched_term_leaves_cursor_alone() {
        let tokens = TokenSequence::from_text("beta gamma gamma");
        let map = terms(&[("alpha", "^alpha$", 100), ("beta", "^beta$", 1), ("gamma", "^gamma$", 10)]);
        assert_eq!(word_score(&tokens, &map), 21);
    }

    #[test]
    fn matching_is_case_insensitive_but_sort_is_not() {
        // Sorted tokens: ["Health", "health", "zeal"]
        let tokens = TokenSequence::from_text("health zeal Health");
        assert_eq!(word_score(&tokens, &terms(&[("health", "^health$", 2)])), 4);
    }

    #[test]
    fn keys_visit_in_case_insensitive_order() {
        let map = terms(&[("beta", "b", 1), ("Alpha", "a", 1), ("gamma", "g", 1)]);
        let keys: Vec<&str> = alphabetized(&map).iter().map(|t| t.key.as_str()).collect();
        assert_eq!(keys, vec!["Alpha", "beta", "gamma"]);
    }

    #[test]
    fn sweep_stops_once_tokens_are_consumed() {
        let tokens = TokenSequence::from_text("apple apple");
        let map = terms(&[("apple", "apple", 1), ("zebra", "apple", 50)]);
        let hits = word_matches(&tokens, &map);
        assert_eq!(hits, vec![TermHit { key: "apple".into(), count: 2, weight: 1 }]);
        assert_eq!(word_score(&tokens, &map), 2);
    }

    #[test]
    fn phrases_count_non_overlapping_matches() {
        let map = terms(&[("aa", "aa", 3)]);
        assert_eq!(phrase_score("aaaaa", &map), 6);
    }

    #[test]
    fn phrase_with_no_match_contributes_zero() {
        let map = terms(&[("mental health", r"mental\s+health", 10)]);
        assert_eq!(phrase_score("physical wellness", &map), 0);
        assert!(phrase_matches("physical wellness", &map).is_empty());
    }

    #[test]
    fn phrase_and_word_terms_count_independently() {
        let text = "we do enact this";
        let phrase = terms(&[("do enact", r"do\s+enact", 4)]);
        let word = terms(&[("enact", "^enact$", 3)]);
        let tokens = TokenSequence::from_text(text);
        assert_eq!(phrase_score(text, &phrase) + word_score(&tokens, &word), 7);
    }

    #[test]
    fn huge_word_weight_saturates() {
        let tokens = TokenSequence::from_text("fee fee levy");
        let map = terms(&[("fee", "^fee$", 5_000_000_000_000_000_000), ("levy", "^levy$", 1)]);
        assert_eq!(word_score(&tokens, &map), i64::MAX);
        assert_eq!(word_matches(&tokens, &map)[0].worth(), i64::MAX);
        let negative = terms(&[("fee", "^fee$", -5_000_000_000_000_000_000)]);
        assert_eq!(word_score(&tokens, &negative), i64::MIN);
    }

    #[test]
    fn huge_phrase_weight_saturates() {
        let map = terms(&[("a fee", r"a\s+fee", 5_000_000_000_000_000_000), ("fee", "fee", 5_000_000_000_000_000_000)]);
        assert_eq!(phrase_score("a fee, a fee", &map), i64::MAX);
    }
}

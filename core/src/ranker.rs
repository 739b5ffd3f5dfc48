//! Ranking orchestration: text → scores → store.

use crate::dictionary::RankingTerms;
use crate::error::{RankError, Result};
use crate::matcher::{phrase_matches, phrase_score, word_matches, word_score, TermHit};
use crate::measure::MeasureId;
use crate::normalize::normalize;
use crate::store::{BillRow, BillStore, RankingResult};
use crate::tokenizer::TokenSequence;
use rayon::prelude::*;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};

/// Scores of one text, split by matcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BillScore {
    pub positive_words: i64,
    pub positive_phrases: i64,
    pub negative_words: i64,
    pub negative_phrases: i64,
}

impl BillScore {
    pub fn positive(&self) -> i64 {
        self.positive_words.saturating_add(self.positive_phrases)
    }

    pub fn negative(&self) -> i64 {
        self.negative_words.saturating_add(self.negative_phrases)
    }
}

/// Score raw bill text. Pure: the same text and terms always give the same score.
pub fn score_text(raw: &str, terms: &RankingTerms) -> BillScore {
    let text = normalize(raw);
    let tokens = TokenSequence::from_text(&text);
    BillScore {
        positive_words: word_score(&tokens, &terms.positive.words),
        positive_phrases: phrase_score(&text, &terms.positive.phrases),
        negative_words: word_score(&tokens, &terms.negative.words),
        negative_phrases: phrase_score(&text, &terms.negative.phrases),
    }
}

/// Per-term hits behind a [`BillScore`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct Explanation {
    pub tokens: usize,
    pub positive: Vec<TermHit>,
    pub negative: Vec<TermHit>,
    pub score: BillScore,
}

pub fn explain_text(raw: &str, terms: &RankingTerms) -> Explanation {
    let text = normalize(raw);
    let tokens = TokenSequence::from_text(&text);
    let worth = |hits: &[TermHit]| hits.iter().map(TermHit::worth).fold(0i64, i64::saturating_add);

    let positive_words = word_matches(&tokens, &terms.positive.words);
    let positive_phrases = phrase_matches(&text, &terms.positive.phrases);
    let negative_words = word_matches(&tokens, &terms.negative.words);
    let negative_phrases = phrase_matches(&text, &terms.negative.phrases);
    let score = BillScore {
        positive_words: worth(&positive_words),
        positive_phrases: worth(&positive_phrases),
        negative_words: worth(&negative_words),
        negative_phrases: worth(&negative_phrases),
    };
    Explanation {
        tokens: tokens.len(),
        positive: positive_words.into_iter().chain(positive_phrases).collect(),
        negative: negative_words.into_iter().chain(negative_phrases).collect(),
        score,
    }
}

/// Read, score and persist one bill. A bill whose text cannot be read is an
/// error, never a zero score.
pub fn rank_bill(store: &dyn BillStore, terms: &RankingTerms, bill: &BillRow) -> Result<RankingResult> {
    let raw = store.read_bill_text(&bill.lob_path)?;
    let score = score_text(&String::from_utf8_lossy(&raw), terms);
    let result = RankingResult {
        measure: bill.measure.clone(),
        positive_score: score.positive(),
        negative_score: score.negative(),
    };
    store.write_score(&result)?;
    tracing::info!(measure = %bill.measure, positive = result.positive_score, negative = result.negative_score, "ranked bill");
    Ok(result)
}

/// What happened to one bill in a bulk run.
#[derive(Debug)]
pub enum BillOutcome {
    Scored(RankingResult),
    Skipped { measure: MeasureId, reason: RankError },
}

#[derive(Debug, Default)]
pub struct RankSummary {
    pub outcomes: Vec<BillOutcome>,
    /// True when the run stopped before visiting every selected bill.
    pub cancelled: bool,
}

impl RankSummary {
    pub fn scored(&self) -> usize {
        self.outcomes.iter().filter(|o| matches!(o, BillOutcome::Scored(_))).count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.scored()
    }

    pub fn results(&self) -> impl Iterator<Item = &RankingResult> {
        self.outcomes.iter().filter_map(|o| match o {
            BillOutcome::Scored(result) => Some(result),
            BillOutcome::Skipped { .. } => None,
        })
    }
}

/// Bulk ranker. Bills are independent; they are scored in batches on a bounded
/// thread pool, one bill per task. The dictionaries are shared read-only.
pub struct Ranker<'a> {
    terms: &'a RankingTerms,
    workers: usize,
    batch_size: usize,
    limit: Option<usize>,
}

impl<'a> Ranker<'a> {
    pub fn new(terms: &'a RankingTerms) -> Self {
        Self { terms, workers: 1, batch_size: 64, limit: None }
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Rank at most `limit` bills.
    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Rank every bill in `bills`. `cancel` is checked between batches.
    pub fn rank_all(&self, store: &dyn BillStore, bills: &[BillRow], cancel: &AtomicBool) -> Result<RankSummary> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("billrank-{i}"))
            .build()?;

        let selected = match self.limit {
            Some(limit) => &bills[..limit.min(bills.len())],
            None => bills,
        };
        tracing::info!(bills = selected.len(), workers = self.workers, batch_size = self.batch_size, "starting ranking run");

        let mut summary = RankSummary::default();
        for batch in selected.chunks(self.batch_size) {
            if cancel.load(Ordering::Relaxed) {
                tracing::warn!(remaining = selected.len() - summary.outcomes.len(), "ranking run cancelled");
                summary.cancelled = true;
                break;
            }
            let outcomes: Vec<BillOutcome> = pool.install(|| batch.par_iter().map(|bill| self.rank_one(store, bill)).collect());
            summary.outcomes.extend(outcomes);
        }

        tracing::info!(scored = summary.scored(), skipped = summary.skipped(), cancelled = summary.cancelled, "ranking run complete");
        Ok(summary)
    }

    fn rank_one(&self, store: &dyn BillStore, bill: &BillRow) -> BillOutcome {
        match rank_bill(store, self.terms, bill) {
            Ok(result) => BillOutcome::Scored(result),
            Err(reason) => {
                tracing::warn!(measure = %bill.measure, lob = %bill.lob_path, error = %reason, "skipping bill");
                BillOutcome::Skipped { measure: bill.measure.clone(), reason }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::{inline_origin, TermDictionary};

    fn terms() -> RankingTerms {
        let positive = TermDictionary::parse(
            "<Phrase><Key>mental health</Key><Regex>mental\\s+health</Regex><Score>10</Score></Phrase>",
            &inline_origin(),
        )
        .unwrap();
        let negative =
            TermDictionary::parse("<Pair><Key>repeal</Key><Regex>repeal</Regex><Score>-8</Score></Pair>", &inline_origin()).unwrap();
        RankingTerms { positive, negative }
    }

    #[test]
    fn end_to_end_text_score() {
        let text = "Digest... the people of the state do enact as follows: This act addresses mental health services. \
                    It does not repeal any statute.";
        let score = score_text(text, &terms());
        assert_eq!(score.positive(), 10);
        assert_eq!(score.negative(), -8);
        assert_eq!(score.positive_phrases, 10);
        assert_eq!(score.negative_words, -8);
    }

    #[test]
    fn text_before_clause_is_not_scored() {
        let text = "repeal repeal mental health. The people of the State of California do enact as follows: nothing";
        assert_eq!(score_text(text, &terms()), BillScore::default());
        assert_eq!(score_text("repeal", &terms()).negative(), -8);
    }

    #[test]
    fn empty_text_scores_zero() {
        assert_eq!(score_text("", &terms()), BillScore::default());
        assert_eq!(score_text(" \r\n\t ", &terms()), BillScore::default());
    }

    #[test]
    fn explanation_matches_score() {
        let exp = explain_text("repeal and repeal; mental health", &terms());
        assert_eq!(exp.score.negative(), -16);
        assert_eq!(exp.negative, vec![TermHit { key: "repeal".into(), count: 2, weight: -8 }]);
        assert_eq!(exp.positive, vec![TermHit { key: "mental health".into(), count: 1, weight: 10 }]);
        assert_eq!(exp.tokens, 5);
    }
}

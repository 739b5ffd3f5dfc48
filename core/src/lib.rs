//! Bill ranking engine: scores legislative bill text against weighted
//! positive and negative term dictionaries.

pub mod dictionary;
pub mod error;
pub mod matcher;
pub mod measure;
pub mod normalize;
pub mod persist;
pub mod ranker;
pub mod settings;
pub mod store;
pub mod tokenizer;

pub use dictionary::{RankingTerms, Term, TermDictionary, TermMap};
pub use error::{RankError, Result};
pub use measure::MeasureId;
pub use ranker::{rank_bill, score_text, BillOutcome, BillScore, RankSummary, Ranker};
pub use store::{BillFilter, BillRow, BillStore, MemoryBillStore, RankingResult, SledBillStore};

//! Weighted term dictionaries.
//!
//! A dictionary document is XML-like. Word terms sit in `<Pair>` blocks and
//! phrase terms in `<Phrase>` blocks, each holding a `<Key>`, a `<Regex>` and a
//! `<Score>`:
//!
//! ```text
//! <Terms>
//!   <Pair><Key>repeal</Key><Regex>repeal</Regex><Score>-8</Score></Pair>
//!   <Phrase><Key>mental health</Key><Regex>mental\s+health</Regex><Score>10</Score></Phrase>
//! </Terms>
//! ```

use crate::error::{RankError, Result};
use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

lazy_static! {
    static ref PAIR_BLOCK: Regex = Regex::new(r"(?s)<Pair>(.*?)</Pair>").expect("valid regex");
    static ref PHRASE_BLOCK: Regex = Regex::new(r"(?s)<Phrase>(.*?)</Phrase>").expect("valid regex");
    static ref KEY_FIELD: Regex = Regex::new(r"(?s)<Key>(.*?)</Key>").expect("valid regex");
    static ref REGEX_FIELD: Regex = Regex::new(r"(?s)<Regex>(.*?)</Regex>").expect("valid regex");
    static ref SCORE_FIELD: Regex = Regex::new(r"(?s)<Score>(.*?)</Score>").expect("valid regex");
}

/// One dictionary entry: a case-insensitive pattern and its per-match weight.
#[derive(Debug, Clone)]
pub struct Term {
    pub key: String,
    pub pattern: Regex,
    pub weight: i64,
}

impl Term {
    pub fn new(key: impl Into<String>, pattern: &str, weight: i64) -> std::result::Result<Self, regex::Error> {
        let pattern = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        Ok(Self { key: key.into(), pattern, weight })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

/// Terms keyed by their canonical display name.
pub type TermMap = BTreeMap<String, Term>;

/// The word and phrase terms of one dictionary document.
#[derive(Debug, Clone, Default)]
pub struct TermDictionary {
    pub words: TermMap,
    pub phrases: TermMap,
}

impl TermDictionary {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|e| RankError::Configuration {
            path: path.to_path_buf(),
            reason: format!("cannot read dictionary: {e}"),
        })?;
        let dict = Self::parse(&source, path)?;
        tracing::info!(path = %path.display(), words = dict.words.len(), phrases = dict.phrases.len(), "loaded term dictionary");
        Ok(dict)
    }

    /// Parse a dictionary document. `origin` only labels diagnostics.
    pub fn parse(source: &str, origin: &Path) -> Result<Self> {
        let words = parse_blocks(source, &PAIR_BLOCK, "Pair", origin)?;
        let phrases = parse_blocks(source, &PHRASE_BLOCK, "Phrase", origin)?;
        Ok(Self { words, phrases })
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty() && self.phrases.is_empty()
    }
}

/// Positive and negative dictionaries for one ranking run.
#[derive(Debug, Clone, Default)]
pub struct RankingTerms {
    pub positive: TermDictionary,
    pub negative: TermDictionary,
}

impl RankingTerms {
    pub fn load(positive: impl AsRef<Path>, negative: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            positive: TermDictionary::load(positive)?,
            negative: TermDictionary::load(negative)?,
        })
    }
}

fn parse_blocks(source: &str, block: &Regex, kind: &str, origin: &Path) -> Result<TermMap> {
    let mut terms = TermMap::new();
    for (index, caps) in block.captures_iter(source).enumerate() {
        let body = &caps[1];
        let (Some(key), Some(pattern), Some(score)) = (field(&KEY_FIELD, body), field(&REGEX_FIELD, body), field(&SCORE_FIELD, body)) else {
            tracing::warn!(path = %origin.display(), kind, index, "skipping incomplete dictionary block");
            continue;
        };
        let weight: i64 = score.parse().map_err(|_| RankError::Configuration {
            path: origin.to_path_buf(),
            reason: format!("{kind} {key:?} has a non-integer score {score:?}"),
        })?;
        let term = Term::new(key, pattern, weight).map_err(|source| RankError::MalformedTermPattern {
            path: origin.to_path_buf(),
            key: key.to_string(),
            source,
        })?;
        if terms.insert(key.to_string(), term).is_some() {
            tracing::warn!(path = %origin.display(), kind, key, "duplicate dictionary key, later entry wins");
        }
    }
    Ok(terms)
}

fn field<'a>(re: &Regex, body: &'a str) -> Option<&'a str> {
    re.captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
}

/// Path label used when a dictionary is parsed from memory.
pub fn inline_origin() -> PathBuf {
    PathBuf::from("<inline>")
}

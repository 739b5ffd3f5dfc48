use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref SPLIT_ON: Regex = Regex::new(r"[^\w]+").expect("valid regex");
}

/// Split normalized text into word tokens on runs of non-word characters.
/// Order and duplicates are preserved; match counts depend on repeats.
pub fn tokenize(text: &str) -> Vec<String> {
    SPLIT_ON
        .split(text)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Tokens of one bill, sorted in plain code-point order.
///
/// Case is left alone here; the word matcher's patterns are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenSequence {
    tokens: Vec<String>,
}

impl TokenSequence {
    pub fn new(mut tokens: Vec<String>) -> Self {
        tokens.sort_unstable();
        Self { tokens }
    }

    pub fn from_text(text: &str) -> Self {
        Self::new(tokenize(text))
    }

    pub fn as_slice(&self) -> &[String] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

//! Tokenization of witness text into ordered token sequences.
//!
//! A tokenizer pairs a token-matching regular expression with a joiner
//! string used to reassemble tokens into text. Logographic scripts use
//! single-character tokens and an empty joiner; alphabetic scripts use
//! word tokens joined by a space. Tokenization is deterministic and
//! side-effect free.

use crate::error::Result;
use regex::Regex;

/// Pattern for CBETA-style texts: a bracketed run (a textual workaround,
/// treated as a single token) or a single word character.
pub const CBETA_PATTERN: &str = r"\[[^\]]*\]|\w";
pub const CBETA_JOINER: &str = "";

/// Pattern for Pagel-style transliterated texts: whitespace-separated words.
pub const PAGEL_PATTERN: &str = r"\S+";
pub const PAGEL_JOINER: &str = " ";

/// Built-in tokenizer profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenizerProfile {
    /// Single-character tokens, no joiner (logographic scripts).
    #[default]
    Cbeta,
    /// Whitespace-delimited word tokens, space joiner (alphabetic scripts).
    Pagel,
}

/// Splits text into tokens and rejoins tokens into text.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    pattern: Regex,
    joiner: String,
}

impl Tokenizer {
    /// Create a tokenizer from a custom pattern and joiner.
    pub fn new(pattern: &str, joiner: &str) -> Result<Self> {
        Ok(Tokenizer {
            pattern: Regex::new(pattern)?,
            joiner: joiner.to_string(),
        })
    }

    /// Create a tokenizer for one of the built-in profiles.
    pub fn from_profile(profile: TokenizerProfile) -> Self {
        let (pattern, joiner) = match profile {
            TokenizerProfile::Cbeta => (CBETA_PATTERN, CBETA_JOINER),
            TokenizerProfile::Pagel => (PAGEL_PATTERN, PAGEL_JOINER),
        };
        Tokenizer::new(pattern, joiner).expect("built-in tokenizer pattern is valid")
    }

    /// Split `text` into its ordered token sequence.
    pub fn tokenize<'t>(&self, text: &'t str) -> Vec<&'t str> {
        self.pattern.find_iter(text).map(|m| m.as_str()).collect()
    }

    /// The string used to rejoin tokens into text.
    pub fn joiner(&self) -> &str {
        &self.joiner
    }

    /// Rejoin a token sequence into text.
    pub fn join<S: AsRef<str>>(&self, tokens: &[S]) -> String {
        tokens
            .iter()
            .map(|t| t.as_ref())
            .collect::<Vec<_>>()
            .join(&self.joiner)
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Tokenizer::from_profile(TokenizerProfile::Cbeta)
    }
}

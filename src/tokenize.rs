use std::ffi::CString;
use std::fmt;

use crate::error::ParseError;

/// Most words a single command may have, program name included.
pub const MAX_ARGS: usize = 5;

/// Split one command string into owned words.
///
/// No quoting or escaping: words are separated by runs of whitespace.
pub fn tokenize(segment: &str) -> Vec<String> {
    segment.split_whitespace().map(|s| s.to_string()).collect()
}

/// One runnable command: the program name followed by its arguments.
///
/// Always holds between 1 and [`MAX_ARGS`] words. The C argv is built
/// alongside the words so a forked child can exec without allocating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgList {
    words: Vec<String>,
    argv: Vec<CString>,
}

impl ArgList {
    /// Tokenize `segment`. `position` is the segment's index in its line and
    /// only shows up in the error.
    pub fn parse(segment: &str, position: usize) -> Result<Self, ParseError> {
        let words = tokenize(segment);
        Self::from_words(words, position)
    }

    pub fn from_words(words: Vec<String>, position: usize) -> Result<Self, ParseError> {
        if words.is_empty() {
            return Err(ParseError::EmptyCommand { position });
        }
        if words.len() > MAX_ARGS {
            return Err(ParseError::ArgListTooLong {
                command: words.join(" "),
                found: words.len(),
                limit: MAX_ARGS,
            });
        }

        let argv = words
            .iter()
            .map(|w| CString::new(w.as_bytes()).map_err(|_| ParseError::InteriorNul))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { words, argv })
    }

    pub fn program(&self) -> &str {
        &self.words[0]
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    /// Full argument vector, argv[0] included.
    pub fn argv(&self) -> &[CString] {
        &self.argv
    }
}

impl fmt::Display for ArgList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.words().join(" "))
    }
}

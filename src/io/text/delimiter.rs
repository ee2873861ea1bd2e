//! Record delimiters.
//!
//! A [`Delimiter`] is either the default newline or a custom, validated byte
//! sequence. The default matches `\n` and additionally absorbs a directly
//! preceding, unescaped `\r`, so both LF and CRLF files read the same way. A
//! custom delimiter matches its bytes exactly and nothing else; in particular
//! `Delimiter::custom("\n")` does not strip carriage returns.

use crate::error::TextIoError;
use serde::Deserialize;

/// Validated record delimiter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(try_from = "DelimiterRepr")]
pub struct Delimiter {
    bytes: Option<Vec<u8>>,
}

impl Delimiter {
    /// The default line delimiter (`\n`, with an optional preceding `\r`).
    pub fn newline() -> Self {
        Self { bytes: None }
    }

    /// A custom delimiter.
    ///
    /// # Errors
    ///
    /// [`TextIoError::EmptyDelimiter`] for no bytes and
    /// [`TextIoError::SelfOverlappingDelimiter`] when a proper prefix equals a
    /// proper suffix (e.g. `"aba"`, `"||"`).
    pub fn custom(bytes: impl Into<Vec<u8>>) -> Result<Self, TextIoError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(TextIoError::EmptyDelimiter);
        }
        if is_self_overlapping(&bytes) {
            return Err(TextIoError::SelfOverlappingDelimiter {
                delimiter: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        Ok(Self { bytes: Some(bytes) })
    }

    pub fn is_newline(&self) -> bool {
        self.bytes.is_none()
    }

    /// The byte pattern the scanner searches for.
    pub fn pattern(&self) -> &[u8] {
        self.bytes.as_deref().unwrap_or(b"\n")
    }

    /// Check that `escape` can be used with this delimiter.
    ///
    /// # Errors
    ///
    /// [`TextIoError::EscapeInDelimiter`] if the escape byte is part of the
    /// delimiter (or is `\r` with the default newline).
    pub fn check_escape(&self, escape: Option<u8>) -> Result<(), TextIoError> {
        let Some(escape) = escape else {
            return Ok(());
        };
        if self.pattern().contains(&escape) || (self.is_newline() && escape == b'\r') {
            return Err(TextIoError::EscapeInDelimiter { escape });
        }
        Ok(())
    }
}

fn is_self_overlapping(d: &[u8]) -> bool {
    (1..d.len()).any(|i| d[..i] == d[d.len() - i..])
}

/// Config form: a UTF-8 string or a list of bytes.
#[derive(Deserialize)]
#[serde(untagged)]
enum DelimiterRepr {
    Text(String),
    Bytes(Vec<u8>),
}

impl TryFrom<DelimiterRepr> for Delimiter {
    type Error = TextIoError;

    fn try_from(repr: DelimiterRepr) -> Result<Self, Self::Error> {
        match repr {
            DelimiterRepr::Text(s) => Self::custom(s.into_bytes()),
            DelimiterRepr::Bytes(b) => Self::custom(b),
        }
    }
}

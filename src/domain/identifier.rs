//! Page identifier validation.
//!
//! Identifiers are opaque, but they end up in cache keys, SQL parameters and
//! acquisition URLs, so a few shapes are rejected up front.

use std::fmt;

use crate::domain::error::DomainError;

const MAX_IDENTIFIER_LEN: usize = 128;

/// A validated page identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageId(String);

impl PageId {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("page identifier must not be empty"));
        }
        if trimmed.chars().count() > MAX_IDENTIFIER_LEN {
            return Err(DomainError::validation(format!(
                "page identifier exceeds {MAX_IDENTIFIER_LEN} characters"
            )));
        }
        if trimmed
            .chars()
            .any(|c| c == '/' || c.is_whitespace() || c.is_control())
        {
            return Err(DomainError::validation(
                "page identifier must not contain `/`, whitespace or control characters",
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PageId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

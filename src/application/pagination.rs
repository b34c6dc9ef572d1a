//! Offset pagination helpers for list queries.

use crate::domain::error::DomainError;

pub const MIN_PAGE_SIZE: u32 = 1;
pub const MAX_PAGE_SIZE: u32 = 100;

/// A bounded `limit`/`offset` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    limit: u32,
    offset: u64,
}

impl PageWindow {
    /// Build a window from a raw skip count. `limit` is clamped to 1..=100.
    pub fn new(limit: u32, offset: u64) -> Self {
        Self {
            limit: limit.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE),
            offset,
        }
    }

    /// Build a window from a 1-indexed page number.
    pub fn from_page_number(page: u32, limit: u32) -> Result<Self, DomainError> {
        if page == 0 {
            return Err(DomainError::validation("page numbers start at 1"));
        }
        let limit = limit.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE);
        let offset = u64::from(page - 1) * u64::from(limit);
        Ok(Self { limit, offset })
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl Default for PageWindow {
    fn default() -> Self {
        Self::new(10, 0)
    }
}

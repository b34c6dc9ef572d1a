//! Cache key definitions.

const PAGE_KEY_PREFIX: &str = "page:";

/// Cache key holding the serialized page record for `page_id`.
pub fn page_key(page_id: &str) -> String {
    format!("{PAGE_KEY_PREFIX}{page_id}")
}

use crate::application::repos::RepoError;

pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::Database(db) if db.is_unique_violation() => RepoError::Duplicate {
            constraint: db.constraint().unwrap_or("unknown").to_string(),
        },
        sqlx::Error::Database(db)
            if db.is_foreign_key_violation()
                || db.is_check_violation()
                || db.message().contains("invalid input syntax") =>
        {
            RepoError::InvalidInput {
                message: db.message().to_string(),
            }
        }
        sqlx::Error::Database(db)
            if db
                .message()
                .contains("canceling statement due to user request") =>
        {
            RepoError::Timeout
        }
        sqlx::Error::PoolTimedOut => RepoError::Timeout,
        err @ (sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_)) => {
            RepoError::unavailable(err)
        }
        other => RepoError::from_persistence(other),
    }
}

pub fn to_db_count(value: u64, field: &str) -> Result<i64, RepoError> {
    i64::try_from(value).map_err(|_| RepoError::InvalidInput {
        message: format!("{field} {value} exceeds the storable range"),
    })
}

pub fn from_db_count(value: i64, field: &str) -> Result<u64, RepoError> {
    u64::try_from(value)
        .map_err(|_| RepoError::from_persistence(format!("stored {field} is negative: {value}")))
}

/// Wrap `needle` for a literal, case-insensitive `ILIKE ... ESCAPE '\'` match.
pub fn ilike_contains(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for ch in needle.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ilike_pattern_escapes_wildcards() {
        assert_eq!(ilike_contains("tech"), "%tech%");
        assert_eq!(ilike_contains("100%_a\\b"), "%100\\%\\_a\\\\b%");
    }

    #[test]
    fn counts_outside_i64_are_rejected() {
        assert!(to_db_count(u64::MAX, "followers").is_err());
        assert_eq!(to_db_count(500_000, "followers").expect("fits"), 500_000);
        assert!(from_db_count(-1, "likes").is_err());
    }
}

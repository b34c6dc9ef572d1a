use time::OffsetDateTime;

/// Drop sub-microsecond precision; Postgres `timestamptz` stores microseconds.
pub fn storage_precision(value: OffsetDateTime) -> OffsetDateTime {
    let nanos = value.nanosecond();
    value
        .replace_nanosecond(nanos - nanos % 1_000)
        .unwrap_or(value)
}

/// Current UTC time at storage precision.
pub fn now_utc() -> OffsetDateTime {
    storage_precision(OffsetDateTime::now_utc())
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn truncates_to_microseconds() {
        let value = datetime!(2024-05-06 07:08:09.123456789 UTC);
        assert_eq!(
            storage_precision(value),
            datetime!(2024-05-06 07:08:09.123456 UTC)
        );
    }

    #[test]
    fn now_has_no_sub_microsecond_component() {
        assert_eq!(now_utc().nanosecond() % 1_000, 0);
    }
}

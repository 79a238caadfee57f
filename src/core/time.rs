use time::{format_description::well_known::Rfc3339, OffsetDateTime, PrimitiveDateTime};

pub(crate) fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

pub(crate) fn format_offset(value: OffsetDateTime) -> String {
    value.format(&Rfc3339).unwrap_or_else(|_| value.to_string())
}

pub(crate) fn format_optional(value: Option<OffsetDateTime>) -> Option<String> {
    value.map(format_offset)
}

/// RFC 3339, or a zone-less `YYYY-MM-DDTHH:MM[:SS]` read as UTC.
pub(crate) fn parse_flexible(raw: &str) -> Option<OffsetDateTime> {
    if let Ok(value) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(value);
    }

    let minutes = time::macros::format_description!("[year]-[month]-[day]T[hour]:[minute]");
    let seconds =
        time::macros::format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    PrimitiveDateTime::parse(raw, &seconds)
        .or_else(|_| PrimitiveDateTime::parse(raw, &minutes))
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use time::UtcOffset;

    #[test]
    fn format_offset_preserves_offset() {
        let utc = datetime!(2025-01-02 10:20:30 UTC);
        let offset = UtcOffset::from_hms(3, 0, 0).unwrap();
        assert_eq!(format_offset(utc.to_offset(offset)), "2025-01-02T13:20:30+03:00");
        assert_eq!(format_offset(utc), "2025-01-02T10:20:30Z");
    }

    #[test]
    fn parse_flexible_accepts_local_forms() {
        let expected = datetime!(2025-03-01 09:00 UTC);
        assert_eq!(parse_flexible("2025-03-01T09:00:00Z"), Some(expected));
        assert_eq!(parse_flexible("2025-03-01T09:00"), Some(expected));
        assert_eq!(parse_flexible("2025-03-01T09:00:00"), Some(expected));
        assert_eq!(parse_flexible("tomorrow"), None);
    }
}

use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub mod challenge;
pub mod game;
pub mod health;
pub mod round;
pub mod sse;
pub mod validation;

/// Render a millisecond Unix timestamp as RFC 3339.
fn format_millis(millis: i64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
        .ok()
        .and_then(|time| time.format(&Rfc3339).ok())
        .unwrap_or_else(|| "invalid-timestamp".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_epoch_millis() {
        assert_eq!(format_millis(0), "1970-01-01T00:00:00Z");
        assert_eq!(format_millis(1_500), "1970-01-01T00:00:01.5Z");
    }
}

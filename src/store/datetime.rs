//! Text encoding of `created_at` as stored in SQLite.
//!
//! Layout is `YYYY-MM-DDTHH:MM:SS.ffffffZ`: microsecond precision, trailing
//! zeros kept, always UTC on write. Decoding also accepts an explicit
//! `+HH:MM`/`-HH:MM` offset and normalizes it to UTC.

use thiserror::Error;
use time::{macros::format_description, Duration, OffsetDateTime, PrimitiveDateTime, UtcOffset};

#[derive(Debug, Error)]
#[error("timestamp {input:?} does not match YYYY-MM-DDTHH:MM:SS.ffffff(Z|±HH:MM): {source}")]
pub struct DatetimeError {
    pub input: String,
    #[source]
    pub source: time::error::Parse,
}

pub fn encode(t: OffsetDateTime) -> String {
    let t = t.to_offset(UtcOffset::UTC);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:06}Z",
        t.year(),
        u8::from(t.month()),
        t.day(),
        t.hour(),
        t.minute(),
        t.second(),
        t.microsecond()
    )
}

pub fn decode(text: &str) -> Result<OffsetDateTime, DatetimeError> {
    let parsed = match text.strip_suffix('Z') {
        Some(local) => PrimitiveDateTime::parse(
            local,
            format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]"),
        )
        .map(PrimitiveDateTime::assume_utc),
        None => OffsetDateTime::parse(
            text,
            format_description!(
                "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6][offset_hour sign:mandatory]:[offset_minute]"
            ),
        ),
    };
    parsed
        .map(|t| t.to_offset(UtcOffset::UTC))
        .map_err(|source| DatetimeError {
            input: text.to_owned(),
            source,
        })
}

/// Current UTC instant with sub-microsecond digits dropped, so that the value
/// handed back after an insert equals what a later read decodes.
pub fn now_micros() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now - Duration::nanoseconds(i64::from(now.nanosecond() % 1_000))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn encodes_fixed_width_utc() {
        assert_eq!(
            encode(datetime!(2024-01-02 03:04:05.000600 UTC)),
            "2024-01-02T03:04:05.000600Z"
        );
        assert_eq!(
            encode(datetime!(2024-01-02 03:04:05 +02:00)),
            "2024-01-02T01:04:05.000000Z"
        );
    }

    #[test]
    fn roundtrip_is_exact_at_microsecond_precision() {
        let samples = [
            datetime!(1970-01-01 00:00:00 UTC),
            datetime!(1999-12-31 23:59:59.999999 UTC),
            datetime!(2024-02-29 12:00:00.000001 UTC),
            datetime!(2038-01-19 03:14:07.5 -05:30),
            now_micros(),
        ];
        for t in samples {
            let back = decode(&encode(t)).expect("decode");
            assert_eq!(back, t);
            assert_eq!(back.offset(), UtcOffset::UTC);
        }
    }

    #[test]
    fn decodes_explicit_offsets_to_utc() {
        let t = decode("2024-05-06T10:00:00.123456+02:00").unwrap();
        assert_eq!(t, datetime!(2024-05-06 08:00:00.123456 UTC));
    }

    #[test]
    fn rejects_other_layouts() {
        for bad in [
            "",
            "2024-05-06",
            "2024-05-06T10:00:00Z",
            "2024-05-06T10:00:00.123Z",
            "2024-05-06 10:00:00.123456Z",
            "2024-05-06T10:00:00.123456",
            "not a time",
        ] {
            let err = decode(bad).unwrap_err();
            assert_eq!(err.input, bad);
        }
    }

    #[test]
    fn now_has_no_sub_microsecond_digits() {
        assert_eq!(now_micros().nanosecond() % 1_000, 0);
    }
}

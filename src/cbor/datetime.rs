//! Tagged date-time values (tags 0 and 1)
//!
//! Both representations convert to `DateTime<Utc>` truncated to microseconds.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use thiserror::Error;

use super::value::{Value, TAG_DATETIME_EPOCH, TAG_DATETIME_TEXT};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DateTimeError {
    #[error("expected a date-time tag, found {0}")]
    NotADateTime(&'static str),

    #[error("invalid RFC 3339 date-time: {0}")]
    InvalidText(String),

    #[error("epoch time is not a finite number in range")]
    OutOfRange,
}

/// Interpret a tag 0 or tag 1 item as a timestamp
///
/// # Errors
/// Returns `DateTimeError` for any other item, unparsable text or an epoch
/// value chrono cannot represent.
pub fn to_datetime(value: &Value) -> Result<DateTime<Utc>, DateTimeError> {
    match value.as_tag() {
        Some((TAG_DATETIME_TEXT, Value::Text(text))) => DateTime::parse_from_rfc3339(text)
            .map(|dt| dt.with_timezone(&Utc).trunc_subsecs(6))
            .map_err(|e| DateTimeError::InvalidText(e.to_string())),
        Some((TAG_DATETIME_EPOCH, inner @ (Value::Unsigned(_) | Value::Negative(_)))) => inner
            .as_i64()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or(DateTimeError::OutOfRange),
        Some((TAG_DATETIME_EPOCH, Value::Float(secs))) => from_float_seconds(*secs),
        Some((_, inner)) => Err(DateTimeError::NotADateTime(inner.type_name())),
        None => Err(DateTimeError::NotADateTime(value.type_name())),
    }
}

/// Tag 0 form, with only as many fractional digits as needed
#[must_use]
pub fn text(at: DateTime<Utc>) -> Value {
    let at = at.trunc_subsecs(6);
    Value::Tag(
        TAG_DATETIME_TEXT,
        Box::new(Value::Text(at.to_rfc3339_opts(SecondsFormat::AutoSi, true))),
    )
}

/// Tag 1 form: an integer for whole seconds, a float otherwise
#[must_use]
pub fn epoch(at: DateTime<Utc>) -> Value {
    let secs = at.timestamp();
    let micros = at.timestamp_subsec_micros();
    let inner = if micros == 0 {
        Value::integer(secs)
    } else {
        #[allow(clippy::cast_precision_loss)]
        let seconds = secs as f64 + f64::from(micros) / 1_000_000.0;
        Value::Float(seconds)
    };
    Value::Tag(TAG_DATETIME_EPOCH, Box::new(inner))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn from_float_seconds(seconds: f64) -> Result<DateTime<Utc>, DateTimeError> {
    // i64 seconds cover far more than chrono's range, so reject early
    if !seconds.is_finite() || seconds.abs() > 1.0e15 {
        return Err(DateTimeError::OutOfRange);
    }
    let whole = seconds.floor();
    let mut micros = ((seconds - whole) * 1_000_000.0).round() as u32;
    let mut secs = whole as i64;
    if micros >= 1_000_000 {
        secs += 1;
        micros -= 1_000_000;
    }
    DateTime::from_timestamp(secs, micros * 1_000).ok_or(DateTimeError::OutOfRange)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_rfc8949_text_example() {
        let value = Value::Tag(0, Box::new("2013-03-21T20:04:00Z".into()));
        let dt = to_datetime(&value).unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2013, 3, 21, 20, 4, 0).unwrap());
        assert_eq!(text(dt), value);
    }

    #[test]
    fn test_rfc8949_epoch_examples() {
        let whole = Value::Tag(1, Box::new(Value::Unsigned(1_363_896_240)));
        let fractional = Value::Tag(1, Box::new(Value::Float(1_363_896_240.5)));
        let dt = to_datetime(&whole).unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2013, 3, 21, 20, 4, 0).unwrap());
        assert_eq!(epoch(dt), whole);

        let dt = to_datetime(&fractional).unwrap();
        assert_eq!(dt.timestamp_subsec_millis(), 500);
        assert_eq!(epoch(dt), fractional);
    }

    #[test]
    fn test_text_and_epoch_agree_to_the_millisecond() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let from_text = to_datetime(&text(at)).unwrap();
        let from_epoch = to_datetime(&epoch(at)).unwrap();
        assert_eq!(from_text.timestamp_millis(), at.timestamp_millis());
        assert_eq!(from_epoch.timestamp_millis(), at.timestamp_millis());
        assert_eq!(to_datetime(&text(from_epoch)).unwrap(), from_text);
    }

    #[test]
    fn test_offsets_normalise_to_utc() {
        let value = Value::Tag(0, Box::new("2013-03-21T22:04:00+02:00".into()));
        assert_eq!(
            to_datetime(&value).unwrap(),
            Utc.with_ymd_and_hms(2013, 3, 21, 20, 4, 0).unwrap()
        );
    }

    #[test]
    fn test_negative_epoch() {
        let value = Value::Tag(1, Box::new(Value::integer(-86_400)));
        assert_eq!(
            to_datetime(&value).unwrap(),
            Utc.with_ymd_and_hms(1969, 12, 31, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_rejects_non_dates() {
        assert!(matches!(
            to_datetime(&Value::Unsigned(5)),
            Err(DateTimeError::NotADateTime("integer"))
        ));
        assert!(matches!(
            to_datetime(&Value::Tag(0, Box::new("yesterday".into()))),
            Err(DateTimeError::InvalidText(_))
        ));
        assert_eq!(
            to_datetime(&Value::Tag(1, Box::new(Value::Float(f64::NAN)))),
            Err(DateTimeError::OutOfRange)
        );
        assert!(to_datetime(&Value::Tag(2, Box::new(Value::Bytes(vec![1])))).is_err());
    }
}

//! Column values and OID-based coercion of text-format data.

use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};

use crate::datestyle::{DateStyle, parse_time};
use crate::error::{Error, Result};
use crate::protocol::types::{Oid, oid};

/// A decoded column value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Bool(bool),
    /// Any of int2, int4 or int8
    Int(i64),
    /// Every type without a dedicated coercion, and uninterpretable date/time text
    Text(String),
    Date(Date),
    Time(Time),
    Timestamp(PrimitiveDateTime),
    TimestampTz(OffsetDateTime),
}

impl Value {
    /// Coerce the text-format bytes of a column of type `type_oid`.
    ///
    /// Date and time values that cannot be interpreted under `style`
    /// (`infinity`, BC dates, named zones) stay [`Value::Text`].
    pub fn from_text(type_oid: Oid, bytes: &[u8], style: DateStyle) -> Result<Self> {
        let s = simdutf8::compat::from_utf8(bytes)
            .map_err(|e| Error::Decode(format!("invalid UTF-8 in column of type {type_oid}: {e}")))?;

        let value = match type_oid {
            oid::BOOL => Value::Bool(s == "t"),
            oid::INT2 | oid::INT4 | oid::INT8 => Value::Int(
                s.parse()
                    .map_err(|e| Error::Decode(format!("invalid integer {s:?}: {e}")))?,
            ),
            oid::DATE => style.parse_date(s).map(Value::Date).unwrap_or_else(|| text(s)),
            oid::TIME => parse_time(s).map(Value::Time).unwrap_or_else(|| text(s)),
            oid::TIMESTAMP => style
                .parse_timestamp(s)
                .map(Value::Timestamp)
                .unwrap_or_else(|| text(s)),
            oid::TIMESTAMPTZ => style
                .parse_timestamptz(s)
                .map(Value::TimestampTz)
                .unwrap_or_else(|| text(s)),
            _ => text(s),
        };
        Ok(value)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<Date> {
        match self {
            Value::Date(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<Time> {
        match self {
            Value::Time(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<PrimitiveDateTime> {
        match self {
            Value::Timestamp(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_timestamptz(&self) -> Option<OffsetDateTime> {
        match self {
            Value::TimestampTz(v) => Some(*v),
            _ => None,
        }
    }
}

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn coerce(type_oid: Oid, s: &str) -> Value {
        Value::from_text(type_oid, s.as_bytes(), DateStyle::default()).unwrap()
    }

    #[test]
    fn test_bool() {
        assert_eq!(coerce(oid::BOOL, "t"), Value::Bool(true));
        assert_eq!(coerce(oid::BOOL, "f"), Value::Bool(false));
    }

    #[test]
    fn test_integers() {
        assert_eq!(coerce(oid::INT4, "42"), Value::Int(42));
        assert_eq!(coerce(oid::INT2, "-7"), Value::Int(-7));
        assert_eq!(coerce(oid::INT8, "9007199254740993"), Value::Int(9_007_199_254_740_993));
        assert!(matches!(
            Value::from_text(oid::INT4, b"4x", DateStyle::default()),
            Err(Error::Decode(_))
        ));
    }

    #[test]
    fn test_other_types_stay_text() {
        assert_eq!(coerce(oid::TEXT, "hello"), Value::from("hello"));
        assert_eq!(coerce(oid::FLOAT8, "1.5"), Value::from("1.5"));
        assert_eq!(coerce(oid::DATE, "infinity"), Value::from("infinity"));
    }

    #[test]
    fn test_date_uses_style() {
        let german = DateStyle::parse("German, DMY");
        assert_eq!(
            Value::from_text(oid::DATE, b"15.01.2024", german).unwrap(),
            Value::Date(date!(2024 - 01 - 15))
        );
    }
}

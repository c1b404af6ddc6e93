//! Interpretation of date/time text under the server's `DateStyle`.
//!
//! The server reports `DateStyle` through ParameterStatus, e.g. `ISO, MDY`
//! or `German, DMY`. The output style decides the shape of date/time text;
//! the field order disambiguates day and month in the SQL and Postgres
//! styles.

use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

/// Output format half of `DateStyle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateOutput {
    /// `2024-01-15 10:30:00+01`
    #[default]
    Iso,
    /// `01/15/2024 10:30:00 CET`
    Sql,
    /// `Mon Jan 15 10:30:00 2024 CET`
    Postgres,
    /// `15.01.2024 10:30:00 CET`
    German,
}

/// Field order half of `DateStyle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateOrder {
    #[default]
    Mdy,
    Dmy,
    Ymd,
}

/// Parsed `DateStyle` server parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateStyle {
    pub output: DateOutput,
    pub order: DateOrder,
}

impl DateStyle {
    /// Parse a `DateStyle` value such as `ISO, MDY`.
    ///
    /// Unrecognized components keep their defaults.
    pub fn parse(value: &str) -> Self {
        let mut style = DateStyle::default();
        for part in value.split(',').map(str::trim) {
            match part.to_ascii_uppercase().as_str() {
                "ISO" => style.output = DateOutput::Iso,
                "SQL" => style.output = DateOutput::Sql,
                "POSTGRES" => style.output = DateOutput::Postgres,
                "GERMAN" => style.output = DateOutput::German,
                "MDY" | "US" | "NONEURO" | "NONEUROPEAN" => style.order = DateOrder::Mdy,
                "DMY" | "EURO" | "EUROPEAN" => style.order = DateOrder::Dmy,
                "YMD" => style.order = DateOrder::Ymd,
                other => tracing::debug!(component = other, "ignoring DateStyle component"),
            }
        }
        style
    }

    fn day_first(self) -> bool {
        self.order == DateOrder::Dmy
    }

    /// Parse `date` output.
    pub fn parse_date(self, s: &str) -> Option<Date> {
        let parsed = match self.output {
            DateOutput::Iso => Date::parse(s, format_description!("[year]-[month]-[day]")),
            DateOutput::Sql if self.day_first() => {
                Date::parse(s, format_description!("[day]/[month]/[year]"))
            }
            DateOutput::Sql => Date::parse(s, format_description!("[month]/[day]/[year]")),
            DateOutput::Postgres if self.day_first() => {
                Date::parse(s, format_description!("[day]-[month]-[year]"))
            }
            DateOutput::Postgres => Date::parse(s, format_description!("[month]-[day]-[year]")),
            DateOutput::German => Date::parse(s, format_description!("[day].[month].[year]")),
        };
        parsed.ok()
    }

    /// Parse `timestamp` output. Postgres-style timestamps are not interpreted.
    pub fn parse_timestamp(self, s: &str) -> Option<PrimitiveDateTime> {
        if self.output == DateOutput::Postgres {
            return None;
        }
        let (date, time) = s.split_once(' ')?;
        Some(PrimitiveDateTime::new(self.parse_date(date)?, parse_time(time)?))
    }

    /// Parse `timestamptz` output. Only the ISO style carries a numeric offset.
    pub fn parse_timestamptz(self, s: &str) -> Option<OffsetDateTime> {
        if self.output != DateOutput::Iso {
            return None;
        }
        let (date, rest) = s.split_once(' ')?;
        let split = rest.rfind(['+', '-'])?;
        let (time, offset) = rest.split_at(split);
        let local = PrimitiveDateTime::new(self.parse_date(date)?, parse_time(time)?);
        Some(local.assume_offset(parse_offset(offset)?))
    }
}

/// Parse `time` output (`HH:MM:SS[.ffffff]`), identical under every style.
pub fn parse_time(s: &str) -> Option<Time> {
    Time::parse(s, format_description!("[hour]:[minute]:[second].[subsecond]"))
        .or_else(|_| Time::parse(s, format_description!("[hour]:[minute]:[second]")))
        .ok()
}

/// Parse a numeric UTC offset: `+HH`, `-HH:MM` or `+HH:MM:SS`.
fn parse_offset(s: &str) -> Option<UtcOffset> {
    let (sign, digits) = match s.split_at_checked(1)? {
        ("+", rest) => (1_i8, rest),
        ("-", rest) => (-1_i8, rest),
        _ => return None,
    };
    let mut parts = [0_i8; 3];
    for (i, part) in digits.split(':').enumerate() {
        *parts.get_mut(i)? = part.parse().ok()?;
    }
    let [h, m, sec] = parts;
    UtcOffset::from_hms(sign * h, sign * m, sign * sec).ok()
}

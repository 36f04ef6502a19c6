//! Atomic values and their canonical lexical forms.

use core::fmt;

use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;

use crate::engine::runtime::{Error, ErrorCode};
use crate::xdm::TypeName;

#[derive(Debug, Clone, PartialEq)]
pub enum AtomicValue {
    UntypedAtomic(String),
    String(String),
    AnyUri(String),
    Boolean(bool),
    Decimal(Decimal),
    Integer(i64),
    Float(f32),
    Double(f64),
    /// General `xs:duration`; months and seconds share one sign.
    Duration { months: i32, seconds: i64 },
    YearMonthDuration(i32),
    /// Whole seconds.
    DayTimeDuration(i64),
    DateTime { value: NaiveDateTime, tz: Option<FixedOffset> },
    Date { date: NaiveDate, tz: Option<FixedOffset> },
    Time { time: NaiveTime, tz: Option<FixedOffset> },
    QName { ns_uri: Option<String>, prefix: Option<String>, local: String },
}

impl AtomicValue {
    pub fn type_name(&self) -> TypeName {
        match self {
            AtomicValue::UntypedAtomic(_) => TypeName::UntypedAtomic,
            AtomicValue::String(_) => TypeName::String,
            AtomicValue::AnyUri(_) => TypeName::AnyUri,
            AtomicValue::Boolean(_) => TypeName::Boolean,
            AtomicValue::Decimal(_) => TypeName::Decimal,
            AtomicValue::Integer(_) => TypeName::Integer,
            AtomicValue::Float(_) => TypeName::Float,
            AtomicValue::Double(_) => TypeName::Double,
            AtomicValue::Duration { .. } => TypeName::Duration,
            AtomicValue::YearMonthDuration(_) => TypeName::YearMonthDuration,
            AtomicValue::DayTimeDuration(_) => TypeName::DayTimeDuration,
            AtomicValue::DateTime { .. } => TypeName::DateTime,
            AtomicValue::Date { .. } => TypeName::Date,
            AtomicValue::Time { .. } => TypeName::Time,
            AtomicValue::QName { .. } => TypeName::QName,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, AtomicValue::Integer(_) | AtomicValue::Decimal(_) | AtomicValue::Float(_) | AtomicValue::Double(_))
    }

    pub fn is_nan(&self) -> bool {
        match self {
            AtomicValue::Double(d) => d.is_nan(),
            AtomicValue::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    /// Canonical lexical representation, as produced by a cast to `xs:string`.
    pub fn lexical(&self) -> String {
        match self {
            AtomicValue::UntypedAtomic(s) | AtomicValue::String(s) | AtomicValue::AnyUri(s) => s.clone(),
            AtomicValue::Boolean(b) => b.to_string(),
            AtomicValue::Decimal(d) => d.normalize().to_string(),
            AtomicValue::Integer(i) => i.to_string(),
            AtomicValue::Float(f) => format_ieee(f64::from(*f), f.to_string(), || format!("{f:E}")),
            AtomicValue::Double(d) => format_ieee(*d, d.to_string(), || format!("{d:E}")),
            AtomicValue::Duration { months, seconds } => format_duration(*months, *seconds),
            AtomicValue::YearMonthDuration(0) => "P0M".to_string(),
            AtomicValue::YearMonthDuration(months) => format_duration(*months, 0),
            AtomicValue::DayTimeDuration(seconds) => format_duration(0, *seconds),
            AtomicValue::DateTime { value, tz } => {
                format!("{}{}", value.format("%Y-%m-%dT%H:%M:%S%.f"), format_timezone(*tz))
            }
            AtomicValue::Date { date, tz } => format!("{}{}", date.format("%Y-%m-%d"), format_timezone(*tz)),
            AtomicValue::Time { time, tz } => format!("{}{}", time.format("%H:%M:%S%.f"), format_timezone(*tz)),
            AtomicValue::QName { prefix, local, .. } => match prefix {
                Some(p) if !p.is_empty() => format!("{p}:{local}"),
                _ => local.clone(),
            },
        }
    }

    pub fn effective_boolean_value(&self) -> Result<bool, Error> {
        match self {
            AtomicValue::Boolean(b) => Ok(*b),
            AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) | AtomicValue::AnyUri(s) => Ok(!s.is_empty()),
            AtomicValue::Integer(i) => Ok(*i != 0),
            AtomicValue::Decimal(d) => Ok(!d.is_zero()),
            AtomicValue::Float(f) => Ok(*f != 0.0 && !f.is_nan()),
            AtomicValue::Double(d) => Ok(*d != 0.0 && !d.is_nan()),
            other => Err(Error::from_code(
                ErrorCode::FORG0006,
                format!("effective boolean value is not defined for {}", other.type_name()),
            )),
        }
    }
}

impl fmt::Display for AtomicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lexical())
    }
}

fn format_ieee(value: f64, plain: String, scientific: impl FnOnce() -> String) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "INF" } else { "-INF" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0" } else { "0" }.to_string();
    }
    if (1e-6..1e6).contains(&value.abs()) {
        return plain;
    }
    let s = scientific();
    match s.split_once('E') {
        Some((mantissa, exp)) if !mantissa.contains('.') => format!("{mantissa}.0E{exp}"),
        _ => s,
    }
}

pub(crate) fn format_timezone(tz: Option<FixedOffset>) -> String {
    let Some(tz) = tz else { return String::new() };
    let secs = tz.local_minus_utc();
    if secs == 0 {
        return "Z".to_string();
    }
    let sign = if secs < 0 { '-' } else { '+' };
    let abs = secs.abs();
    format!("{sign}{:02}:{:02}", abs / 3600, (abs % 3600) / 60)
}

fn format_duration(months: i32, seconds: i64) -> String {
    if months == 0 && seconds == 0 {
        return "PT0S".to_string();
    }
    let negative = months < 0 || seconds < 0;
    let months = months.unsigned_abs();
    let seconds = seconds.unsigned_abs();
    let mut out = String::from(if negative { "-P" } else { "P" });
    let (years, months) = (months / 12, months % 12);
    if years > 0 {
        out.push_str(&format!("{years}Y"));
    }
    if months > 0 {
        out.push_str(&format!("{months}M"));
    }
    let (days, rem) = (seconds / 86_400, seconds % 86_400);
    if days > 0 {
        out.push_str(&format!("{days}D"));
    }
    let (hours, rem) = (rem / 3600, rem % 3600);
    let (minutes, secs) = (rem / 60, rem % 60);
    if hours > 0 || minutes > 0 || secs > 0 {
        out.push('T');
        if hours > 0 {
            out.push_str(&format!("{hours}H"));
        }
        if minutes > 0 {
            out.push_str(&format!("{minutes}M"));
        }
        if secs > 0 {
            out.push_str(&format!("{secs}S"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(AtomicValue::Double(1.5), "1.5")]
    #[case(AtomicValue::Double(100.0), "100")]
    #[case(AtomicValue::Double(1e7), "1.0E7")]
    #[case(AtomicValue::Double(1.25e-7), "1.25E-7")]
    #[case(AtomicValue::Double(f64::NAN), "NaN")]
    #[case(AtomicValue::Double(f64::NEG_INFINITY), "-INF")]
    #[case(AtomicValue::Double(-0.0), "-0")]
    #[case(AtomicValue::Float(0.5), "0.5")]
    #[case(AtomicValue::Decimal(Decimal::new(1500, 3)), "1.5")]
    #[case(AtomicValue::YearMonthDuration(14), "P1Y2M")]
    #[case(AtomicValue::YearMonthDuration(-3), "-P3M")]
    #[case(AtomicValue::YearMonthDuration(0), "P0M")]
    #[case(AtomicValue::DayTimeDuration(93_784), "P1DT2H3M4S")]
    #[case(AtomicValue::DayTimeDuration(0), "PT0S")]
    fn canonical_lexical_forms(#[case] value: AtomicValue, #[case] expected: &str) {
        assert_eq!(value.lexical(), expected);
    }

    #[rstest]
    fn date_time_keeps_timezone() {
        let value = NaiveDate::from_ymd_opt(2024, 2, 29).and_then(|d| d.and_hms_opt(13, 5, 0)).unwrap();
        let tz = FixedOffset::east_opt(-5 * 3600);
        assert_eq!(AtomicValue::DateTime { value, tz }.lexical(), "2024-02-29T13:05:00-05:00");
        assert_eq!(AtomicValue::DateTime { value, tz: FixedOffset::east_opt(0) }.lexical(), "2024-02-29T13:05:00Z");
    }

    #[rstest]
    #[case(AtomicValue::Double(f64::NAN), false)]
    #[case(AtomicValue::Integer(0), false)]
    #[case(AtomicValue::Decimal(Decimal::new(1, 1)), true)]
    #[case(AtomicValue::String(String::new()), false)]
    #[case(AtomicValue::UntypedAtomic("x".into()), true)]
    fn effective_boolean_values(#[case] value: AtomicValue, #[case] expected: bool) {
        assert_eq!(value.effective_boolean_value().unwrap(), expected);
    }

    #[rstest]
    fn effective_boolean_value_of_date_is_an_error() {
        let date = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let err = AtomicValue::Date { date, tz: None }.effective_boolean_value().unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::FORG0006);
    }
}

//! Casting between atomic types, lexical parsing and atomization.

use std::str::FromStr;

use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use smallvec::{SmallVec, smallvec};

use crate::engine::facade::DocumentFacade;
use crate::engine::runtime::{DynamicContext, Error, ErrorCode};
use crate::engine::selector::Child;
use crate::model::NodeKind;
use crate::ready;
use crate::xdm::{AtomicValue, Fetch, NodeHandle, Sequence, TypeName, Value};

use super::numeric::{NumKind, decimal_from_f64};
use super::{eval, singleton_atomic};

pub(crate) type Atoms = SmallVec<[AtomicValue; 1]>;

fn invalid(text: &str, target: TypeName) -> Error {
    Error::from_code(ErrorCode::FORG0001, format!("'{text}' is not a valid {target}"))
}

fn not_castable(value: &AtomicValue, target: TypeName) -> Error {
    Error::from_code(ErrorCode::XPTY0004, format!("cannot cast {} to {target}", value.type_name()))
}

fn out_of_range(value: &AtomicValue, target: TypeName) -> Error {
    Error::from_code(ErrorCode::FOCA0002, format!("{value} is out of range for {target}"))
}

/// Casts `value` to `target`. Casting to the value's own type returns it unchanged.
pub(crate) fn cast_atomic(value: &AtomicValue, target: TypeName) -> Result<AtomicValue, Error> {
    if target.is_abstract() || !target.is_atomic() {
        return Err(Error::from_code(ErrorCode::XPST0080, format!("{target} is not a valid cast target")));
    }
    if value.type_name() == target {
        return Ok(value.clone());
    }
    match target {
        TypeName::String => return Ok(AtomicValue::String(value.lexical())),
        TypeName::UntypedAtomic => return Ok(AtomicValue::UntypedAtomic(value.lexical())),
        _ => {}
    }
    if let AtomicValue::String(text) | AtomicValue::UntypedAtomic(text) = value {
        return parse_lexical(text, target);
    }
    if let Some(number) = NumKind::classify(value) {
        return cast_numeric(value, number, target);
    }
    Ok(match (value, target) {
        (AtomicValue::Boolean(b), TypeName::Integer) => AtomicValue::Integer(i64::from(*b)),
        (AtomicValue::Boolean(b), TypeName::Decimal) => AtomicValue::Decimal(Decimal::from(u8::from(*b))),
        (AtomicValue::Boolean(b), TypeName::Float) => AtomicValue::Float(f32::from(u8::from(*b))),
        (AtomicValue::Boolean(b), TypeName::Double) => AtomicValue::Double(f64::from(u8::from(*b))),
        (AtomicValue::Duration { months, .. }, TypeName::YearMonthDuration) => AtomicValue::YearMonthDuration(*months),
        (AtomicValue::Duration { seconds, .. }, TypeName::DayTimeDuration) => AtomicValue::DayTimeDuration(*seconds),
        (AtomicValue::YearMonthDuration(months), TypeName::Duration) => {
            AtomicValue::Duration { months: *months, seconds: 0 }
        }
        (AtomicValue::DayTimeDuration(seconds), TypeName::Duration) => {
            AtomicValue::Duration { months: 0, seconds: *seconds }
        }
        (AtomicValue::YearMonthDuration(_), TypeName::DayTimeDuration) => AtomicValue::DayTimeDuration(0),
        (AtomicValue::DayTimeDuration(_), TypeName::YearMonthDuration) => AtomicValue::YearMonthDuration(0),
        (AtomicValue::DateTime { value, tz }, TypeName::Date) => AtomicValue::Date { date: value.date(), tz: *tz },
        (AtomicValue::DateTime { value, tz }, TypeName::Time) => AtomicValue::Time { time: value.time(), tz: *tz },
        (AtomicValue::Date { date, tz }, TypeName::DateTime) => {
            AtomicValue::DateTime { value: date.and_time(NaiveTime::MIN), tz: *tz }
        }
        _ => return Err(not_castable(value, target)),
    })
}

#[allow(clippy::cast_possible_truncation)]
fn cast_numeric(value: &AtomicValue, number: NumKind, target: TypeName) -> Result<AtomicValue, Error> {
    Ok(match target {
        TypeName::Boolean => AtomicValue::Boolean(value.effective_boolean_value()?),
        TypeName::Double => AtomicValue::Double(number.to_f64()),
        TypeName::Float => AtomicValue::Float(number.to_f64() as f32),
        TypeName::Decimal => match number {
            NumKind::Int(i) => AtomicValue::Decimal(Decimal::from(i)),
            NumKind::Dec(d) => AtomicValue::Decimal(d),
            other => AtomicValue::Decimal(decimal_from_f64(other.to_f64())?),
        },
        TypeName::Integer => match number {
            NumKind::Int(i) => AtomicValue::Integer(i),
            NumKind::Dec(d) => AtomicValue::Integer(d.trunc().to_i64().ok_or_else(|| out_of_range(value, target))?),
            other => {
                let truncated = other.to_f64().trunc();
                if !truncated.is_finite() || truncated.abs() >= 9.2e18 {
                    return Err(out_of_range(value, target));
                }
                AtomicValue::Integer(truncated as i64)
            }
        },
        _ => return Err(not_castable(value, target)),
    })
}

fn parse_lexical(text: &str, target: TypeName) -> Result<AtomicValue, Error> {
    let trimmed = text.trim();
    let parsed = match target {
        TypeName::AnyUri => Some(AtomicValue::AnyUri(trimmed.to_string())),
        TypeName::Boolean => match trimmed {
            "true" | "1" => Some(AtomicValue::Boolean(true)),
            "false" | "0" => Some(AtomicValue::Boolean(false)),
            _ => None,
        },
        TypeName::Integer => parse_integer(trimmed).map(AtomicValue::Integer),
        TypeName::Decimal => parse_decimal(trimmed).map(AtomicValue::Decimal),
        TypeName::Double => return parse_double(trimmed).map(AtomicValue::Double),
        #[allow(clippy::cast_possible_truncation)]
        TypeName::Float => return parse_double(trimmed).map(|d| AtomicValue::Float(d as f32)).map_err(|_| invalid(text, target)),
        TypeName::Duration => parse_duration(trimmed).map(|d| AtomicValue::Duration { months: d.months, seconds: d.seconds }),
        TypeName::YearMonthDuration => {
            parse_duration(trimmed).filter(|d| !d.has_day_time).map(|d| AtomicValue::YearMonthDuration(d.months))
        }
        TypeName::DayTimeDuration => {
            parse_duration(trimmed).filter(|d| !d.has_year_month).map(|d| AtomicValue::DayTimeDuration(d.seconds))
        }
        TypeName::DateTime => parse_date_time(trimmed),
        TypeName::Date => parse_date(trimmed),
        TypeName::Time => parse_time(trimmed),
        TypeName::QName => is_ncname(trimmed).then(|| AtomicValue::QName {
            ns_uri: None,
            prefix: None,
            local: trimmed.to_string(),
        }),
        _ => None,
    };
    parsed.ok_or_else(|| invalid(text, target))
}

fn parse_integer(text: &str) -> Option<i64> {
    let digits = text.strip_prefix(['+', '-']).unwrap_or(text);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.strip_prefix('+').unwrap_or(text).parse().ok()
}

fn parse_decimal(text: &str) -> Option<Decimal> {
    let unsigned = text.strip_prefix(['+', '-']).unwrap_or(text);
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let digits_only = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (int_part.is_empty() && frac_part.is_empty()) || !digits_only(int_part) || !digits_only(frac_part) {
        return None;
    }
    Decimal::from_str(text.strip_prefix('+').unwrap_or(text)).ok()
}

/// `xs:double` lexical form, including `INF`, `-INF` and `NaN`.
pub(crate) fn parse_double(text: &str) -> Result<f64, Error> {
    let trimmed = text.trim();
    match trimmed {
        "INF" | "+INF" => return Ok(f64::INFINITY),
        "-INF" => return Ok(f64::NEG_INFINITY),
        "NaN" => return Ok(f64::NAN),
        _ => {}
    }
    let well_formed = !trimmed.is_empty()
        && trimmed.bytes().all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E'))
        && trimmed.bytes().any(|b| b.is_ascii_digit());
    if !well_formed {
        return Err(invalid(text, TypeName::Double));
    }
    trimmed.parse().map_err(|_| invalid(text, TypeName::Double))
}

struct ParsedDuration {
    months: i32,
    seconds: i64,
    has_year_month: bool,
    has_day_time: bool,
}

fn parse_duration(text: &str) -> Option<ParsedDuration> {
    let (negative, rest) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let rest = rest.strip_prefix('P')?;
    let (date_part, time_part) = match rest.split_once('T') {
        Some((_, "")) => return None,
        Some((date, time)) => (date, Some(time)),
        None => (rest, None),
    };
    let mut months: i64 = 0;
    let mut seconds: i64 = 0;
    let mut has_year_month = false;
    let mut has_day_time = false;
    for (value, unit) in duration_components(date_part, "YMD")? {
        let value: i64 = value.parse().ok()?;
        match unit {
            'Y' => months = months.checked_add(value.checked_mul(12)?)?,
            'M' => months = months.checked_add(value)?,
            _ => seconds = seconds.checked_add(value.checked_mul(86_400)?)?,
        }
        has_year_month |= unit != 'D';
        has_day_time |= unit == 'D';
    }
    if let Some(time) = time_part {
        for (value, unit) in duration_components(time, "HMS")? {
            let value: i64 = if unit == 'S' {
                let whole = value.split_once('.').map_or(value, |(w, _)| w);
                whole.parse().ok()?
            } else {
                value.parse().ok()?
            };
            let factor = match unit {
                'H' => 3_600,
                'M' => 60,
                _ => 1,
            };
            seconds = seconds.checked_add(value.checked_mul(factor)?)?;
            has_day_time = true;
        }
    }
    if !has_year_month && !has_day_time {
        return None;
    }
    let sign = if negative { -1 } else { 1 };
    Some(ParsedDuration {
        months: i32::try_from(months * sign).ok()?,
        seconds: seconds * sign,
        has_year_month,
        has_day_time,
    })
}

/// Splits `1Y2M` into `[("1", 'Y'), ("2", 'M')]`, enforcing the unit order given by `units`.
fn duration_components<'a>(part: &'a str, units: &str) -> Option<Vec<(&'a str, char)>> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut allowed = units;
    for (i, c) in part.char_indices() {
        if c.is_ascii_digit() || (c == '.' && allowed.ends_with('S')) {
            continue;
        }
        let at = allowed.find(c)?;
        let value = &part[start..i];
        if value.is_empty() {
            return None;
        }
        out.push((value, c));
        allowed = &allowed[at + 1..];
        start = i + 1;
    }
    (start == part.len()).then_some(out)
}

fn split_timezone(text: &str) -> Option<(&str, Option<FixedOffset>)> {
    if let Some(body) = text.strip_suffix('Z') {
        return Some((body, FixedOffset::east_opt(0)));
    }
    let bytes = text.as_bytes();
    if bytes.len() > 6 && matches!(bytes[bytes.len() - 6], b'+' | b'-') && bytes[bytes.len() - 3] == b':' {
        let (body, tz) = text.split_at(text.len() - 6);
        let hours: i32 = tz[1..3].parse().ok()?;
        let minutes: i32 = tz[4..6].parse().ok()?;
        if hours > 14 || minutes > 59 {
            return None;
        }
        let offset = (hours * 60 + minutes) * 60;
        let offset = if tz.starts_with('-') { -offset } else { offset };
        return Some((body, Some(FixedOffset::east_opt(offset)?)));
    }
    Some((text, None))
}

fn parse_date_time(text: &str) -> Option<AtomicValue> {
    let (body, tz) = split_timezone(text)?;
    let value = NaiveDateTime::parse_from_str(body, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    Some(AtomicValue::DateTime { value, tz })
}

fn parse_date(text: &str) -> Option<AtomicValue> {
    let (body, tz) = split_timezone(text)?;
    let date = NaiveDate::parse_from_str(body, "%Y-%m-%d").ok()?;
    Some(AtomicValue::Date { date, tz })
}

fn parse_time(text: &str) -> Option<AtomicValue> {
    let (body, tz) = split_timezone(text)?;
    let time = NaiveTime::parse_from_str(body, "%H:%M:%S%.f").ok()?;
    Some(AtomicValue::Time { time, tz })
}

pub(crate) fn is_ncname(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Typed content of one item. Functions cannot be atomized.
pub(crate) fn atomize_item<N: NodeHandle>(value: &Value<N>, facade: &dyn DocumentFacade<N>) -> Result<Atoms, Error> {
    match value {
        Value::Atomic(a) => Ok(smallvec![a.clone()]),
        Value::Node(node) => {
            if let Some(typed) = facade.typed_value(&node.handle) {
                return Ok(typed.into_iter().collect());
            }
            let text = facade.string_value(&node.handle);
            Ok(match node.kind {
                NodeKind::Comment | NodeKind::ProcessingInstruction | NodeKind::Namespace => {
                    smallvec![AtomicValue::String(text)]
                }
                _ => smallvec![AtomicValue::UntypedAtomic(text)],
            })
        }
        Value::Function(f) => Err(Error::from_code(
            ErrorCode::FOTY0013,
            format!("function {} cannot be atomized", f.display_name()),
        )),
    }
}

pub(crate) fn atomize_values<N: NodeHandle>(values: &[Value<N>], facade: &dyn DocumentFacade<N>) -> Result<Vec<AtomicValue>, Error> {
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        out.extend(atomize_item(value, facade)?);
    }
    Ok(out)
}

/// Lazy atomization of a whole sequence.
pub(crate) fn atomize<N: NodeHandle>(sequence: &Sequence<N>, ctx: &DynamicContext<N>) -> Sequence<N> {
    if let Some(values) = sequence.materialized()
        && values.iter().all(|v| matches!(v, Value::Atomic(_)))
    {
        return sequence.clone();
    }
    let facade = std::sync::Arc::clone(&ctx.dom_facade);
    sequence.flat_map(move |value, _| {
        let atoms = atomize_item(&value, facade.as_ref())?;
        Ok(Sequence::from_values(atoms.into_iter().map(Value::Atomic).collect()))
    })
}

pub(super) fn cast_expr<N: NodeHandle>(
    operand: &Child,
    target: TypeName,
    allow_empty: bool,
    ctx: &DynamicContext<N>,
) -> Result<Sequence<N>, Error> {
    if target.is_abstract() || !target.is_atomic() {
        return Err(Error::from_code(ErrorCode::XPST0080, format!("{target} is not a valid cast target")));
    }
    let input = atomize(&eval(operand, ctx)?, ctx);
    Ok(Sequence::deferred(move || {
        let values = ready!(input.get_all_values()?);
        match singleton_atomic(values, "cast")? {
            None if allow_empty => Ok(Fetch::Ready(Sequence::empty())),
            None => Err(Error::from_code(ErrorCode::XPTY0004, format!("empty sequence cannot be cast to {target}"))),
            Some(atom) => Ok(Fetch::Ready(Sequence::singleton(Value::Atomic(cast_atomic(&atom, target)?)))),
        }
    }))
}

pub(super) fn castable_expr<N: NodeHandle>(
    operand: &Child,
    target: TypeName,
    allow_empty: bool,
    ctx: &DynamicContext<N>,
) -> Result<Sequence<N>, Error> {
    if target.is_abstract() || !target.is_atomic() {
        return Err(Error::from_code(ErrorCode::XPST0080, format!("{target} is not a valid cast target")));
    }
    let input = atomize(&eval(operand, ctx)?, ctx);
    Ok(Sequence::deferred(move || {
        let values = ready!(input.get_all_values()?);
        let castable = match values.as_slice() {
            [] => allow_empty,
            [Value::Atomic(atom)] => cast_atomic(atom, target).is_ok(),
            _ => false,
        };
        Ok(Fetch::Ready(Sequence::singleton(Value::boolean(castable))))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(AtomicValue::String("42".into()), TypeName::Integer, AtomicValue::Integer(42))]
    #[case(AtomicValue::String(" 1.50 ".into()), TypeName::Decimal, AtomicValue::Decimal(Decimal::new(15, 1)))]
    #[case(AtomicValue::UntypedAtomic("-INF".into()), TypeName::Double, AtomicValue::Double(f64::NEG_INFINITY))]
    #[case(AtomicValue::String("1".into()), TypeName::Boolean, AtomicValue::Boolean(true))]
    #[case(AtomicValue::Double(3.99), TypeName::Integer, AtomicValue::Integer(3))]
    #[case(AtomicValue::Integer(0), TypeName::Boolean, AtomicValue::Boolean(false))]
    #[case(AtomicValue::Boolean(true), TypeName::Double, AtomicValue::Double(1.0))]
    #[case(AtomicValue::String("P1Y2M".into()), TypeName::YearMonthDuration, AtomicValue::YearMonthDuration(14))]
    #[case(AtomicValue::String("-PT1M30S".into()), TypeName::DayTimeDuration, AtomicValue::DayTimeDuration(-90))]
    #[case(AtomicValue::Integer(5), TypeName::String, AtomicValue::String("5".into()))]
    fn casts(#[case] input: AtomicValue, #[case] target: TypeName, #[case] expected: AtomicValue) {
        assert_eq!(cast_atomic(&input, target).unwrap(), expected);
    }

    #[rstest]
    #[case(AtomicValue::String("fortytwo".into()), TypeName::Integer)]
    #[case(AtomicValue::String("fortytwo".into()), TypeName::Double)]
    #[case(AtomicValue::String("1e3".into()), TypeName::Decimal)]
    #[case(AtomicValue::String("P1D".into()), TypeName::YearMonthDuration)]
    #[case(AtomicValue::String("PT".into()), TypeName::Duration)]
    #[case(AtomicValue::String("2024-13-01".into()), TypeName::Date)]
    fn invalid_lexical_forms(#[case] input: AtomicValue, #[case] target: TypeName) {
        assert_eq!(cast_atomic(&input, target).unwrap_err().code_enum(), ErrorCode::FORG0001);
    }

    #[rstest]
    fn incompatible_types_are_type_errors() {
        let err = cast_atomic(&AtomicValue::Boolean(true), TypeName::Date).unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::XPTY0004);
    }

    #[rstest]
    fn abstract_targets_are_rejected() {
        let err = cast_atomic(&AtomicValue::Integer(1), TypeName::Numeric).unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::XPST0080);
    }

    #[rstest]
    #[case(AtomicValue::String("2024-02-29T10:15:00.5+02:00".into()), TypeName::DateTime)]
    #[case(AtomicValue::Double(1.5), TypeName::Decimal)]
    #[case(AtomicValue::String("PT2H".into()), TypeName::DayTimeDuration)]
    #[case(AtomicValue::Integer(7), TypeName::Float)]
    fn same_type_casts_are_idempotent(#[case] input: AtomicValue, #[case] target: TypeName) {
        let once = cast_atomic(&input, target).unwrap();
        assert_eq!(cast_atomic(&once, target).unwrap(), once);
    }

    #[rstest]
    fn date_time_with_timezone_round_trips_its_lexical_form() {
        let parsed = cast_atomic(&AtomicValue::String("2024-02-29T10:15:00Z".into()), TypeName::DateTime).unwrap();
        assert_eq!(parsed.lexical(), "2024-02-29T10:15:00Z");
    }
}

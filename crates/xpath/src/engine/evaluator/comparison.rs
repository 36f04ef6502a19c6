//! Value, general and node comparisons.

use core::cmp::Ordering;

use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};

use crate::engine::runtime::{DynamicContext, Error, ErrorCode};
use crate::engine::selector::{Child, CompareKind, ComparisonOp, NodeComparison};
use crate::ready;
use crate::xdm::{AtomicValue, Fetch, NodeHandle, Sequence, Value};

use super::casting::{atomize, cast_atomic, parse_double};
use super::numeric::{NumKind, unify_numeric};
use super::{eval, singleton_atomic};

fn incomparable(a: &AtomicValue, b: &AtomicValue) -> Error {
    Error::from_code(ErrorCode::XPTY0004, format!("cannot compare {} with {}", a.type_name(), b.type_name()))
}

fn is_string_like(a: &AtomicValue) -> bool {
    matches!(a, AtomicValue::String(_) | AtomicValue::AnyUri(_) | AtomicValue::UntypedAtomic(_))
}

/// Moment on the UTC timeline, for values of one temporal type.
fn instant(value: &AtomicValue, implicit: FixedOffset) -> Option<NaiveDateTime> {
    let (local, tz) = match value {
        AtomicValue::DateTime { value, tz } => (*value, *tz),
        AtomicValue::Date { date, tz } => (date.and_time(NaiveTime::MIN), *tz),
        AtomicValue::Time { time, tz } => (NaiveDate::from_ymd_opt(1972, 12, 31)?.and_time(*time), *tz),
        _ => return None,
    };
    let offset = tz.unwrap_or(implicit).local_minus_utc();
    local.checked_sub_signed(TimeDelta::try_seconds(i64::from(offset))?)
}

/// Total order between two atomic values of comparable types. `None` when a NaN is involved.
pub(crate) fn ordering(a: &AtomicValue, b: &AtomicValue, implicit: FixedOffset) -> Result<Option<Ordering>, Error> {
    if let (Some(x), Some(y)) = (NumKind::classify(a), NumKind::classify(b)) {
        return Ok(match unify_numeric(x, y) {
            (NumKind::Int(x), NumKind::Int(y)) => Some(x.cmp(&y)),
            (NumKind::Dec(x), NumKind::Dec(y)) => Some(x.cmp(&y)),
            (x, y) => x.to_f64().partial_cmp(&y.to_f64()),
        });
    }
    if is_string_like(a) && is_string_like(b) {
        return Ok(Some(a.lexical().cmp(&b.lexical())));
    }
    Ok(Some(match (a, b) {
        (AtomicValue::Boolean(x), AtomicValue::Boolean(y)) => x.cmp(y),
        (AtomicValue::YearMonthDuration(x), AtomicValue::YearMonthDuration(y)) => x.cmp(y),
        (AtomicValue::DayTimeDuration(x), AtomicValue::DayTimeDuration(y)) => x.cmp(y),
        (AtomicValue::DateTime { .. }, AtomicValue::DateTime { .. })
        | (AtomicValue::Date { .. }, AtomicValue::Date { .. })
        | (AtomicValue::Time { .. }, AtomicValue::Time { .. }) => {
            match (instant(a, implicit), instant(b, implicit)) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => return Err(incomparable(a, b)),
            }
        }
        _ => return Err(incomparable(a, b)),
    }))
}

fn duration_parts(a: &AtomicValue) -> Option<(i32, i64)> {
    match a {
        AtomicValue::Duration { months, seconds } => Some((*months, *seconds)),
        AtomicValue::YearMonthDuration(months) => Some((*months, 0)),
        AtomicValue::DayTimeDuration(seconds) => Some((0, *seconds)),
        _ => None,
    }
}

/// Value comparison of two atomics. Untyped values compare as strings.
pub(crate) fn value_compare(op: ComparisonOp, a: &AtomicValue, b: &AtomicValue, implicit: FixedOffset) -> Result<bool, Error> {
    if matches!(op, ComparisonOp::Eq | ComparisonOp::Ne) {
        let equal = match (a, b) {
            (AtomicValue::QName { ns_uri: ns_a, local: local_a, .. }, AtomicValue::QName { ns_uri: ns_b, local: local_b, .. }) => {
                Some(ns_a == ns_b && local_a == local_b)
            }
            _ => match (duration_parts(a), duration_parts(b)) {
                (Some(x), Some(y)) => Some(x == y),
                _ => None,
            },
        };
        if let Some(equal) = equal {
            return Ok(equal == (op == ComparisonOp::Eq));
        }
    }
    Ok(match ordering(a, b, implicit)? {
        Some(order) => op.holds(order),
        None => op == ComparisonOp::Ne,
    })
}

/// Equality used by `distinct-values` and `index-of`: incomparable values are simply unequal and
/// NaN equals NaN.
pub(crate) fn atomic_equal(a: &AtomicValue, b: &AtomicValue, implicit: FixedOffset) -> bool {
    if a.is_nan() && b.is_nan() {
        return true;
    }
    value_compare(ComparisonOp::Eq, a, b, implicit).unwrap_or(false)
}

/// One pair of a general comparison; untyped operands adopt the other side's type.
fn general_pair(op: ComparisonOp, a: &AtomicValue, b: &AtomicValue, implicit: FixedOffset) -> Result<bool, Error> {
    let adopt = |untyped: &str, other: &AtomicValue| -> Result<AtomicValue, Error> {
        if other.is_numeric() {
            parse_double(untyped).map(AtomicValue::Double)
        } else if is_string_like(other) {
            Ok(AtomicValue::String(untyped.to_string()))
        } else {
            cast_atomic(&AtomicValue::UntypedAtomic(untyped.to_string()), other.type_name())
        }
    };
    match (a, b) {
        (AtomicValue::UntypedAtomic(_), AtomicValue::UntypedAtomic(_)) => value_compare(op, a, b, implicit),
        (AtomicValue::UntypedAtomic(s), other) => value_compare(op, &adopt(s, other)?, other, implicit),
        (other, AtomicValue::UntypedAtomic(s)) => value_compare(op, other, &adopt(s, other)?, implicit),
        _ => value_compare(op, a, b, implicit),
    }
}

pub(crate) fn general_compare<N>(op: ComparisonOp, lhs: &[Value<N>], rhs: &[Value<N>], implicit: FixedOffset) -> Result<bool, Error> {
    for a in lhs.iter().filter_map(Value::as_atomic) {
        for b in rhs.iter().filter_map(Value::as_atomic) {
            if general_pair(op, a, b, implicit)? {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

pub(super) fn compare_expr<N: NodeHandle>(kind: CompareKind, lhs: &Child, rhs: &Child, ctx: &DynamicContext<N>) -> Result<Sequence<N>, Error> {
    let implicit = ctx.implicit_timezone();
    let (left, right) = match kind {
        CompareKind::Node(_) => (eval(lhs, ctx)?, eval(rhs, ctx)?),
        _ => (atomize(&eval(lhs, ctx)?, ctx), atomize(&eval(rhs, ctx)?, ctx)),
    };
    let facade = std::sync::Arc::clone(&ctx.dom_facade);
    Ok(Sequence::deferred(move || {
        let a = ready!(left.get_all_values()?);
        let b = ready!(right.get_all_values()?);
        let verdict = match kind {
            CompareKind::General(op) => general_compare(op, &a, &b, implicit)?,
            CompareKind::Value(op) => {
                let (Some(x), Some(y)) = (singleton_atomic(a, "value comparison")?, singleton_atomic(b, "value comparison")?)
                else {
                    return Ok(Fetch::Ready(Sequence::empty()));
                };
                let untyped_to_string = |v: AtomicValue| match v {
                    AtomicValue::UntypedAtomic(s) => AtomicValue::String(s),
                    other => other,
                };
                value_compare(op, &untyped_to_string(x), &untyped_to_string(y), implicit)?
            }
            CompareKind::Node(op) => {
                let (Some(x), Some(y)) = (single_node(a)?, single_node(b)?) else {
                    return Ok(Fetch::Ready(Sequence::empty()));
                };
                match op {
                    NodeComparison::Is => x == y,
                    NodeComparison::Precedes => facade.compare_document_order(&x, &y)?.is_lt(),
                    NodeComparison::Follows => facade.compare_document_order(&x, &y)?.is_gt(),
                }
            }
        };
        Ok(Fetch::Ready(Sequence::singleton(Value::boolean(verdict))))
    }))
}

fn single_node<N>(values: Vec<Value<N>>) -> Result<Option<N>, Error> {
    let mut values = values.into_iter();
    match (values.next(), values.next()) {
        (None, _) => Ok(None),
        (Some(Value::Node(node)), None) => Ok(Some(node.handle)),
        _ => Err(Error::from_code(ErrorCode::XPTY0004, "node comparison requires single nodes")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    #[rstest]
    #[case(ComparisonOp::Eq, AtomicValue::Integer(1), AtomicValue::Double(1.0), true)]
    #[case(ComparisonOp::Lt, AtomicValue::String("a".into()), AtomicValue::String("b".into()), true)]
    #[case(ComparisonOp::Ne, AtomicValue::Double(f64::NAN), AtomicValue::Double(f64::NAN), true)]
    #[case(ComparisonOp::Eq, AtomicValue::Double(f64::NAN), AtomicValue::Double(f64::NAN), false)]
    #[case(ComparisonOp::Eq, AtomicValue::YearMonthDuration(12), AtomicValue::Duration { months: 12, seconds: 0 }, true)]
    fn value_comparisons(#[case] op: ComparisonOp, #[case] a: AtomicValue, #[case] b: AtomicValue, #[case] expected: bool) {
        assert_eq!(value_compare(op, &a, &b, utc()).unwrap(), expected);
    }

    #[rstest]
    fn strings_and_numbers_do_not_compare() {
        let err = value_compare(ComparisonOp::Eq, &AtomicValue::String("1".into()), &AtomicValue::Integer(1), utc()).unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::XPTY0004);
    }

    #[rstest]
    fn untyped_adopts_numeric_type_in_general_comparison() {
        let lhs: Vec<Value<()>> = vec![Value::untyped("10")];
        let rhs: Vec<Value<()>> = vec![Value::integer(9)];
        assert!(general_compare(ComparisonOp::Gt, &lhs, &rhs, utc()).unwrap());
    }

    #[rstest]
    fn date_times_compare_on_the_utc_timeline() {
        let parse = |s: &str| cast_atomic(&AtomicValue::String(s.into()), crate::xdm::TypeName::DateTime).unwrap();
        let a = parse("2024-01-01T12:00:00+02:00");
        let b = parse("2024-01-01T11:00:00Z");
        assert!(value_compare(ComparisonOp::Lt, &a, &b, utc()).unwrap());
    }
}

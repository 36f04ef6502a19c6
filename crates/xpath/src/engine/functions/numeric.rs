use core::cmp::Ordering;

use rust_decimal::Decimal;

use crate::engine::evaluator::casting::{atomize_item, cast_atomic, parse_double};
use crate::engine::evaluator::comparison::ordering;
use crate::engine::evaluator::numeric::{NumKind, arithmetic, promote_to_common_type, round_half_up};
use crate::engine::runtime::{DynamicContext, Error, ErrorCode};
use crate::engine::selector::ArithmeticOp;
use crate::xdm::{AtomicValue, NodeHandle, Sequence, TypeName};

use super::{atomic, atoms, count_as_integer, opt_atom, optional};

/// Untyped values take part in aggregates as doubles.
fn untyped_as_double(values: Vec<AtomicValue>) -> Result<Vec<AtomicValue>, Error> {
    values
        .into_iter()
        .map(|v| match v {
            AtomicValue::UntypedAtomic(s) => parse_double(&s).map(AtomicValue::Double),
            other => Ok(other),
        })
        .collect()
}

fn not_summable(values: &[AtomicValue]) -> Error {
    let types = values.iter().map(|v| v.type_name().to_string()).collect::<Vec<_>>().join(", ");
    Error::from_code(ErrorCode::FORG0006, format!("cannot sum or average ({types})"))
}

/// Sum of numbers or of durations of one kind. `None` for an empty input.
fn total(values: &[AtomicValue]) -> Result<Option<AtomicValue>, Error> {
    let Some(first) = values.first() else { return Ok(None) };
    match first {
        AtomicValue::YearMonthDuration(_) => {
            let mut months: i32 = 0;
            for v in values {
                let AtomicValue::YearMonthDuration(m) = v else { return Err(not_summable(values)) };
                months = months.checked_add(*m).ok_or_else(overflow)?;
            }
            Ok(Some(AtomicValue::YearMonthDuration(months)))
        }
        AtomicValue::DayTimeDuration(_) => {
            let mut seconds: i64 = 0;
            for v in values {
                let AtomicValue::DayTimeDuration(s) = v else { return Err(not_summable(values)) };
                seconds = seconds.checked_add(*s).ok_or_else(overflow)?;
            }
            Ok(Some(AtomicValue::DayTimeDuration(seconds)))
        }
        _ => {
            if !values.iter().all(AtomicValue::is_numeric) {
                return Err(not_summable(values));
            }
            let mut numbers = promote_to_common_type(values.to_vec())?.into_iter().filter_map(|v| NumKind::classify(&v));
            let Some(mut acc) = numbers.next() else { return Ok(None) };
            for n in numbers {
                let sum = arithmetic(ArithmeticOp::Add, acc, n)?;
                acc = NumKind::classify(&sum).ok_or_else(overflow)?;
            }
            Ok(Some(acc.into_atomic()))
        }
    }
}

fn overflow() -> Error {
    Error::from_code(ErrorCode::FOAR0002, "overflow while aggregating")
}

pub(super) fn sum_fn<N: NodeHandle>(_ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    let values = untyped_as_double(atoms(&args[0])?)?;
    match total(&values)? {
        Some(sum) => atomic(sum),
        None if args.len() > 1 => optional(opt_atom(&args[1])?),
        None => atomic(AtomicValue::Integer(0)),
    }
}

/// Validation happens after untyped values were cast: the input must then be all numeric or all
/// durations of one kind.
pub(super) fn avg_fn<N: NodeHandle>(_ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    let values = untyped_as_double(atoms(&args[0])?)?;
    let count = count_as_integer(values.len());
    let Some(sum) = total(&values)? else { return optional(None) };
    let average = match sum {
        AtomicValue::YearMonthDuration(m) => {
            #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
            let months = (f64::from(m) / values.len() as f64).round() as i32;
            AtomicValue::YearMonthDuration(months)
        }
        AtomicValue::DayTimeDuration(s) => AtomicValue::DayTimeDuration(s / count),
        number => {
            let number = NumKind::classify(&number).ok_or_else(overflow)?;
            arithmetic(ArithmeticOp::Div, number, NumKind::Int(count))?
        }
    };
    atomic(average)
}

fn extreme<N: NodeHandle>(ctx: &DynamicContext<N>, args: &[Sequence<N>], wanted: Ordering) -> Result<Sequence<N>, Error> {
    let values = untyped_as_double(atoms(&args[0])?)?;
    if values.is_empty() {
        return optional(None);
    }
    // NaN wins before any type promotion can fail.
    if values.iter().any(AtomicValue::is_nan) {
        return atomic(AtomicValue::Double(f64::NAN));
    }
    let values = promote_to_common_type(values)?;
    let implicit = ctx.implicit_timezone();
    let mut best: Option<AtomicValue> = None;
    for value in values {
        best = Some(match best {
            None => {
                // A lone value still has to be orderable.
                ordering(&value, &value, implicit).map_err(|e| incomparable(&e))?;
                value
            }
            Some(current) => match ordering(&value, &current, implicit).map_err(|e| incomparable(&e))? {
                Some(order) if order == wanted => value,
                _ => current,
            },
        });
    }
    optional(best)
}

fn incomparable(cause: &Error) -> Error {
    Error::from_code(ErrorCode::FORG0006, format!("values have no total order: {}", cause.message))
}

pub(super) fn min_fn<N: NodeHandle>(ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    extreme(ctx, args, Ordering::Less)
}

pub(super) fn max_fn<N: NodeHandle>(ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    extreme(ctx, args, Ordering::Greater)
}

fn numeric_arg<N: NodeHandle>(arg: &Sequence<N>) -> Result<Option<NumKind>, Error> {
    Ok(opt_atom(arg)?.as_ref().and_then(NumKind::classify))
}

pub(super) fn abs_fn<N: NodeHandle>(_ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    let result = match numeric_arg(&args[0])? {
        None => None,
        Some(NumKind::Int(i)) => Some(AtomicValue::Integer(i.checked_abs().ok_or_else(overflow)?)),
        Some(NumKind::Dec(d)) => Some(AtomicValue::Decimal(d.abs())),
        Some(NumKind::Float(f)) => Some(AtomicValue::Float(f.abs())),
        Some(NumKind::Double(d)) => Some(AtomicValue::Double(d.abs())),
    };
    optional(result)
}

fn rounding<N: NodeHandle>(arg: &Sequence<N>, dec: fn(Decimal) -> Decimal, float: fn(f64) -> f64) -> Result<Sequence<N>, Error> {
    let result = match numeric_arg(arg)? {
        None => None,
        Some(NumKind::Int(i)) => Some(AtomicValue::Integer(i)),
        Some(NumKind::Dec(d)) => Some(AtomicValue::Decimal(dec(d))),
        #[allow(clippy::cast_possible_truncation)]
        Some(NumKind::Float(f)) => Some(AtomicValue::Float(float(f64::from(f)) as f32)),
        Some(NumKind::Double(d)) => Some(AtomicValue::Double(float(d))),
    };
    optional(result)
}

pub(super) fn floor_fn<N: NodeHandle>(_ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    rounding(&args[0], |d| d.floor(), f64::floor)
}

pub(super) fn ceiling_fn<N: NodeHandle>(_ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    rounding(&args[0], |d| d.ceil(), f64::ceil)
}

pub(super) fn round_fn<N: NodeHandle>(_ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    optional(numeric_arg(&args[0])?.map(round_half_up).transpose()?)
}

/// `xs:double` value of the argument or the context item; NaN when it does not convert.
pub(super) fn number_fn<N: NodeHandle>(ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    let value = match args.first() {
        Some(arg) => opt_atom(arg)?,
        None => atomize_item(ctx.context_item()?, ctx.dom_facade.as_ref())?.into_iter().next(),
    };
    let number = match value.map(|v| cast_atomic(&v, TypeName::Double)) {
        Some(Ok(AtomicValue::Double(d))) => d,
        _ => f64::NAN,
    };
    atomic(AtomicValue::Double(number))
}

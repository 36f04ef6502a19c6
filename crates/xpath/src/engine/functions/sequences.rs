use crate::engine::evaluator::casting::atomize;
use crate::engine::evaluator::comparison::{atomic_equal, value_compare};
use crate::engine::runtime::{DynamicContext, Error, ErrorCode};
use crate::engine::selector::ComparisonOp;
use crate::ready;
use crate::xdm::{AtomicValue, Fetch, NodeHandle, Sequence, Value};

use super::{atoms, count_as_integer, double_arg, integer_arg, opt_atom};

pub(super) fn empty_fn<N: NodeHandle>(_ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    let arg = args[0].clone();
    Ok(Sequence::deferred(move || Ok(Fetch::Ready(Sequence::singleton(Value::boolean(ready!(arg.is_empty()?)))))))
}

pub(super) fn exists_fn<N: NodeHandle>(_ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    let arg = args[0].clone();
    Ok(Sequence::deferred(move || Ok(Fetch::Ready(Sequence::singleton(Value::boolean(!ready!(arg.is_empty()?)))))))
}

pub(super) fn count_fn<N: NodeHandle>(_ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    Ok(args[0].map_all(|values| Ok(Sequence::singleton(Value::integer(count_as_integer(values.len()))))))
}

pub(super) fn head_fn<N: NodeHandle>(_ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    Ok(args[0].head())
}

pub(super) fn tail_fn<N: NodeHandle>(_ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    Ok(args[0].tail())
}

pub(super) fn insert_before_fn<N: NodeHandle>(_ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    Ok(args[0].insert_before(integer_arg(&args[1])?, &args[2]))
}

pub(super) fn remove_fn<N: NodeHandle>(_ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    Ok(args[0].remove(integer_arg(&args[1])?))
}

pub(super) fn reverse_fn<N: NodeHandle>(_ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    Ok(args[0].reverse())
}

pub(super) fn subsequence_fn<N: NodeHandle>(_ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    let start = double_arg(&args[1])?;
    let length = args.get(2).map(double_arg).transpose()?;
    Ok(args[0].subsequence(start, length))
}

fn check_cardinality<N: NodeHandle>(
    arg: &Sequence<N>,
    allowed: fn(usize) -> bool,
    code: ErrorCode,
    message: &'static str,
) -> Sequence<N> {
    arg.map_all(move |values| {
        if allowed(values.len()) {
            Ok(Sequence::from_values(values))
        } else {
            Err(Error::from_code(code, format!("{message}, found {} items", values.len())))
        }
    })
}

pub(super) fn exactly_one_fn<N: NodeHandle>(_ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    Ok(check_cardinality(&args[0], |n| n == 1, ErrorCode::FORG0005, "exactly-one requires a single item"))
}

pub(super) fn zero_or_one_fn<N: NodeHandle>(_ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    Ok(check_cardinality(&args[0], |n| n <= 1, ErrorCode::FORG0003, "zero-or-one requires at most one item"))
}

pub(super) fn one_or_more_fn<N: NodeHandle>(_ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    Ok(check_cardinality(&args[0], |n| n >= 1, ErrorCode::FORG0004, "one-or-more requires at least one item"))
}

pub(super) fn data_fn<N: NodeHandle>(ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    Ok(atomize(&args[0], ctx))
}

/// First occurrence wins. Untyped values compare as strings.
pub(super) fn distinct_values_fn<N: NodeHandle>(ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    let implicit = ctx.implicit_timezone();
    let mut kept: Vec<AtomicValue> = Vec::new();
    for value in atoms(&args[0])? {
        let value = as_string_if_untyped(value);
        if !kept.iter().any(|k| atomic_equal(k, &value, implicit)) {
            kept.push(value);
        }
    }
    Ok(Sequence::from_values(kept.into_iter().map(Value::Atomic).collect()))
}

pub(super) fn index_of_fn<N: NodeHandle>(ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    let implicit = ctx.implicit_timezone();
    let Some(search) = opt_atom(&args[1])?.map(as_string_if_untyped) else { return Ok(Sequence::empty()) };
    let positions = atoms(&args[0])?
        .into_iter()
        .enumerate()
        .filter(|(_, v)| value_compare(ComparisonOp::Eq, &as_string_if_untyped(v.clone()), &search, implicit).unwrap_or(false))
        .map(|(i, _)| Value::integer(count_as_integer(i + 1)))
        .collect();
    Ok(Sequence::from_values(positions))
}

fn as_string_if_untyped(value: AtomicValue) -> AtomicValue {
    match value {
        AtomicValue::UntypedAtomic(s) => AtomicValue::String(s),
        other => other,
    }
}

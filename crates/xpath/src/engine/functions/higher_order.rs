use std::sync::Arc;

use crate::engine::evaluator::calls::invoke;
use crate::engine::runtime::{DynamicContext, Error, ErrorCode};
use crate::ready;
use crate::xdm::{AtomicValue, ExpandedName, Fetch, FunctionItem, NodeHandle, Sequence, SequenceType, Value};

use super::{atoms, converted, count_as_integer, integer_arg, integer_result, optional};

fn function_arg<N: NodeHandle>(arg: &Sequence<N>) -> Result<FunctionItem<N>, Error> {
    match converted(arg)?.into_iter().next() {
        Some(Value::Function(f)) => Ok(f),
        _ => Err(Error::from_code(ErrorCode::XPTY0004, "expected a function item")),
    }
}

/// A function item that must accept exactly one argument.
fn unary<N: NodeHandle>(arg: &Sequence<N>, caller: &str) -> Result<(FunctionItem<N>, Vec<SequenceType>), Error> {
    let function = function_arg(arg)?;
    let params = function.param_types_for(1).ok_or_else(|| {
        Error::from_code(
            ErrorCode::XPTY0004,
            format!("{caller} needs a function of one argument, got {}", function.display_name()),
        )
    })?;
    Ok((function, params))
}

fn apply<N: NodeHandle>(function: &FunctionItem<N>, params: &[SequenceType], item: Value<N>, ctx: &DynamicContext<N>) -> Sequence<N> {
    invoke(
        Arc::clone(&function.implementation),
        function.display_name(),
        params.to_vec(),
        vec![Sequence::singleton(item)],
        ctx.clone(),
    )
}

pub(super) fn function_arity_fn<N: NodeHandle>(_ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    integer_result(count_as_integer(function_arg(&args[0])?.arity))
}

pub(super) fn function_name_fn<N: NodeHandle>(_ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    let name = function_arg(&args[0])?.name.map(|name| AtomicValue::QName {
        ns_uri: name.ns_uri,
        prefix: None,
        local: name.local,
    });
    optional(name)
}

pub(super) fn for_each_fn<N: NodeHandle>(ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    let (function, params) = unary(&args[1], "for-each")?;
    let ctx = ctx.clone();
    Ok(args[0].flat_map(move |item, _| Ok(apply(&function, &params, item, &ctx))))
}

pub(super) fn filter_fn<N: NodeHandle>(ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    let (function, params) = unary(&args[1], "filter")?;
    let ctx = ctx.clone();
    Ok(args[0].flat_map(move |item, _| {
        let verdict = apply(&function, &params, item.clone(), &ctx);
        Ok(Sequence::deferred(move || match ready!(verdict.get_all_values()?).as_slice() {
            [Value::Atomic(AtomicValue::Boolean(true))] => Ok(Fetch::Ready(Sequence::singleton(item.clone()))),
            [Value::Atomic(AtomicValue::Boolean(false))] => Ok(Fetch::Ready(Sequence::empty())),
            _ => Err(Error::from_code(ErrorCode::XPTY0004, "filter predicate must return a single xs:boolean")),
        }))
    }))
}

/// The function registered under (name, arity), or the empty sequence.
pub(super) fn function_lookup_fn<N: NodeHandle>(ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    let Some(AtomicValue::QName { ns_uri, local, .. }) = atoms(&args[0])?.into_iter().next() else {
        return Err(Error::from_code(ErrorCode::XPTY0004, "function-lookup expects an xs:QName"));
    };
    let arity = usize::try_from(integer_arg(&args[1])?).unwrap_or(usize::MAX);
    let found = ctx
        .functions
        .resolve(&ExpandedName::new(ns_uri, local), arity)
        .ok()
        .and_then(|declaration| declaration.to_function_item(arity));
    Ok(found.map_or_else(Sequence::empty, |f| Sequence::singleton(Value::Function(f))))
}

//! Static calls, named function references and dynamic calls.

use crate::engine::runtime::{DynamicContext, Error, ErrorCode};
use crate::engine::selector::Child;
use crate::ready;
use crate::xdm::{ExpandedName, Fetch, FunctionImpl, NodeHandle, Sequence, SequenceType, Value};

use super::eval;
use super::type_check::convert_argument;

/// Converts every argument, then calls `implementation` once with the converted sequences.
///
/// Each argument is converted at most once, so a call whose arguments suspend resumes where it stopped.
pub(crate) fn invoke<N: NodeHandle>(
    implementation: FunctionImpl<N>,
    label: String,
    params: Vec<SequenceType>,
    arguments: Vec<Sequence<N>>,
    ctx: DynamicContext<N>,
) -> Sequence<N> {
    let mut converted: Vec<Option<Sequence<N>>> = vec![None; arguments.len()];
    Sequence::deferred(move || {
        for (position, (argument, expected)) in arguments.iter().zip(&params).enumerate() {
            if converted[position].is_none() {
                converted[position] = Some(ready!(convert_argument(argument, expected, &ctx, &label, position)?));
            }
        }
        let ready_arguments: Vec<Sequence<N>> = converted.iter().flatten().cloned().collect();
        implementation(&ctx, &ready_arguments).map(Fetch::Ready)
    })
}

fn evaluate_arguments<N: NodeHandle>(args: &[Child], ctx: &DynamicContext<N>) -> Result<Vec<Sequence<N>>, Error> {
    args.iter().map(|arg| eval(arg, ctx)).collect()
}

pub(super) fn static_call<N: NodeHandle>(name: &ExpandedName, args: &[Child], ctx: &DynamicContext<N>) -> Result<Sequence<N>, Error> {
    let declaration = ctx.functions.resolve(name, args.len())?;
    let params = declaration.param_types(args.len()).ok_or_else(|| {
        Error::from_code(ErrorCode::XPST0017, format!("{name} cannot take {} arguments", args.len()))
    })?;
    let arguments = evaluate_arguments(args, ctx)?;
    let label = format!("{}#{}", declaration.name, args.len());
    Ok(invoke(std::sync::Arc::clone(&declaration.implementation), label, params, arguments, ctx.clone()))
}

pub(super) fn named_function_ref<N: NodeHandle>(name: &ExpandedName, arity: usize, ctx: &DynamicContext<N>) -> Result<Sequence<N>, Error> {
    let declaration = ctx.functions.resolve(name, arity)?;
    let item = declaration.to_function_item(arity).ok_or_else(|| {
        Error::from_code(ErrorCode::XPST0017, format!("{name} has no signature with arity {arity}"))
    })?;
    Ok(Sequence::singleton(Value::Function(item)))
}

pub(super) fn dynamic_call<N: NodeHandle>(base: &Child, args: &[Child], ctx: &DynamicContext<N>) -> Result<Sequence<N>, Error> {
    let callee = eval(base, ctx)?;
    let arguments = evaluate_arguments(args, ctx)?;
    let ctx = ctx.clone();
    Ok(Sequence::deferred(move || {
        let values = ready!(callee.get_all_values()?);
        let function = match values.as_slice() {
            [Value::Function(function)] => function.clone(),
            [] => return Err(Error::from_code(ErrorCode::XPTY0004, "dynamic call on an empty sequence")),
            [other] => {
                return Err(Error::from_code(
                    ErrorCode::XPTY0004,
                    format!("dynamic call on {}, which is not a function", other.type_name()),
                ));
            }
            _ => return Err(Error::from_code(ErrorCode::XPTY0004, "dynamic call on a sequence of several items")),
        };
        let params = function.param_types_for(arguments.len()).ok_or_else(|| {
            Error::from_code(
                ErrorCode::XPTY0004,
                format!(
                    "{} called with {} argument{}",
                    function.display_name(),
                    arguments.len(),
                    if arguments.len() == 1 { "" } else { "s" }
                ),
            )
        })?;
        tracing::trace!(function = %function.display_name(), "dynamic call");
        Ok(Fetch::Ready(invoke(
            std::sync::Arc::clone(&function.implementation),
            function.display_name(),
            params,
            arguments.clone(),
            ctx.clone(),
        )))
    }))
}

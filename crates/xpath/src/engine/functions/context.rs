use crate::engine::runtime::{DynamicContext, Error, ErrorCode};
use crate::model::QName;
use crate::ready;
use crate::xdm::{AtomicValue, Fetch, NodeHandle, NodeItem, Sequence, Value};

use super::{atomic, count_as_integer, integer_result, item_or_focus, string_result};

pub(super) fn position_fn<N: NodeHandle>(ctx: &DynamicContext<N>, _args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    ctx.context_item()?;
    integer_result(count_as_integer(ctx.context_item_index + 1))
}

/// Size of the context sequence, produced lazily since it may have to be pulled to the end.
pub(super) fn last_fn<N: NodeHandle>(ctx: &DynamicContext<N>, _args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    let focus = ctx
        .context_sequence
        .as_ref()
        .ok_or_else(|| Error::from_code(ErrorCode::XPDY0002, "last() requires a context sequence"))?;
    Ok(focus.map_all(|values| Ok(Sequence::singleton(Value::integer(count_as_integer(values.len()))))))
}

/// The node argument, or the context node for the zero-argument form.
fn node_or_focus<N: NodeHandle>(ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Option<NodeItem<N>>, Error> {
    match item_or_focus(ctx, args)? {
        None => Ok(None),
        Some(Value::Node(node)) => Ok(Some(node)),
        Some(other) => Err(Error::from_code(
            ErrorCode::XPTY0004,
            format!("expected a node, found {}", other.type_name()),
        )),
    }
}

fn node_name<N: NodeHandle>(ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Option<QName>, Error> {
    Ok(node_or_focus(ctx, args)?.and_then(|node| ctx.dom_facade.name(&node.handle)))
}

pub(super) fn name_fn<N: NodeHandle>(ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    string_result(node_name(ctx, args)?.map(|n| n.lexical()).unwrap_or_default())
}

pub(super) fn local_name_fn<N: NodeHandle>(ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    string_result(node_name(ctx, args)?.map(|n| n.local).unwrap_or_default())
}

pub(super) fn namespace_uri_fn<N: NodeHandle>(ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    let uri = node_name(ctx, args)?.and_then(|n| n.ns_uri).unwrap_or_default();
    atomic(AtomicValue::AnyUri(uri))
}

/// Climbs parent links through the facade; each step may suspend.
pub(super) fn root_fn<N: NodeHandle>(ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    let Some(start) = node_or_focus(ctx, args)? else { return Ok(Sequence::empty()) };
    let facade = std::sync::Arc::clone(&ctx.dom_facade);
    let mut current = start.handle;
    Ok(Sequence::deferred(move || {
        while let Some(parent) = ready!(facade.parent(&current)) {
            current = parent;
        }
        let kind = facade.kind(&current);
        Ok(Fetch::Ready(Sequence::singleton(Value::node(current.clone(), kind))))
    }))
}

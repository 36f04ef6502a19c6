//! Extension functions backed by injected capabilities.

use crate::engine::evaluator::casting::is_ncname;
use crate::engine::evaluator::eval;
use crate::engine::runtime::{DynamicContext, Error, ErrorCode};
use crate::model::{NodeKind, QName};
use crate::xdm::{NodeHandle, Sequence, Value};

use super::{converted, string_arg};

/// Compiles the argument with the context's selector compiler and evaluates it under the current focus.
pub(super) fn evaluate_fn<N: NodeHandle>(ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    let compiler = ctx
        .selector_compiler
        .as_ref()
        .ok_or_else(|| Error::from_code(ErrorCode::FOER0000, "no selector compiler is configured"))?;
    let source = string_arg(&args[0])?;
    let selector = compiler.compile(&source)?;
    tracing::trace!(source = %source, "evaluating compiled sub-selector");
    eval(&selector, ctx)
}

pub(super) fn create_text_fn<N: NodeHandle>(ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    let factory = ctx
        .nodes_factory
        .as_ref()
        .ok_or_else(|| Error::from_code(ErrorCode::FOER0000, "no node factory is configured"))?;
    let node = factory.create_text(&string_arg(&args[0])?)?;
    Ok(Sequence::singleton(Value::node(node, NodeKind::Text)))
}

/// `prefix:local` resolved against the context's namespace bindings.
fn element_name<N: NodeHandle>(lexical: &str, ctx: &DynamicContext<N>) -> Result<QName, Error> {
    let invalid = || Error::from_code(ErrorCode::FORG0001, format!("'{lexical}' is not a valid element name"));
    match lexical.split_once(':') {
        Some((prefix, local)) => {
            if !is_ncname(prefix) || !is_ncname(local) {
                return Err(invalid());
            }
            let uri = ctx.resolve_namespace_prefix(Some(prefix)).ok_or_else(|| {
                Error::from_code(ErrorCode::XPST0081, format!("namespace prefix '{prefix}' is not bound"))
            })?;
            Ok(QName::with_ns(Some(prefix), local, &uri))
        }
        None if is_ncname(lexical) => Ok(match ctx.resolve_namespace_prefix(None) {
            Some(uri) if !uri.is_empty() => QName::with_ns(None, lexical, &uri),
            _ => QName::local(lexical),
        }),
        None => Err(invalid()),
    }
}

/// New element named by the first argument. Nodes of the optional second argument become its
/// children, attribute nodes its attributes.
pub(super) fn create_element_fn<N: NodeHandle>(ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    let factory = ctx
        .nodes_factory
        .as_ref()
        .ok_or_else(|| Error::from_code(ErrorCode::FOER0000, "no node factory is configured"))?;
    let name = element_name(&string_arg(&args[0])?, ctx)?;
    let children = match args.get(1) {
        Some(arg) => converted(arg)?
            .into_iter()
            .filter_map(|v| match v {
                Value::Node(node) => Some(node.handle),
                _ => None,
            })
            .collect(),
        None => Vec::new(),
    };
    let element = factory.create_element(&name, children)?;
    Ok(Sequence::singleton(Value::node(element, NodeKind::Element)))
}

//! Node tests, pattern matching and document-order normalisation.

use core::cmp::Ordering;

use crate::engine::facade::DocumentFacade;
use crate::engine::runtime::{DynamicContext, Error, ErrorCode};
use crate::engine::selector::{Axis, NameTest, NamespaceTest, Selector};
use crate::model::NodeKind;
use crate::ready;
use crate::xdm::{Fetch, NodeHandle, NodeItem, Sequence, Value};

use super::eval;

/// Outcome of testing a candidate: pure node tests decide at once, other selectors produce a
/// sequence whose effective boolean value is the answer.
pub(crate) enum Check<N> {
    Decided(bool),
    Deferred(Sequence<N>),
}

pub(crate) fn is_node_test(selector: &Selector) -> bool {
    matches!(selector, Selector::NameTest(_) | Selector::KindTest(_) | Selector::UniversalWildcard)
}

pub(crate) fn begin_check<N: NodeHandle>(test: &Selector, node: &N, ctx: &DynamicContext<N>) -> Result<Check<N>, Error> {
    if is_node_test(test) {
        return test_node(test, node, ctx).map(Check::Decided);
    }
    let kind = ctx.dom_facade.kind(node);
    let focus = ctx.scope_with_focus(0, Value::node(node.clone(), kind), None);
    eval(test, &focus).map(Check::Deferred)
}

/// Applies a name, kind or wildcard test. Any other selector fails the test.
pub(crate) fn test_node<N: NodeHandle>(test: &Selector, node: &N, ctx: &DynamicContext<N>) -> Result<bool, Error> {
    let facade = ctx.dom_facade.as_ref();
    match test {
        Selector::UniversalWildcard => Ok(true),
        Selector::KindTest(kind) => Ok(facade.kind(node) == *kind),
        Selector::NameTest(name_test) => matches_name(name_test, node, facade, ctx),
        _ => Ok(false),
    }
}

fn matches_name<N: NodeHandle>(
    test: &NameTest,
    node: &N,
    facade: &dyn DocumentFacade<N>,
    ctx: &DynamicContext<N>,
) -> Result<bool, Error> {
    let kind = facade.kind(node);
    if !matches!(kind, NodeKind::Element | NodeKind::Attribute) {
        return Ok(false);
    }
    let Some(name) = facade.name(node) else { return Ok(false) };
    if let Some(local) = &test.local
        && *local != name.local
    {
        return Ok(false);
    }
    let wanted = match &test.namespace {
        NamespaceTest::Any => return Ok(true),
        NamespaceTest::Uri(uri) => uri.clone(),
        // Unprefixed attribute names are never in the default namespace.
        NamespaceTest::Prefix(None) if kind == NodeKind::Attribute => None,
        NamespaceTest::Prefix(None) => ctx.resolve_namespace_prefix(None),
        NamespaceTest::Prefix(Some(prefix)) => Some(ctx.resolve_namespace_prefix(Some(prefix)).ok_or_else(|| {
            Error::from_code(ErrorCode::XPST0081, format!("namespace prefix '{prefix}' is not bound"))
        })?),
    };
    Ok(non_empty(wanted.as_deref()) == non_empty(name.ns_uri.as_deref()))
}

fn non_empty(uri: Option<&str>) -> Option<&str> {
    uri.filter(|u| !u.is_empty())
}

/// Whether a node of `kind` can be reached at all over `axis`.
fn axis_admits(axis: Axis, kind: NodeKind) -> bool {
    match axis {
        Axis::Attribute => kind == NodeKind::Attribute,
        Axis::Child | Axis::Descendant | Axis::FollowingSibling | Axis::PrecedingSibling => {
            !matches!(kind, NodeKind::Attribute | NodeKind::Namespace | NodeKind::Document)
        }
        Axis::Parent | Axis::Ancestor => matches!(kind, NodeKind::Element | NodeKind::Document),
        Axis::SelfAxis | Axis::DescendantOrSelf | Axis::AncestorOrSelf => true,
    }
}

impl Selector {
    /// Tests `node` against this selector used as a pattern.
    ///
    /// Node tests, axis steps and boolean combinations of them are answered from the node alone.
    /// Anything else is evaluated with `node` as the focus and reduced to its effective boolean value.
    /// A `NotReady` answer means: resolve the pending and ask again.
    pub fn matches<N: NodeHandle>(&self, node: &N, ctx: &DynamicContext<N>) -> Result<Fetch<bool>, Error> {
        match self {
            Selector::AxisStep { axis, test } => {
                if !axis_admits(*axis, ctx.dom_facade.kind(node)) {
                    return Ok(Fetch::Ready(false));
                }
                test.matches(node, ctx)
            }
            Selector::And(children) => {
                for child in children {
                    if !ready!(child.matches(node, ctx)?) {
                        return Ok(Fetch::Ready(false));
                    }
                }
                Ok(Fetch::Ready(true))
            }
            Selector::Or(children) => {
                for child in children {
                    if ready!(child.matches(node, ctx)?) {
                        return Ok(Fetch::Ready(true));
                    }
                }
                Ok(Fetch::Ready(false))
            }
            _ => match begin_check(self, node, ctx)? {
                Check::Decided(verdict) => Ok(Fetch::Ready(verdict)),
                Check::Deferred(result) => result.effective_boolean_value(),
            },
        }
    }
}

/// Sorts node results into document order and drops duplicates.
///
/// Atomic results pass through unchanged. A mix of nodes and non-nodes is `err:XPTY0018` after the
/// last step of a path and `err:XPTY0019` before it.
pub(crate) fn into_document_order<N: NodeHandle>(values: Vec<Value<N>>, ctx: &DynamicContext<N>, last_step: bool) -> Result<Vec<Value<N>>, Error> {
    let node_count = values.iter().filter(|v| matches!(v, Value::Node(_))).count();
    if node_count == 0 {
        return Ok(values);
    }
    if node_count != values.len() {
        let (code, msg) = if last_step {
            (ErrorCode::XPTY0018, "the last step of a path returned both nodes and non-nodes")
        } else {
            (ErrorCode::XPTY0019, "an intermediate step of a path returned non-nodes")
        };
        return Err(Error::from_code(code, msg));
    }
    let mut nodes: Vec<NodeItem<N>> = values
        .into_iter()
        .filter_map(|v| match v {
            Value::Node(n) => Some(n),
            _ => None,
        })
        .collect();
    if nodes.len() > 1 {
        sort_nodes(&mut nodes, ctx.dom_facade.as_ref())?;
        nodes.dedup_by(|a, b| a.handle == b.handle);
        tracing::trace!(items = nodes.len(), "path step sorted into document order");
    }
    Ok(nodes.into_iter().map(Value::Node).collect())
}

pub(crate) fn sort_nodes<N: NodeHandle>(nodes: &mut [NodeItem<N>], facade: &dyn DocumentFacade<N>) -> Result<(), Error> {
    let mut failure: Option<Error> = None;
    nodes.sort_by(|a, b| {
        facade.compare_document_order(&a.handle, &b.handle).unwrap_or_else(|err| {
            failure.get_or_insert(err);
            Ordering::Equal
        })
    });
    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

//! Axis cursors: navigation through the document facade, one candidate per pull.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::engine::facade::DocumentFacade;
use crate::engine::runtime::{DynamicContext, Error};
use crate::engine::selector::{Axis, Bucket, Selector};
use crate::model::NodeKind;
use crate::ready;
use crate::xdm::{Fetch, NodeHandle, Sequence, SequenceCursor, Step, Value};

use super::node_ops::{Check, begin_check};

/// Streams the nodes on `axis` from `origin` that pass `test`.
///
/// Candidates come out in the axis' natural direction: reverse axes yield the nearest node first.
pub(crate) struct AxisCursor<N> {
    axis: Axis,
    origin: N,
    test: Arc<Selector>,
    bucket: Option<Bucket>,
    ctx: DynamicContext<N>,
    walk: Walk<N>,
    // Candidate whose test result is still being produced.
    checking: Option<(N, Sequence<N>)>,
}

enum Walk<N> {
    Start,
    /// Precomputed candidates: self, child, attribute, parent and sibling axes.
    Queue(VecDeque<N>),
    /// Pre-order traversal; `expand` is the last emitted node, whose children are fetched next.
    Descend { stack: Vec<VecDeque<N>>, expand: Option<N> },
    Climb { from: N, include_from: bool },
    /// Waiting for the children of the origin's parent.
    Siblings(N),
    Done,
}

impl<N: NodeHandle> AxisCursor<N> {
    pub(crate) fn new(axis: Axis, origin: N, test: Arc<Selector>, ctx: DynamicContext<N>) -> Self {
        let bucket = test.bucket();
        Self { axis, origin, test, bucket, ctx, walk: Walk::Start, checking: None }
    }

    fn emit(&self, node: N) -> Value<N> {
        let kind = self.ctx.dom_facade.kind(&node);
        Value::node(node, kind)
    }

    fn next_candidate(&mut self) -> Result<Step<N>, Error> {
        let facade = Arc::clone(&self.ctx.dom_facade);
        loop {
            let next = match &mut self.walk {
                Walk::Done => return Ok(Fetch::Ready(None)),
                Walk::Queue(queue) => return Ok(Fetch::Ready(queue.pop_front())),
                Walk::Start => ready!(start_walk(self.axis, &self.origin, self.bucket.as_ref(), facade.as_ref())),
                Walk::Descend { stack, expand } => {
                    if let Some(node) = expand.take() {
                        match facade.children(&node, None) {
                            Fetch::NotReady(pending) => {
                                *expand = Some(node);
                                return Ok(Fetch::NotReady(pending));
                            }
                            Fetch::Ready(children) if !children.is_empty() => stack.push(children.into()),
                            Fetch::Ready(_) => {}
                        }
                    }
                    while let Some(top) = stack.last_mut() {
                        if let Some(node) = top.pop_front() {
                            *expand = Some(node.clone());
                            return Ok(Fetch::Ready(Some(node)));
                        }
                        stack.pop();
                    }
                    Walk::Done
                }
                Walk::Climb { from, include_from } => {
                    if *include_from {
                        *include_from = false;
                        return Ok(Fetch::Ready(Some(from.clone())));
                    }
                    match ready!(facade.parent(from)) {
                        Some(parent) => {
                            *from = parent.clone();
                            return Ok(Fetch::Ready(Some(parent)));
                        }
                        None => Walk::Done,
                    }
                }
                Walk::Siblings(parent) => {
                    let children = ready!(facade.children(parent, None));
                    match children.iter().position(|c| *c == self.origin) {
                        Some(at) if self.axis == Axis::FollowingSibling => {
                            Walk::Queue(children[at + 1..].iter().cloned().collect())
                        }
                        Some(at) => Walk::Queue(children[..at].iter().rev().cloned().collect()),
                        None => Walk::Done,
                    }
                }
            };
            self.walk = next;
        }
    }
}

fn start_walk<N: NodeHandle>(
    axis: Axis,
    origin: &N,
    bucket: Option<&Bucket>,
    facade: &dyn DocumentFacade<N>,
) -> Fetch<Walk<N>> {
    match axis {
        Axis::SelfAxis => Fetch::Ready(Walk::Queue(VecDeque::from([origin.clone()]))),
        Axis::Child => facade.children(origin, bucket).map(|c| Walk::Queue(c.into())),
        Axis::Attribute => facade.attributes(origin, bucket).map(|a| Walk::Queue(a.into())),
        Axis::Parent => facade.parent(origin).map(|p| Walk::Queue(p.into_iter().collect())),
        Axis::Descendant => Fetch::Ready(Walk::Descend { stack: Vec::new(), expand: Some(origin.clone()) }),
        Axis::DescendantOrSelf => {
            Fetch::Ready(Walk::Descend { stack: vec![VecDeque::from([origin.clone()])], expand: None })
        }
        Axis::Ancestor => Fetch::Ready(Walk::Climb { from: origin.clone(), include_from: false }),
        Axis::AncestorOrSelf => Fetch::Ready(Walk::Climb { from: origin.clone(), include_from: true }),
        Axis::FollowingSibling | Axis::PrecedingSibling => {
            if matches!(facade.kind(origin), NodeKind::Attribute | NodeKind::Namespace) {
                return Fetch::Ready(Walk::Done);
            }
            facade.parent(origin).map(|p| p.map_or(Walk::Done, Walk::Siblings))
        }
    }
}

impl<N: NodeHandle> SequenceCursor<N> for AxisCursor<N> {
    fn next_item(&mut self) -> Result<Step<Value<N>>, Error> {
        loop {
            if let Some((node, verdict)) = self.checking.take() {
                match verdict.effective_boolean_value()? {
                    Fetch::NotReady(pending) => {
                        self.checking = Some((node, verdict));
                        return Ok(Fetch::NotReady(pending));
                    }
                    Fetch::Ready(true) => return Ok(Fetch::Ready(Some(self.emit(node)))),
                    Fetch::Ready(false) => continue,
                }
            }
            let Some(candidate) = ready!(self.next_candidate()?) else { return Ok(Fetch::Ready(None)) };
            match begin_check(&self.test, &candidate, &self.ctx)? {
                Check::Decided(true) => return Ok(Fetch::Ready(Some(self.emit(candidate)))),
                Check::Decided(false) => {}
                Check::Deferred(verdict) => self.checking = Some((candidate, verdict)),
            }
        }
    }
}

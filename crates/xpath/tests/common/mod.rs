#![allow(dead_code)]

use std::cmp::Ordering;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};

use xselect::engine::runtime::DynamicContextBuilder;
use xselect::model::simple::{SimpleNode, attr, doc, elem, text};
use xselect::{
    AtomicValue, Bucket, DocumentFacade, DynamicContext, Error, Fetch, NodeKind, NodeTreeFacade, Pending, QName,
    Selector, Sequence, Value, drive, evaluate,
};

pub type N = SimpleNode;

/// `<library>` with three books, each carrying `@id`, a `<title>` and a `<price>`.
pub fn library() -> SimpleNode {
    let book = |id: &str, title: &str, price: &str| {
        elem("book").attr(attr("id", id)).child(elem("title").child(text(title))).child(elem("price").child(text(price)))
    };
    doc()
        .child(
            elem("library")
                .child(book("b1", "Dune", "9.5"))
                .child(book("b2", "Emma", "4"))
                .child(book("b3", "Ulysses", "12.25")),
        )
        .build()
}

pub fn ctx_for(root: SimpleNode) -> DynamicContext<N> {
    DynamicContextBuilder::<N>::default().with_context_node(root).build()
}

/// Navigation that suspends once per request: the first ask hands out a pending, the ask after
/// its resolution answers.
#[derive(Default)]
pub struct DeferredFacade {
    inner: NodeTreeFacade<N>,
    outstanding: Mutex<Option<Pending>>,
    issued: AtomicUsize,
    answered_children: Mutex<Vec<N>>,
}

impl DeferredFacade {
    pub fn issued(&self) -> usize {
        self.issued.load(AtomicOrdering::SeqCst)
    }

    /// Nodes whose children were handed out, in request order.
    pub fn answered_children(&self) -> Vec<N> {
        self.answered_children.lock().unwrap().clone()
    }

    fn gate<T>(&self, what: &str, answer: impl FnOnce() -> Fetch<T>) -> Fetch<T> {
        let mut outstanding = self.outstanding.lock().unwrap();
        match outstanding.take() {
            Some(pending) if !pending.is_resolved() => {
                *outstanding = Some(pending.clone());
                Fetch::NotReady(pending)
            }
            Some(_) => answer(),
            None => {
                let n = self.issued.fetch_add(1, AtomicOrdering::SeqCst);
                let pending = Pending::new(format!("{what}#{n}"));
                *outstanding = Some(pending.clone());
                Fetch::NotReady(pending)
            }
        }
    }
}

impl DocumentFacade<N> for DeferredFacade {
    fn kind(&self, node: &N) -> NodeKind {
        self.inner.kind(node)
    }

    fn name(&self, node: &N) -> Option<QName> {
        self.inner.name(node)
    }

    fn string_value(&self, node: &N) -> String {
        self.inner.string_value(node)
    }

    fn lookup_namespace_uri(&self, node: &N, prefix: Option<&str>) -> Option<String> {
        self.inner.lookup_namespace_uri(node, prefix)
    }

    fn compare_document_order(&self, a: &N, b: &N) -> Result<Ordering, Error> {
        self.inner.compare_document_order(a, b)
    }

    fn parent(&self, node: &N) -> Fetch<Option<N>> {
        self.gate("parent", || self.inner.parent(node))
    }

    fn children(&self, node: &N, bucket: Option<&Bucket>) -> Fetch<Vec<N>> {
        self.gate("children", || {
            self.answered_children.lock().unwrap().push(node.clone());
            self.inner.children(node, bucket)
        })
    }

    fn attributes(&self, node: &N, bucket: Option<&Bucket>) -> Fetch<Vec<N>> {
        self.gate("attributes", || self.inner.attributes(node, bucket))
    }
}

pub fn deferred_ctx(root: SimpleNode) -> (Arc<DeferredFacade>, DynamicContext<N>) {
    let facade = Arc::new(DeferredFacade::default());
    let ctx = DynamicContextBuilder::<N>::new(facade.clone()).with_context_node(root).build();
    (facade, ctx)
}

/// Runs `sequence` to completion, resolving every suspension. Returns the values and how many
/// suspensions were seen.
pub fn drive_counting(sequence: &Sequence<N>) -> (Vec<Value<N>>, usize) {
    let mut suspensions = 0;
    let values = drive(sequence, |pending| {
        suspensions += 1;
        pending.resolve();
        Ok(())
    })
    .unwrap();
    (values, suspensions)
}

pub fn eval_all(selector: &Selector, ctx: &DynamicContext<N>) -> Vec<Value<N>> {
    drive_counting(&evaluate(selector, ctx).unwrap()).0
}

pub fn eval_err(selector: &Selector, ctx: &DynamicContext<N>) -> String {
    let outcome = evaluate(selector, ctx).and_then(|seq| drive(&seq, |p| {
        p.resolve();
        Ok(())
    }));
    match outcome {
        Ok(values) => panic!("expected an error, got {values:?}"),
        Err(e) => e.format_code(),
    }
}

pub fn atomics(values: &[Value<N>]) -> Vec<AtomicValue> {
    values.iter().map(|v| v.as_atomic().cloned().expect("atomic item")).collect()
}

pub fn strings(values: &[Value<N>], ctx: &DynamicContext<N>) -> Vec<String> {
    values
        .iter()
        .map(|v| match v {
            Value::Node(n) => ctx.dom_facade.string_value(&n.handle),
            Value::Atomic(a) => a.lexical(),
            Value::Function(f) => f.display_name(),
        })
        .collect()
}

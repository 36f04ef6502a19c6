//! Capabilities the engine consumes but does not implement.

use core::cmp::Ordering;
use core::marker::PhantomData;

use crate::engine::runtime::Error;
use crate::engine::selector::{Bucket, Selector};
use crate::model::{NodeKind, QName, XdmNode};
use crate::xdm::{AtomicValue, Fetch};

/// Navigation and introspection of a host document.
///
/// Introspection is synchronous. Navigation may suspend by returning [`Fetch::NotReady`]; the engine
/// asks again with the same arguments once the pending is resolved. The optional bucket hint lets a
/// facade pre-filter candidates; facades are free to ignore it.
pub trait DocumentFacade<N>: Send + Sync {
    fn kind(&self, node: &N) -> NodeKind;
    fn name(&self, node: &N) -> Option<QName>;
    fn string_value(&self, node: &N) -> String;

    /// Typed content of schema-annotated nodes. `None` means untyped: atomizes to `xs:untypedAtomic`.
    fn typed_value(&self, _node: &N) -> Option<Vec<AtomicValue>> {
        None
    }

    fn lookup_namespace_uri(&self, node: &N, prefix: Option<&str>) -> Option<String>;
    fn compare_document_order(&self, a: &N, b: &N) -> Result<Ordering, Error>;

    fn parent(&self, node: &N) -> Fetch<Option<N>>;
    fn children(&self, node: &N, bucket: Option<&Bucket>) -> Fetch<Vec<N>>;
    fn attributes(&self, node: &N, bucket: Option<&Bucket>) -> Fetch<Vec<N>>;
}

/// Fabricates nodes for functions that construct results.
pub trait NodesFactory<N>: Send + Sync {
    fn create_text(&self, content: &str) -> Result<N, Error>;
    /// Attribute nodes among `children` become attributes of the new element.
    fn create_element(&self, name: &QName, children: Vec<N>) -> Result<N, Error>;
    fn create_attribute(&self, name: &QName, value: &str) -> Result<N, Error>;
    fn create_comment(&self, content: &str) -> Result<N, Error>;
}

/// Turns query text into a selector tree. Lets query-evaluating functions compile sub-queries.
pub trait SelectorCompiler: Send + Sync {
    fn compile(&self, source: &str) -> Result<Selector, Error>;
}

impl<F> SelectorCompiler for F
where
    F: Fn(&str) -> Result<Selector, Error> + Send + Sync,
{
    fn compile(&self, source: &str) -> Result<Selector, Error> {
        self(source)
    }
}

/// [`DocumentFacade`] over any [`XdmNode`] tree. Never suspends.
pub struct NodeTreeFacade<N> {
    _marker: PhantomData<fn() -> N>,
}

impl<N> NodeTreeFacade<N> {
    pub fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<N> Default for NodeTreeFacade<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: XdmNode> DocumentFacade<N> for NodeTreeFacade<N> {
    fn kind(&self, node: &N) -> NodeKind {
        node.kind()
    }

    fn name(&self, node: &N) -> Option<QName> {
        node.name()
    }

    fn string_value(&self, node: &N) -> String {
        node.string_value()
    }

    fn lookup_namespace_uri(&self, node: &N, prefix: Option<&str>) -> Option<String> {
        node.lookup_namespace_uri(prefix)
    }

    fn compare_document_order(&self, a: &N, b: &N) -> Result<Ordering, Error> {
        a.compare_document_order(b)
    }

    fn parent(&self, node: &N) -> Fetch<Option<N>> {
        Fetch::Ready(node.parent())
    }

    fn children(&self, node: &N, bucket: Option<&Bucket>) -> Fetch<Vec<N>> {
        let mut children = node.children();
        if let Some(bucket) = bucket {
            children.retain(|c| bucket.admits(c.kind(), c.name().as_ref()));
        }
        Fetch::Ready(children)
    }

    fn attributes(&self, node: &N, bucket: Option<&Bucket>) -> Fetch<Vec<N>> {
        let mut attributes = node.attributes();
        if let Some(bucket) = bucket {
            attributes.retain(|a| bucket.admits(a.kind(), a.name().as_ref()));
        }
        Fetch::Ready(attributes)
    }
}

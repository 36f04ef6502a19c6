//! Arc-backed in-memory tree, mainly for tests and embedding hosts without their own model.
//!
//! Trees are built bottom-up with [`SimpleNodeBuilder`]; once built they are immutable.

use core::fmt;
use std::sync::{Arc, OnceLock, Weak};

use crate::engine::facade::NodesFactory;
use crate::engine::runtime::Error;
use crate::model::{NodeKind, QName, XdmNode};

struct Inner {
    kind: NodeKind,
    name: Option<QName>,
    value: Option<String>,
    parent: OnceLock<Weak<Inner>>,
    attributes: Vec<SimpleNode>,
    namespaces: Vec<SimpleNode>,
    children: Vec<SimpleNode>,
    cached_text: OnceLock<String>,
}

/// Node handle with identity semantics: clones are the same node.
#[derive(Clone)]
pub struct SimpleNode(Arc<Inner>);

impl PartialEq for SimpleNode {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for SimpleNode {}

impl std::hash::Hash for SimpleNode {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.0).hash(state);
    }
}

impl fmt::Debug for SimpleNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleNode")
            .field("kind", &self.0.kind)
            .field("name", &self.0.name.as_ref().map(QName::lexical))
            .field("value", &self.0.value)
            .finish()
    }
}

impl SimpleNode {
    fn leaf(kind: NodeKind, name: Option<QName>, value: Option<String>) -> Self {
        Self::assemble(kind, name, value, Vec::new(), Vec::new(), Vec::new())
    }

    fn assemble(
        kind: NodeKind,
        name: Option<QName>,
        value: Option<String>,
        attributes: Vec<SimpleNode>,
        namespaces: Vec<SimpleNode>,
        children: Vec<SimpleNode>,
    ) -> Self {
        let node = SimpleNode(Arc::new(Inner {
            kind,
            name,
            value,
            parent: OnceLock::new(),
            attributes,
            namespaces,
            children,
            cached_text: OnceLock::new(),
        }));
        for owned in node.0.attributes.iter().chain(&node.0.namespaces).chain(&node.0.children) {
            // A node keeps the first parent it was attached to.
            let _ = owned.0.parent.set(Arc::downgrade(&node.0));
        }
        node
    }

    pub fn document() -> SimpleNodeBuilder {
        SimpleNodeBuilder::new(NodeKind::Document, None)
    }

    pub fn element(name: &str) -> SimpleNodeBuilder {
        SimpleNodeBuilder::new(NodeKind::Element, Some(QName::local(name)))
    }

    pub fn element_ns(prefix: Option<&str>, local: &str, ns_uri: &str) -> SimpleNodeBuilder {
        SimpleNodeBuilder::new(NodeKind::Element, Some(QName::with_ns(prefix, local, ns_uri)))
    }

    pub fn attribute(name: &str, value: &str) -> SimpleNode {
        Self::leaf(NodeKind::Attribute, Some(QName::local(name)), Some(value.to_string()))
    }

    pub fn text(value: &str) -> SimpleNode {
        Self::leaf(NodeKind::Text, None, Some(value.to_string()))
    }

    pub fn comment(value: &str) -> SimpleNode {
        Self::leaf(NodeKind::Comment, None, Some(value.to_string()))
    }

    pub fn pi(target: &str, data: &str) -> SimpleNode {
        Self::leaf(NodeKind::ProcessingInstruction, Some(QName::local(target)), Some(data.to_string()))
    }

    pub fn namespace(prefix: &str, uri: &str) -> SimpleNode {
        let name = QName { prefix: Some(prefix.to_string()), local: prefix.to_string(), ns_uri: None };
        Self::leaf(NodeKind::Namespace, Some(name), Some(uri.to_string()))
    }
}

pub struct SimpleNodeBuilder {
    kind: NodeKind,
    name: Option<QName>,
    attributes: Vec<SimpleNode>,
    namespaces: Vec<SimpleNode>,
    children: Vec<SimpleNode>,
}

impl SimpleNodeBuilder {
    fn new(kind: NodeKind, name: Option<QName>) -> Self {
        Self { kind, name, attributes: Vec::new(), namespaces: Vec::new(), children: Vec::new() }
    }

    pub fn child(mut self, child: impl Into<SimpleNodeOrBuilder>) -> Self {
        self.children.push(child.into().build());
        self
    }

    pub fn children<I: IntoIterator<Item = SimpleNodeOrBuilder>>(mut self, children: I) -> Self {
        self.children.extend(children.into_iter().map(SimpleNodeOrBuilder::build));
        self
    }

    pub fn attr(mut self, attr: SimpleNode) -> Self {
        debug_assert!(attr.kind() == NodeKind::Attribute);
        self.attributes.push(attr);
        self
    }

    pub fn namespace(mut self, ns: SimpleNode) -> Self {
        debug_assert!(ns.kind() == NodeKind::Namespace);
        self.namespaces.push(ns);
        self
    }

    pub fn build(self) -> SimpleNode {
        SimpleNode::assemble(self.kind, self.name, None, self.attributes, self.namespaces, self.children)
    }
}

pub enum SimpleNodeOrBuilder {
    Built(SimpleNode),
    Builder(SimpleNodeBuilder),
}

impl SimpleNodeOrBuilder {
    fn build(self) -> SimpleNode {
        match self {
            SimpleNodeOrBuilder::Built(n) => n,
            SimpleNodeOrBuilder::Builder(b) => b.build(),
        }
    }
}

impl From<SimpleNode> for SimpleNodeOrBuilder {
    fn from(n: SimpleNode) -> Self {
        SimpleNodeOrBuilder::Built(n)
    }
}

impl From<SimpleNodeBuilder> for SimpleNodeOrBuilder {
    fn from(b: SimpleNodeBuilder) -> Self {
        SimpleNodeOrBuilder::Builder(b)
    }
}

pub fn doc() -> SimpleNodeBuilder {
    SimpleNode::document()
}

pub fn elem(name: &str) -> SimpleNodeBuilder {
    SimpleNode::element(name)
}

pub fn text(v: &str) -> SimpleNode {
    SimpleNode::text(v)
}

pub fn attr(name: &str, v: &str) -> SimpleNode {
    SimpleNode::attribute(name, v)
}

pub fn comment(v: &str) -> SimpleNode {
    SimpleNode::comment(v)
}

pub fn ns(prefix: &str, uri: &str) -> SimpleNode {
    SimpleNode::namespace(prefix, uri)
}

impl XdmNode for SimpleNode {
    fn kind(&self) -> NodeKind {
        self.0.kind
    }

    fn name(&self) -> Option<QName> {
        self.0.name.clone()
    }

    fn string_value(&self) -> String {
        match self.0.kind {
            NodeKind::Element | NodeKind::Document => self
                .0
                .cached_text
                .get_or_init(|| {
                    let mut out = String::new();
                    collect_text(self, &mut out);
                    out
                })
                .clone(),
            _ => self.0.value.clone().unwrap_or_default(),
        }
    }

    fn parent(&self) -> Option<Self> {
        self.0.parent.get().and_then(Weak::upgrade).map(SimpleNode)
    }

    fn children(&self) -> Vec<Self> {
        self.0.children.clone()
    }

    fn attributes(&self) -> Vec<Self> {
        self.0.attributes.clone()
    }

    fn namespaces(&self) -> Vec<Self> {
        self.0.namespaces.clone()
    }
}

fn collect_text(node: &SimpleNode, out: &mut String) {
    for child in &node.0.children {
        match child.0.kind {
            NodeKind::Text => out.push_str(child.0.value.as_deref().unwrap_or_default()),
            NodeKind::Element => collect_text(child, out),
            _ => {}
        }
    }
}

/// Fabricates detached [`SimpleNode`]s for functions that construct results.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleNodeFactory;

impl NodesFactory<SimpleNode> for SimpleNodeFactory {
    fn create_text(&self, content: &str) -> Result<SimpleNode, Error> {
        Ok(SimpleNode::text(content))
    }

    fn create_element(&self, name: &QName, children: Vec<SimpleNode>) -> Result<SimpleNode, Error> {
        let builder = SimpleNodeBuilder::new(NodeKind::Element, Some(name.clone()));
        Ok(children.into_iter().fold(builder, |b, child| match child.kind() {
            NodeKind::Attribute => b.attr(child),
            _ => b.child(child),
        })
        .build())
    }

    fn create_attribute(&self, name: &QName, value: &str) -> Result<SimpleNode, Error> {
        Ok(SimpleNode::leaf(NodeKind::Attribute, Some(name.clone()), Some(value.to_string())))
    }

    fn create_comment(&self, content: &str) -> Result<SimpleNode, Error> {
        Ok(SimpleNode::comment(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn tree() -> SimpleNode {
        doc()
            .child(
                elem("root")
                    .namespace(ns("p", "urn:p"))
                    .attr(attr("id", "42"))
                    .child(elem("a").child(text("x")))
                    .child(comment("ignored"))
                    .child(elem("b").child(text("y"))),
            )
            .build()
    }

    #[rstest]
    fn string_value_concatenates_descendant_text() {
        let d = tree();
        assert_eq!(d.string_value(), "xy");
        let root = &d.children()[0];
        assert_eq!(root.attributes()[0].string_value(), "42");
    }

    #[rstest]
    fn parents_are_wired() {
        let d = tree();
        let root = d.children()[0].clone();
        let a = root.children()[0].clone();
        assert_eq!(a.parent(), Some(root.clone()));
        assert_eq!(root.attributes()[0].parent(), Some(root.clone()));
        assert_eq!(root.parent(), Some(d.clone()));
        assert_eq!(d.parent(), None);
    }

    #[rstest]
    fn namespace_lookup_walks_ancestors() {
        let d = tree();
        let a = d.children()[0].children()[0].clone();
        assert_eq!(a.lookup_namespace_uri(Some("p")).as_deref(), Some("urn:p"));
        assert_eq!(a.lookup_namespace_uri(Some("q")), None);
    }

    #[rstest]
    fn document_order_puts_attributes_before_children() {
        let d = tree();
        let root = d.children()[0].clone();
        let id = root.attributes()[0].clone();
        let b = root.children()[2].clone();
        assert_eq!(id.compare_document_order(&b).unwrap(), core::cmp::Ordering::Less);
        assert_eq!(b.compare_document_order(&root).unwrap(), core::cmp::Ordering::Greater);
        assert!(b.compare_document_order(&text("detached")).is_err());
    }
}

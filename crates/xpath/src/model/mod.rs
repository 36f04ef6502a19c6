//! Synchronous node-tree model.
//!
//! The evaluator itself only talks to a [`DocumentFacade`](crate::engine::facade::DocumentFacade).
//! Trees that can answer every navigation query immediately implement [`XdmNode`] and are plugged in
//! through [`NodeTreeFacade`](crate::engine::facade::NodeTreeFacade).

use core::cmp::Ordering;

use crate::engine::runtime::{Error, ErrorCode};

pub mod simple;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Document,
    Element,
    Attribute,
    Text,
    Comment,
    ProcessingInstruction,
    Namespace,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    pub prefix: Option<String>,
    pub local: String,
    pub ns_uri: Option<String>,
}

impl QName {
    pub fn local(local: impl Into<String>) -> Self {
        Self { prefix: None, local: local.into(), ns_uri: None }
    }

    pub fn with_ns(prefix: Option<&str>, local: impl Into<String>, ns_uri: &str) -> Self {
        Self { prefix: prefix.map(str::to_string), local: local.into(), ns_uri: Some(ns_uri.to_string()) }
    }

    /// `prefix:local`, or just `local`.
    pub fn lexical(&self) -> String {
        match self.prefix.as_deref() {
            Some(p) if !p.is_empty() => format!("{p}:{}", self.local),
            _ => self.local.clone(),
        }
    }
}

/// Document order from ancestry and sibling position.
///
/// An ancestor precedes its descendants. Among the nodes owned by one parent, attributes come first,
/// then namespace nodes, then children. Nodes with different roots have no order here and yield
/// `err:FOER0000`; trees spanning several roots override [`XdmNode::compare_document_order`].
pub fn try_compare_by_ancestry<N: XdmNode>(a: &N, b: &N) -> Result<Ordering, Error> {
    if a == b {
        return Ok(Ordering::Equal);
    }
    let path_a = path_from_root(a);
    let path_b = path_from_root(b);
    let shared = path_a.iter().zip(&path_b).take_while(|(x, y)| x == y).count();
    if shared == 0 {
        return Err(Error::from_code(ErrorCode::FOER0000, "nodes from different trees have no document order"));
    }
    if shared == path_a.len() || shared == path_b.len() {
        return Ok(path_a.len().cmp(&path_b.len()));
    }
    let parent = &path_a[shared - 1];
    let owned: Vec<N> = parent.attributes().into_iter().chain(parent.namespaces()).chain(parent.children()).collect();
    let pos_a = owned.iter().position(|n| *n == path_a[shared]);
    let pos_b = owned.iter().position(|n| *n == path_b[shared]);
    Ok(match (pos_a, pos_b) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => Ordering::Equal,
    })
}

fn path_from_root<N: XdmNode>(node: &N) -> Vec<N> {
    let mut path = vec![node.clone()];
    let mut current = node.parent();
    while let Some(parent) = current {
        current = parent.parent();
        path.push(parent);
    }
    path.reverse();
    path
}

pub trait XdmNode: Clone + Eq + core::fmt::Debug + Send + Sync + 'static {
    fn kind(&self) -> NodeKind;
    fn name(&self) -> Option<QName>;
    fn string_value(&self) -> String;

    fn parent(&self) -> Option<Self>;
    fn children(&self) -> Vec<Self>;
    fn attributes(&self) -> Vec<Self>;
    fn namespaces(&self) -> Vec<Self>;

    /// In-scope namespace binding for `prefix` (`None` = default namespace), searching ancestors.
    fn lookup_namespace_uri(&self, prefix: Option<&str>) -> Option<String> {
        let wanted = prefix.unwrap_or("");
        let mut current = Some(self.clone());
        while let Some(node) = current {
            let found = node.namespaces().into_iter().find(|ns| {
                ns.name().is_some_and(|name| name.prefix.as_deref().unwrap_or("") == wanted)
            });
            if let Some(ns) = found {
                return Some(ns.string_value());
            }
            current = node.parent();
        }
        None
    }

    fn compare_document_order(&self, other: &Self) -> Result<Ordering, Error> {
        try_compare_by_ancestry(self, other)
    }
}

//! Values, sequences and the type lattice.

mod atomic;
mod fetch;
mod sequence;
mod types;

use core::fmt;
use std::sync::Arc;

use rust_decimal::Decimal;

pub use atomic::AtomicValue;
pub use fetch::{Fetch, Pending, Step};
pub use sequence::{Sequence, SequenceCursor, SequenceIter};
pub use types::{Occurrence, ParamSpec, SequenceType, TypeName, expand_params, subtype_of};

use crate::consts::FNS;
use crate::engine::runtime::{DynamicContext, Error};
use crate::model::NodeKind;

/// Bounds every document handle has to satisfy. Implemented for all qualifying types.
pub trait NodeHandle: Clone + Eq + fmt::Debug + 'static {}

impl<T: Clone + Eq + fmt::Debug + 'static> NodeHandle for T {}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExpandedName {
    pub ns_uri: Option<String>,
    pub local: String,
}

impl ExpandedName {
    pub fn new(ns_uri: Option<String>, local: impl Into<String>) -> Self {
        Self { ns_uri, local: local.into() }
    }

    /// A name without namespace, the usual shape of variable names.
    pub fn local(local: impl Into<String>) -> Self {
        Self::new(None, local)
    }

    /// A name in the standard function namespace.
    pub fn fn_name(local: impl Into<String>) -> Self {
        Self::new(Some(FNS.to_string()), local)
    }

    pub fn in_ns(ns_uri: &str, local: impl Into<String>) -> Self {
        Self::new(Some(ns_uri.to_string()), local)
    }
}

impl fmt::Display for ExpandedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ns_uri.as_deref() {
            Some(FNS) => write!(f, "fn:{}", self.local),
            Some(ns) => write!(f, "Q{{{ns}}}{}", self.local),
            None => f.write_str(&self.local),
        }
    }
}

/// A node together with its kind, so that type tests do not need the facade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeItem<N> {
    pub handle: N,
    pub kind: NodeKind,
}

pub type FunctionImpl<N> =
    Arc<dyn Fn(&DynamicContext<N>, &[Sequence<N>]) -> Result<Sequence<N>, Error> + Send + Sync>;

/// A function value: the callable plus the signature used to check dynamic calls.
#[derive(Clone)]
pub struct FunctionItem<N> {
    pub name: Option<ExpandedName>,
    pub arity: usize,
    pub params: Vec<ParamSpec>,
    pub return_type: SequenceType,
    pub implementation: FunctionImpl<N>,
}

impl<N> FunctionItem<N> {
    pub fn is_variadic(&self) -> bool {
        matches!(self.params.last(), Some(ParamSpec::Variadic))
    }

    /// Parameter types for a call with `argc` arguments, honoring a trailing variadic marker.
    pub fn param_types_for(&self, argc: usize) -> Option<Vec<SequenceType>> {
        if argc != self.arity && !(self.is_variadic() && argc >= self.arity) {
            return None;
        }
        expand_params(&self.params, argc)
    }

    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => format!("{name}#{}", self.arity),
            None => format!("anonymous function#{}", self.arity),
        }
    }
}

impl<N> fmt::Debug for FunctionItem<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionItem")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("params", &self.params)
            .field("return_type", &self.return_type)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub enum Value<N> {
    Node(NodeItem<N>),
    Atomic(AtomicValue),
    Function(FunctionItem<N>),
}

impl<N> Value<N> {
    pub fn node(handle: N, kind: NodeKind) -> Self {
        Value::Node(NodeItem { handle, kind })
    }

    pub fn string(s: impl Into<String>) -> Self {
        Value::Atomic(AtomicValue::String(s.into()))
    }

    pub fn untyped(s: impl Into<String>) -> Self {
        Value::Atomic(AtomicValue::UntypedAtomic(s.into()))
    }

    pub fn integer(i: i64) -> Self {
        Value::Atomic(AtomicValue::Integer(i))
    }

    pub fn decimal(d: Decimal) -> Self {
        Value::Atomic(AtomicValue::Decimal(d))
    }

    pub fn double(d: f64) -> Self {
        Value::Atomic(AtomicValue::Double(d))
    }

    pub fn boolean(b: bool) -> Self {
        Value::Atomic(AtomicValue::Boolean(b))
    }

    pub fn type_name(&self) -> TypeName {
        match self {
            Value::Node(n) => TypeName::from_node_kind(n.kind),
            Value::Atomic(a) => a.type_name(),
            Value::Function(_) => TypeName::Function,
        }
    }

    pub fn as_atomic(&self) -> Option<&AtomicValue> {
        match self {
            Value::Atomic(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&NodeItem<N>> {
        match self {
            Value::Node(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionItem<N>> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }
}

impl<N: PartialEq> PartialEq for Value<N> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Node(a), Value::Node(b)) => a == b,
            (Value::Atomic(a), Value::Atomic(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => {
                a.arity == b.arity && Arc::ptr_eq(&a.implementation, &b.implementation)
            }
            _ => false,
        }
    }
}

impl<N> From<AtomicValue> for Value<N> {
    fn from(value: AtomicValue) -> Self {
        Value::Atomic(value)
    }
}

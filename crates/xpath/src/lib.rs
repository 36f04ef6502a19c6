//! Evaluation engine for an XPath-style selector language.
//!
//! The crate evaluates an already-built [`Selector`] tree against a [`DynamicContext`] and produces a
//! lazily generated [`Sequence`]. Every step of that pipeline may suspend: when an injected capability
//! (usually the [`DocumentFacade`]) cannot answer synchronously it hands out a [`Pending`], the whole
//! evaluation reports `NotReady`, and pulling again after the host resolved the pending continues at
//! the exact step that suspended.
//!
//! ```
//! use xselect::engine::runtime::DynamicContextBuilder;
//! use xselect::model::simple::{SimpleNode, doc, elem};
//! use xselect::{Fetch, Selector, evaluate_values};
//!
//! let root = doc().child(elem("a").child(elem("b"))).build();
//! let ctx = DynamicContextBuilder::<SimpleNode>::default().with_context_node(root).build();
//! let selector = Selector::descendant_named("b");
//! match evaluate_values(&selector, &ctx).unwrap() {
//!     Fetch::Ready(values) => assert_eq!(values.len(), 1),
//!     Fetch::NotReady(_) => unreachable!("the in-memory tree never suspends"),
//! }
//! ```

pub mod consts;
pub mod engine;
pub mod model;
pub mod xdm;

pub use engine::evaluator::{drive, evaluate, evaluate_values};
pub use engine::facade::{DocumentFacade, NodeTreeFacade, NodesFactory, SelectorCompiler};
pub use engine::registry::{FunctionDeclaration, FunctionRegistry, ResolveError};
pub use engine::runtime::{DynamicContext, DynamicContextBuilder, Error, ErrorCategory, ErrorCode};
pub use engine::selector::{
    ArithmeticOp, Axis, Bucket, Child, CompareKind, ComparisonOp, NameTest, NamespaceTest, NodeComparison, Quantifier,
    ResultOrder, Selector, Specificity, SpecificityKind,
};
pub use model::{NodeKind, QName, XdmNode};
pub use xdm::{
    AtomicValue, ExpandedName, Fetch, FunctionItem, NodeHandle, NodeItem, Occurrence, ParamSpec, Pending, Sequence,
    SequenceType, Step, TypeName, Value, subtype_of,
};

//! Selector trees: the closed set of expression forms and their static properties.
//!
//! Evaluation lives in [`crate::engine::evaluator`]; this module only describes shape,
//! [`Specificity`], [`Bucket`] hints and [`ResultOrder`].

use core::cmp::Ordering;
use std::sync::Arc;

use crate::engine::registry::FunctionRegistry;
use crate::engine::runtime::Error;
use crate::model::{NodeKind, QName};
use crate::xdm::{AtomicValue, ExpandedName, SequenceType, TypeName};

pub type Child = Arc<Selector>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    SelfAxis,
    Child,
    Descendant,
    DescendantOrSelf,
    Parent,
    Ancestor,
    AncestorOrSelf,
    Attribute,
    FollowingSibling,
    PrecedingSibling,
}

impl Axis {
    /// Order in which the axis enumerates nodes relative to document order.
    pub fn result_order(self) -> ResultOrder {
        match self {
            Axis::Ancestor | Axis::AncestorOrSelf | Axis::PrecedingSibling => ResultOrder::ReverseSorted,
            _ => ResultOrder::Sorted,
        }
    }
}

/// Namespace part of a name test.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NamespaceTest {
    /// `*:local`
    Any,
    /// A prefix resolved against the context's namespace resolver when the test runs.
    /// `None` is the unprefixed form: the default namespace for elements, no namespace for attributes.
    Prefix(Option<String>),
    /// An already resolved namespace URI; `None` is "no namespace".
    Uri(Option<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NameTest {
    pub namespace: NamespaceTest,
    /// `None` for a local-name wildcard.
    pub local: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl ComparisonOp {
    pub fn holds(self, ordering: Ordering) -> bool {
        match self {
            ComparisonOp::Eq => ordering.is_eq(),
            ComparisonOp::Ne => ordering.is_ne(),
            ComparisonOp::Lt => ordering.is_lt(),
            ComparisonOp::Le => ordering.is_le(),
            ComparisonOp::Gt => ordering.is_gt(),
            ComparisonOp::Ge => ordering.is_ge(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeComparison {
    Is,
    Precedes,
    Follows,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareKind {
    /// `eq`, `lt`, …: singleton operands.
    Value(ComparisonOp),
    /// `=`, `<`, …: existential over both operand sequences.
    General(ComparisonOp),
    /// `is`, `<<`, `>>`.
    Node(NodeComparison),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantifier {
    Some,
    Every,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultOrder {
    Sorted,
    ReverseSorted,
    Unsorted,
}

/// Pre-filter hint: every node a selector can match falls into this bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Bucket {
    Kind(NodeKind),
    /// Elements or attributes with this local name.
    Name(String),
}

impl Bucket {
    pub fn admits(&self, kind: NodeKind, name: Option<&QName>) -> bool {
        match self {
            Bucket::Kind(k) => *k == kind,
            Bucket::Name(local) => {
                matches!(kind, NodeKind::Element | NodeKind::Attribute) && name.is_some_and(|n| n.local == *local)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecificityKind {
    External,
    Attribute,
    NodeName,
    NodeType,
    Universal,
}

/// Counts per [`SpecificityKind`], compared lexicographically with `External` most significant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Specificity([u32; 5]);

impl Specificity {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn of(kind: SpecificityKind) -> Self {
        let mut counts = [0; 5];
        counts[kind as usize] = 1;
        Self(counts)
    }

    pub fn get(&self, kind: SpecificityKind) -> u32 {
        self.0[kind as usize]
    }

    #[must_use]
    pub fn add(self, other: Specificity) -> Self {
        Self(core::array::from_fn(|i| self.0[i] + other.0[i]))
    }

    #[must_use]
    pub fn pairwise_max(self, other: Specificity) -> Self {
        Self(core::array::from_fn(|i| self.0[i].max(other.0[i])))
    }

    pub fn compare_to(&self, other: &Specificity) -> Ordering {
        self.cmp(other)
    }
}

#[derive(Debug, Clone)]
pub enum Selector {
    Literal(AtomicValue),
    /// Comma operator.
    SequenceExpr(Vec<Child>),
    ContextItem,
    VarRef(ExpandedName),
    /// On its own, tests the context item.
    NameTest(NameTest),
    KindTest(NodeKind),
    /// `node()`: any node.
    UniversalWildcard,
    AxisStep { axis: Axis, test: Child },
    Path(Vec<Child>),
    Filter { base: Child, predicate: Child },
    And(Vec<Child>),
    Or(Vec<Child>),
    Unary { negate: bool, operand: Child },
    Arithmetic { op: ArithmeticOp, lhs: Child, rhs: Child },
    Compare { kind: CompareKind, lhs: Child, rhs: Child },
    Range { from: Child, to: Child },
    StringConcat(Vec<Child>),
    If { test: Child, then_branch: Child, else_branch: Child },
    Quantified { quantifier: Quantifier, bindings: Vec<(ExpandedName, Child)>, satisfies: Child },
    For { bindings: Vec<(ExpandedName, Child)>, body: Child },
    Let { name: ExpandedName, value: Child, body: Child },
    SimpleMap { lhs: Child, rhs: Child },
    InstanceOf { operand: Child, sequence_type: SequenceType },
    Cast { operand: Child, target: TypeName, allow_empty: bool },
    Castable { operand: Child, target: TypeName, allow_empty: bool },
    /// Static call, resolved against the registry when constructed.
    FunctionCall { name: ExpandedName, args: Vec<Child> },
    NamedFunctionRef { name: ExpandedName, arity: usize },
    DynamicFunctionCall { base: Child, args: Vec<Child> },
}

impl PartialEq for Selector {
    fn eq(&self, other: &Self) -> bool {
        use Selector::*;
        match (self, other) {
            (Literal(a), Literal(b)) => same_literal(a, b),
            (SequenceExpr(a), SequenceExpr(b))
            | (Path(a), Path(b))
            | (And(a), And(b))
            | (Or(a), Or(b))
            | (StringConcat(a), StringConcat(b)) => a == b,
            (ContextItem, ContextItem) | (UniversalWildcard, UniversalWildcard) => true,
            (VarRef(a), VarRef(b)) => a == b,
            (NameTest(a), NameTest(b)) => a == b,
            (KindTest(a), KindTest(b)) => a == b,
            (AxisStep { axis: a, test: at }, AxisStep { axis: b, test: bt }) => a == b && at == bt,
            (Filter { base: a, predicate: ap }, Filter { base: b, predicate: bp }) => a == b && ap == bp,
            (Unary { negate: a, operand: ao }, Unary { negate: b, operand: bo }) => a == b && ao == bo,
            (Arithmetic { op: a, lhs: al, rhs: ar }, Arithmetic { op: b, lhs: bl, rhs: br }) => a == b && al == bl && ar == br,
            (Compare { kind: a, lhs: al, rhs: ar }, Compare { kind: b, lhs: bl, rhs: br }) => a == b && al == bl && ar == br,
            (Range { from: af, to: at }, Range { from: bf, to: bt }) | (SimpleMap { lhs: af, rhs: at }, SimpleMap { lhs: bf, rhs: bt }) => {
                af == bf && at == bt
            }
            (
                If { test: at, then_branch: athen, else_branch: aelse },
                If { test: bt, then_branch: bthen, else_branch: belse },
            ) => at == bt && athen == bthen && aelse == belse,
            (
                Quantified { quantifier: a, bindings: ab, satisfies: asat },
                Quantified { quantifier: b, bindings: bb, satisfies: bsat },
            ) => a == b && ab == bb && asat == bsat,
            (For { bindings: ab, body: abody }, For { bindings: bb, body: bbody }) => ab == bb && abody == bbody,
            (Let { name: a, value: av, body: abody }, Let { name: b, value: bv, body: bbody }) => a == b && av == bv && abody == bbody,
            (InstanceOf { operand: ao, sequence_type: a }, InstanceOf { operand: bo, sequence_type: b }) => a == b && ao == bo,
            (
                Cast { operand: ao, target: at, allow_empty: ae },
                Cast { operand: bo, target: bt, allow_empty: be },
            )
            | (
                Castable { operand: ao, target: at, allow_empty: ae },
                Castable { operand: bo, target: bt, allow_empty: be },
            ) => at == bt && ae == be && ao == bo,
            (FunctionCall { name: a, args: aa }, FunctionCall { name: b, args: ba }) => a == b && aa == ba,
            (NamedFunctionRef { name: a, arity: an }, NamedFunctionRef { name: b, arity: bn }) => a == b && an == bn,
            (DynamicFunctionCall { base: a, args: aa }, DynamicFunctionCall { base: b, args: ba }) => a == b && aa == ba,
            _ => false,
        }
    }
}

/// Literal identity: a NaN literal is the same literal as another NaN.
fn same_literal(a: &AtomicValue, b: &AtomicValue) -> bool {
    match (a, b) {
        (AtomicValue::Double(x), AtomicValue::Double(y)) => x.to_bits() == y.to_bits() || (x.is_nan() && y.is_nan()),
        (AtomicValue::Float(x), AtomicValue::Float(y)) => x.to_bits() == y.to_bits() || (x.is_nan() && y.is_nan()),
        _ => a == b,
    }
}

fn boxed(children: Vec<Selector>) -> Vec<Child> {
    children.into_iter().map(Arc::new).collect()
}

impl Selector {
    pub fn literal(value: impl Into<AtomicValue>) -> Self {
        Selector::Literal(value.into())
    }

    pub fn integer(i: i64) -> Self {
        Selector::Literal(AtomicValue::Integer(i))
    }

    pub fn double(d: f64) -> Self {
        Selector::Literal(AtomicValue::Double(d))
    }

    pub fn string(s: &str) -> Self {
        Selector::Literal(AtomicValue::String(s.to_string()))
    }

    pub fn sequence(items: Vec<Selector>) -> Self {
        Selector::SequenceExpr(boxed(items))
    }

    pub fn var(local: &str) -> Self {
        Selector::VarRef(ExpandedName::local(local))
    }

    /// Unprefixed name test.
    pub fn name(local: &str) -> Self {
        Selector::NameTest(NameTest { namespace: NamespaceTest::Prefix(None), local: Some(local.to_string()) })
    }

    /// `*`
    pub fn any_name() -> Self {
        Selector::NameTest(NameTest { namespace: NamespaceTest::Any, local: None })
    }

    pub fn axis(axis: Axis, test: Selector) -> Self {
        Selector::AxisStep { axis, test: Arc::new(test) }
    }

    pub fn child_named(local: &str) -> Self {
        Self::axis(Axis::Child, Self::name(local))
    }

    pub fn descendant_named(local: &str) -> Self {
        Self::axis(Axis::Descendant, Self::name(local))
    }

    pub fn attribute_named(local: &str) -> Self {
        Self::axis(Axis::Attribute, Self::name(local))
    }

    pub fn path(steps: Vec<Selector>) -> Self {
        Selector::Path(boxed(steps))
    }

    pub fn filter(base: Selector, predicate: Selector) -> Self {
        Selector::Filter { base: Arc::new(base), predicate: Arc::new(predicate) }
    }

    pub fn and(children: Vec<Selector>) -> Self {
        Selector::And(boxed(children))
    }

    pub fn or(children: Vec<Selector>) -> Self {
        Selector::Or(boxed(children))
    }

    pub fn negate(operand: Selector) -> Self {
        Selector::Unary { negate: true, operand: Arc::new(operand) }
    }

    pub fn arithmetic(op: ArithmeticOp, lhs: Selector, rhs: Selector) -> Self {
        Selector::Arithmetic { op, lhs: Arc::new(lhs), rhs: Arc::new(rhs) }
    }

    pub fn compare(kind: CompareKind, lhs: Selector, rhs: Selector) -> Self {
        Selector::Compare { kind, lhs: Arc::new(lhs), rhs: Arc::new(rhs) }
    }

    /// General comparison (`=`, `<`, …).
    pub fn general(op: ComparisonOp, lhs: Selector, rhs: Selector) -> Self {
        Self::compare(CompareKind::General(op), lhs, rhs)
    }

    pub fn range(from: Selector, to: Selector) -> Self {
        Selector::Range { from: Arc::new(from), to: Arc::new(to) }
    }

    pub fn concat_strings(parts: Vec<Selector>) -> Self {
        Selector::StringConcat(boxed(parts))
    }

    pub fn if_then_else(test: Selector, then_branch: Selector, else_branch: Selector) -> Self {
        Selector::If { test: Arc::new(test), then_branch: Arc::new(then_branch), else_branch: Arc::new(else_branch) }
    }

    pub fn quantified(quantifier: Quantifier, bindings: Vec<(&str, Selector)>, satisfies: Selector) -> Self {
        Selector::Quantified {
            quantifier,
            bindings: bindings.into_iter().map(|(n, s)| (ExpandedName::local(n), Arc::new(s))).collect(),
            satisfies: Arc::new(satisfies),
        }
    }

    pub fn for_each(bindings: Vec<(&str, Selector)>, body: Selector) -> Self {
        Selector::For {
            bindings: bindings.into_iter().map(|(n, s)| (ExpandedName::local(n), Arc::new(s))).collect(),
            body: Arc::new(body),
        }
    }

    pub fn let_in(name: &str, value: Selector, body: Selector) -> Self {
        Selector::Let { name: ExpandedName::local(name), value: Arc::new(value), body: Arc::new(body) }
    }

    pub fn simple_map(lhs: Selector, rhs: Selector) -> Self {
        Selector::SimpleMap { lhs: Arc::new(lhs), rhs: Arc::new(rhs) }
    }

    pub fn instance_of(operand: Selector, sequence_type: SequenceType) -> Self {
        Selector::InstanceOf { operand: Arc::new(operand), sequence_type }
    }

    pub fn cast(operand: Selector, target: TypeName, allow_empty: bool) -> Self {
        Selector::Cast { operand: Arc::new(operand), target, allow_empty }
    }

    pub fn castable(operand: Selector, target: TypeName, allow_empty: bool) -> Self {
        Selector::Castable { operand: Arc::new(operand), target, allow_empty }
    }

    /// Static function call. Fails with `err:XPST0017` when `registry` has no such (name, arity).
    pub fn function_call<N>(name: ExpandedName, args: Vec<Selector>, registry: &FunctionRegistry<N>) -> Result<Self, Error> {
        let declaration = registry.resolve(&name, args.len())?;
        Ok(Selector::FunctionCall { name: declaration.name.clone(), args: boxed(args) })
    }

    /// `name#arity`. Fails with `err:XPST0017` when unregistered, listing near misses.
    pub fn named_function_ref<N>(name: ExpandedName, arity: usize, registry: &FunctionRegistry<N>) -> Result<Self, Error> {
        let declaration = registry.resolve(&name, arity)?;
        Ok(Selector::NamedFunctionRef { name: declaration.name.clone(), arity })
    }

    pub fn dynamic_call(base: Selector, args: Vec<Selector>) -> Self {
        Selector::DynamicFunctionCall { base: Arc::new(base), args: boxed(args) }
    }

    /// Structural equality: same variant, recursively equal children. A NaN literal equals itself.
    pub fn equals(&self, other: &Selector) -> bool {
        self == other
    }

    /// Direct sub-selectors in evaluation order.
    pub fn children(&self) -> Vec<&Selector> {
        use Selector::*;
        match self {
            Literal(_) | ContextItem | VarRef(_) | NameTest(_) | KindTest(_) | UniversalWildcard | NamedFunctionRef { .. } => {
                Vec::new()
            }
            SequenceExpr(items) | Path(items) | And(items) | Or(items) | StringConcat(items) | FunctionCall { args: items, .. } => {
                items.iter().map(AsRef::as_ref).collect()
            }
            AxisStep { test, .. } => vec![test.as_ref()],
            Filter { base, predicate } => vec![base.as_ref(), predicate.as_ref()],
            Unary { operand, .. } | InstanceOf { operand, .. } | Cast { operand, .. } | Castable { operand, .. } => {
                vec![operand.as_ref()]
            }
            Arithmetic { lhs, rhs, .. } | Compare { lhs, rhs, .. } | SimpleMap { lhs, rhs } => vec![lhs.as_ref(), rhs.as_ref()],
            Range { from, to } => vec![from.as_ref(), to.as_ref()],
            If { test, then_branch, else_branch } => vec![test.as_ref(), then_branch.as_ref(), else_branch.as_ref()],
            Quantified { bindings, satisfies: body, .. } | For { bindings, body } => {
                bindings.iter().map(|(_, s)| s.as_ref()).chain(core::iter::once(body.as_ref())).collect()
            }
            Let { value, body, .. } => vec![value.as_ref(), body.as_ref()],
            DynamicFunctionCall { base, args } => core::iter::once(base.as_ref()).chain(args.iter().map(AsRef::as_ref)).collect(),
        }
    }

    pub fn specificity(&self) -> Specificity {
        let summed = || self.children().into_iter().fold(Specificity::zero(), |acc, c| acc.add(c.specificity()));
        match self {
            Selector::NameTest(NameTest { local: Some(_), .. }) => Specificity::of(SpecificityKind::NodeName),
            Selector::NameTest(NameTest { local: None, .. }) | Selector::KindTest(_) => {
                Specificity::of(SpecificityKind::NodeType)
            }
            Selector::UniversalWildcard => Specificity::of(SpecificityKind::Universal),
            Selector::AxisStep { axis: Axis::Attribute, test } => {
                test.specificity().add(Specificity::of(SpecificityKind::Attribute))
            }
            Selector::Or(children) => {
                children.iter().fold(Specificity::zero(), |acc, c| acc.pairwise_max(c.specificity()))
            }
            Selector::FunctionCall { .. } | Selector::DynamicFunctionCall { .. } => {
                summed().add(Specificity::of(SpecificityKind::External))
            }
            _ => summed(),
        }
    }

    pub fn bucket(&self) -> Option<Bucket> {
        match self {
            Selector::NameTest(NameTest { local: Some(local), .. }) => Some(Bucket::Name(local.clone())),
            Selector::KindTest(kind) => Some(Bucket::Kind(*kind)),
            Selector::AxisStep { test, .. } => test.bucket(),
            Selector::Filter { base, .. } => base.bucket(),
            Selector::Path(steps) => steps.last().and_then(|s| s.bucket()),
            Selector::And(children) => children.iter().find_map(|c| c.bucket()),
            Selector::Or(children) => {
                let mut buckets = children.iter().map(|c| c.bucket());
                let first = buckets.next()??;
                buckets.all(|b| b.as_ref() == Some(&first)).then_some(first)
            }
            _ => None,
        }
    }

    pub fn expected_result_order(&self) -> ResultOrder {
        use Selector::*;
        match self {
            AxisStep { axis, .. } => axis.result_order(),
            Filter { base, .. } => base.expected_result_order(),
            Let { body, .. } => body.expected_result_order(),
            If { then_branch, else_branch, .. } => {
                let then_order = then_branch.expected_result_order();
                if then_order == else_branch.expected_result_order() { then_order } else { ResultOrder::Unsorted }
            }
            Path(_) | Literal(_) | ContextItem | NameTest(_) | KindTest(_) | UniversalWildcard | And(_) | Or(_)
            | Unary { .. } | Arithmetic { .. } | Compare { .. } | Range { .. } | StringConcat(_) | Quantified { .. }
            | InstanceOf { .. } | Cast { .. } | Castable { .. } | NamedFunctionRef { .. } => ResultOrder::Sorted,
            SequenceExpr(_) | VarRef(_) | For { .. } | SimpleMap { .. } | FunctionCall { .. }
            | DynamicFunctionCall { .. } => ResultOrder::Unsorted,
        }
    }
}

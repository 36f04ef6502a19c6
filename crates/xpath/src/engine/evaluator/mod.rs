use std::sync::Arc;

use crate::engine::runtime::{DynamicContext, Error, ErrorCode};
use crate::engine::selector::{ArithmeticOp, Child, ResultOrder, Selector};
use crate::ready;
use crate::xdm::{AtomicValue, Fetch, NodeHandle, Pending, Sequence, SequenceCursor, TypeName, Value};

pub(crate) mod calls;
pub(crate) mod casting;
mod clauses;
pub(crate) mod comparison;
mod cursors;
pub(crate) mod node_ops;
pub(crate) mod numeric;
pub(crate) mod type_check;

use casting::{atomize, cast_atomic};
use cursors::AxisCursor;
use node_ops::{into_document_order, test_node};
use numeric::{NumKind, numeric_operand};

/// Evaluates a selector against a dynamic context.
///
/// The returned sequence is **lazy**: nothing beyond what is needed to set up the pipeline runs
/// before the first pull, and every pull may come back as [`Fetch::NotReady`] when an injected
/// capability is waiting for outside work.
///
/// # Resuming
///
/// Keep the returned [`Sequence`] and pull it again after resolving the [`Pending`]. Items already
/// produced are memoized and the suspended step continues where it stopped; nothing is evaluated
/// twice. [`drive`] wraps that loop.
///
/// # Example
///
/// ```
/// # use xselect::engine::runtime::DynamicContextBuilder;
/// # use xselect::model::simple::{SimpleNode, doc, elem};
/// # use xselect::{Fetch, Selector, evaluate};
/// let root = doc().child(elem("a")).child(elem("a")).build();
/// let ctx = DynamicContextBuilder::<SimpleNode>::default().with_context_node(root).build();
/// let result = evaluate(&Selector::child_named("a"), &ctx).unwrap();
/// assert!(matches!(result.get_all_values().unwrap(), Fetch::Ready(v) if v.len() == 2));
/// ```
///
/// # Errors
///
/// Errors that can be detected while building the pipeline are returned here: an absent focus for
/// an axis step, an unbound variable, an unknown function. Everything else surfaces on a pull.
pub fn evaluate<N: NodeHandle>(selector: &Selector, ctx: &DynamicContext<N>) -> Result<Sequence<N>, Error> {
    tracing::debug!(
        specificity = ?selector.specificity(),
        order = ?selector.expected_result_order(),
        "evaluating selector"
    );
    eval(selector, ctx)
}

/// Evaluates and materializes in one go.
///
/// Every call starts a fresh evaluation. To resume after a suspension use [`evaluate`] and pull the
/// same sequence again.
pub fn evaluate_values<N: NodeHandle>(selector: &Selector, ctx: &DynamicContext<N>) -> Result<Fetch<Vec<Value<N>>>, Error> {
    let values = evaluate(selector, ctx)?.get_all_values()?;
    if let Fetch::NotReady(pending) = &values {
        tracing::trace!(pending = pending.label(), "evaluation suspended");
    }
    Ok(values)
}

/// Pulls `sequence` to the end, handing each suspension to `resolve`.
///
/// `resolve` must resolve the pending it is given (or fail). A pending that is still unresolved
/// when `resolve` returns is `err:FOER0000`, since pulling again would only suspend again.
pub fn drive<N: NodeHandle>(
    sequence: &Sequence<N>,
    mut resolve: impl FnMut(&Pending) -> Result<(), Error>,
) -> Result<Vec<Value<N>>, Error> {
    loop {
        match sequence.get_all_values()? {
            Fetch::Ready(values) => return Ok(values),
            Fetch::NotReady(pending) => {
                tracing::debug!(pending = pending.label(), "resolving suspension");
                resolve(&pending)?;
                if !pending.is_resolved() {
                    return Err(Error::from_code(
                        ErrorCode::FOER0000,
                        format!("pending '{}' was not resolved by the driver", pending.label()),
                    ));
                }
            }
        }
    }
}

pub(crate) fn eval<N: NodeHandle>(selector: &Selector, ctx: &DynamicContext<N>) -> Result<Sequence<N>, Error> {
    match selector {
        Selector::Literal(value) => Ok(Sequence::singleton(Value::Atomic(value.clone()))),
        Selector::SequenceExpr(items) => {
            Ok(Sequence::concat(items.iter().map(|item| eval(item, ctx)).collect::<Result<_, _>>()?))
        }
        Selector::ContextItem => Ok(Sequence::singleton(ctx.context_item()?.clone())),
        Selector::VarRef(name) => ctx.lookup_variable(name),
        Selector::NameTest(_) | Selector::KindTest(_) | Selector::UniversalWildcard => {
            let verdict = match ctx.context_item()? {
                Value::Node(node) => test_node(selector, &node.handle, ctx)?,
                _ => false,
            };
            Ok(Sequence::singleton(Value::boolean(verdict)))
        }
        Selector::AxisStep { axis, test } => {
            let origin = ctx.context_node()?.handle.clone();
            Ok(Sequence::from_cursor(AxisCursor::new(*axis, origin, Arc::clone(test), ctx.clone())))
        }
        Selector::Path(steps) => path(steps, ctx),
        Selector::Filter { base, predicate } => filter(base, predicate, ctx),
        Selector::And(children) => logical(children, false, ctx),
        Selector::Or(children) => logical(children, true, ctx),
        Selector::Unary { negate, operand } => unary(*negate, operand, ctx),
        Selector::Arithmetic { op, lhs, rhs } => arithmetic(*op, lhs, rhs, ctx),
        Selector::Compare { kind, lhs, rhs } => comparison::compare_expr(*kind, lhs, rhs, ctx),
        Selector::Range { from, to } => range(from, to, ctx),
        Selector::StringConcat(parts) => string_concat(parts, ctx),
        Selector::If { test, then_branch, else_branch } => conditional(test, then_branch, else_branch, ctx),
        Selector::Quantified { quantifier, bindings, satisfies } => {
            clauses::quantified(*quantifier, bindings, satisfies, ctx)
        }
        Selector::For { bindings, body } => clauses::for_expr(bindings, body, ctx),
        Selector::Let { name, value, body } => clauses::let_expr(name, value, body, ctx),
        Selector::SimpleMap { lhs, rhs } => clauses::simple_map(lhs, rhs, ctx),
        Selector::InstanceOf { operand, sequence_type } => type_check::instance_of_expr(operand, *sequence_type, ctx),
        Selector::Cast { operand, target, allow_empty } => casting::cast_expr(operand, *target, *allow_empty, ctx),
        Selector::Castable { operand, target, allow_empty } => {
            casting::castable_expr(operand, *target, *allow_empty, ctx)
        }
        Selector::FunctionCall { name, args } => calls::static_call(name, args, ctx),
        Selector::NamedFunctionRef { name, arity } => calls::named_function_ref(name, *arity, ctx),
        Selector::DynamicFunctionCall { base, args } => calls::dynamic_call(base, args, ctx),
    }
}

/// Unwraps an operand that must hold at most one atomic value.
pub(crate) fn singleton_atomic<N>(values: Vec<Value<N>>, what: &str) -> Result<Option<AtomicValue>, Error> {
    let count = values.len();
    let mut values = values.into_iter();
    match (values.next(), values.next()) {
        (None, _) => Ok(None),
        (Some(Value::Atomic(atom)), None) => Ok(Some(atom)),
        (Some(other), None) => Err(Error::from_code(
            ErrorCode::XPTY0004,
            format!("{what} must be an atomic value, found {}", other.type_name()),
        )),
        _ => Err(Error::from_code(ErrorCode::XPTY0004, format!("{what} must be a single item, found {count}"))),
    }
}

fn empty<N: NodeHandle>() -> Result<Fetch<Sequence<N>>, Error> {
    Ok(Fetch::Ready(Sequence::empty()))
}

fn boolean<N: NodeHandle>(value: bool) -> Result<Fetch<Sequence<N>>, Error> {
    Ok(Fetch::Ready(Sequence::singleton(Value::boolean(value))))
}

/// A forward axis step from a single origin already yields document order without duplicates.
fn streams_in_order(step: &Selector) -> bool {
    matches!(step, Selector::AxisStep { axis, .. } if axis.result_order() == ResultOrder::Sorted)
}

fn path<N: NodeHandle>(steps: &[Child], ctx: &DynamicContext<N>) -> Result<Sequence<N>, Error> {
    let Some((first, rest)) = steps.split_first() else { return Ok(Sequence::empty()) };
    let mut current = eval(first, ctx)?;
    if !streams_in_order(first) {
        current = normalize(&current, ctx, rest.is_empty());
    }
    for (position, step) in rest.iter().enumerate() {
        let focus_sequence = current.clone();
        let step = Arc::clone(step);
        let scope = ctx.clone();
        current = current.flat_map(move |item, index| {
            if !matches!(item, Value::Node(_)) {
                return Err(Error::from_code(
                    ErrorCode::XPTY0019,
                    format!("path step applied to {}, which is not a node", item.type_name()),
                ));
            }
            eval(&step, &scope.scope_with_focus(index, item, Some(focus_sequence.clone())))
        });
        current = normalize(&current, ctx, position + 1 == rest.len());
    }
    Ok(current)
}

fn normalize<N: NodeHandle>(sequence: &Sequence<N>, ctx: &DynamicContext<N>, last_step: bool) -> Sequence<N> {
    let ctx = ctx.clone();
    sequence.map_all(move |values| into_document_order(values, &ctx, last_step).map(Sequence::from_values))
}

/// A single numeric predicate value selects by position, anything else by effective boolean value.
fn predicate_truth<N: NodeHandle>(result: &Sequence<N>, index: usize) -> Result<Fetch<bool>, Error> {
    if let Some(Value::Atomic(atom)) = ready!(result.item_at(0)?)
        && let Some(number) = NumKind::classify(&atom)
        && ready!(result.item_at(1)?).is_none()
    {
        #[allow(clippy::cast_precision_loss)]
        let position = (index + 1) as f64;
        return Ok(Fetch::Ready(number.to_f64() == position));
    }
    result.effective_boolean_value()
}

fn filter<N: NodeHandle>(base: &Child, predicate: &Child, ctx: &DynamicContext<N>) -> Result<Sequence<N>, Error> {
    let input = eval(base, ctx)?;
    let focus_sequence = input.clone();
    let mut items = input.iter();
    let predicate = Arc::clone(predicate);
    let ctx = ctx.clone();
    // Item whose predicate result is still being pulled.
    let mut checking: Option<(Value<N>, usize, Sequence<N>)> = None;
    Ok(Sequence::from_stepper(move || {
        loop {
            if checking.is_none() {
                let index = items.position();
                let Some(item) = ready!(items.next_item()?) else { return Ok(Fetch::Ready(None)) };
                let focus = ctx.scope_with_focus(index, item.clone(), Some(focus_sequence.clone()));
                checking = Some((item, index, eval(&predicate, &focus)?));
            }
            let keep = match &checking {
                Some((_, index, result)) => ready!(predicate_truth(result, *index)?),
                None => continue,
            };
            if let Some((item, ..)) = checking.take()
                && keep
            {
                return Ok(Fetch::Ready(Some(item)));
            }
        }
    }))
}

/// `and` stops at the first false operand, `or` at the first true one.
fn logical<N: NodeHandle>(children: &[Child], is_or: bool, ctx: &DynamicContext<N>) -> Result<Sequence<N>, Error> {
    let children = children.to_vec();
    let ctx = ctx.clone();
    let mut next = 0;
    let mut current: Option<Sequence<N>> = None;
    Ok(Sequence::deferred(move || {
        while next < children.len() {
            let operand = match &current {
                Some(operand) => operand.clone(),
                None => {
                    let operand = eval(&children[next], &ctx)?;
                    current = Some(operand.clone());
                    operand
                }
            };
            let truth = ready!(operand.effective_boolean_value()?);
            current = None;
            next += 1;
            if truth == is_or {
                return boolean(is_or);
            }
        }
        boolean(!is_or)
    }))
}

fn unary<N: NodeHandle>(negate: bool, operand: &Child, ctx: &DynamicContext<N>) -> Result<Sequence<N>, Error> {
    let input = atomize(&eval(operand, ctx)?, ctx);
    Ok(Sequence::deferred(move || {
        let values = ready!(input.get_all_values()?);
        let Some(atom) = singleton_atomic(values, "unary operand")? else { return empty() };
        let number = numeric_operand(&atom)?;
        let result = if negate { numeric::negate(number)? } else { number.into_atomic() };
        Ok(Fetch::Ready(Sequence::singleton(Value::Atomic(result))))
    }))
}

/// An empty left operand yields the empty sequence without evaluating the right one.
fn arithmetic<N: NodeHandle>(op: ArithmeticOp, lhs: &Child, rhs: &Child, ctx: &DynamicContext<N>) -> Result<Sequence<N>, Error> {
    let left = atomize(&eval(lhs, ctx)?, ctx);
    let rhs = Arc::clone(rhs);
    let ctx = ctx.clone();
    let mut right_operand: Option<Sequence<N>> = None;
    Ok(Sequence::deferred(move || {
        let values = ready!(left.get_all_values()?);
        let Some(a) = singleton_atomic(values, "arithmetic operand")? else { return empty() };
        let a = numeric_operand(&a)?;
        let right = match &right_operand {
            Some(right) => right.clone(),
            None => right_operand.insert(atomize(&eval(&rhs, &ctx)?, &ctx)).clone(),
        };
        let values = ready!(right.get_all_values()?);
        let Some(b) = singleton_atomic(values, "arithmetic operand")? else { return empty() };
        let result = numeric::arithmetic(op, a, numeric_operand(&b)?)?;
        Ok(Fetch::Ready(Sequence::singleton(Value::Atomic(result))))
    }))
}

fn range_bound<N>(values: Vec<Value<N>>) -> Result<Option<i64>, Error> {
    let Some(atom) = singleton_atomic(values, "range bound")? else { return Ok(None) };
    let atom = match atom {
        AtomicValue::UntypedAtomic(_) => cast_atomic(&atom, TypeName::Integer)?,
        other => other,
    };
    match atom {
        AtomicValue::Integer(i) => Ok(Some(i)),
        other => Err(Error::from_code(
            ErrorCode::XPTY0004,
            format!("range bounds must be integers, found {}", other.type_name()),
        )),
    }
}

/// `from to to`, produced one integer per pull.
fn range<N: NodeHandle>(from: &Child, to: &Child, ctx: &DynamicContext<N>) -> Result<Sequence<N>, Error> {
    let low = atomize(&eval(from, ctx)?, ctx);
    let high = atomize(&eval(to, ctx)?, ctx);
    Ok(Sequence::deferred(move || {
        let start = range_bound(ready!(low.get_all_values()?))?;
        let end = range_bound(ready!(high.get_all_values()?))?;
        let (Some(start), Some(end)) = (start, end) else { return empty() };
        let mut next = (start <= end).then_some(start);
        Ok(Fetch::Ready(Sequence::from_stepper(move || {
            let Some(current) = next else { return Ok(Fetch::Ready(None)) };
            next = (current < end).then(|| current + 1);
            Ok(Fetch::Ready(Some(Value::integer(current))))
        })))
    }))
}

fn string_concat<N: NodeHandle>(parts: &[Child], ctx: &DynamicContext<N>) -> Result<Sequence<N>, Error> {
    let operands: Vec<Sequence<N>> =
        parts.iter().map(|part| eval(part, ctx).map(|s| atomize(&s, ctx))).collect::<Result<_, _>>()?;
    Ok(Sequence::deferred(move || {
        let mut text = String::new();
        for operand in &operands {
            let values = ready!(operand.get_all_values()?);
            if let Some(atom) = singleton_atomic(values, "string concatenation operand")? {
                text.push_str(&atom.lexical());
            }
        }
        Ok(Fetch::Ready(Sequence::singleton(Value::string(text))))
    }))
}

/// Only the chosen branch is evaluated.
fn conditional<N: NodeHandle>(
    test: &Child,
    then_branch: &Child,
    else_branch: &Child,
    ctx: &DynamicContext<N>,
) -> Result<Sequence<N>, Error> {
    let condition = eval(test, ctx)?;
    let (then_branch, else_branch) = (Arc::clone(then_branch), Arc::clone(else_branch));
    let ctx = ctx.clone();
    Ok(Sequence::deferred(move || {
        let branch = if ready!(condition.effective_boolean_value()?) { &then_branch } else { &else_branch };
        eval(branch, &ctx).map(Fetch::Ready)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::runtime::DynamicContextBuilder;
    use crate::engine::selector::{Axis, ComparisonOp, Quantifier};
    use crate::model::simple::{SimpleNode, attr, doc, elem, text};
    use rstest::rstest;

    fn ctx() -> DynamicContext<SimpleNode> {
        let root = doc()
            .child(
                elem("list")
                    .child(elem("item").attr(attr("n", "1")).child(text("a")))
                    .child(elem("item").attr(attr("n", "2")).child(text("b")))
                    .child(elem("item").attr(attr("n", "3")).child(text("c"))),
            )
            .build();
        DynamicContextBuilder::default().with_context_node(root).build()
    }

    fn values(selector: &Selector) -> Vec<Value<SimpleNode>> {
        match evaluate_values(selector, &ctx()).unwrap() {
            Fetch::Ready(values) => values,
            Fetch::NotReady(p) => panic!("unexpected suspension on {}", p.label()),
        }
    }

    fn ints(selector: &Selector) -> Vec<i64> {
        values(selector)
            .into_iter()
            .map(|v| match v {
                Value::Atomic(AtomicValue::Integer(i)) => i,
                other => panic!("expected integer, got {other:?}"),
            })
            .collect()
    }

    fn single(selector: &Selector) -> AtomicValue {
        let values = values(selector);
        assert_eq!(values.len(), 1, "{values:?}");
        values[0].as_atomic().cloned().unwrap()
    }

    #[rstest]
    fn numeric_predicates_select_by_position() {
        let items = Selector::path(vec![Selector::child_named("list"), Selector::child_named("item")]);
        let second = Selector::filter(items, Selector::integer(2));
        let found = values(&second);
        assert_eq!(found.len(), 1);
        assert_eq!(ctx().dom_facade.string_value(&found[0].as_node().unwrap().handle), "b");
    }

    #[rstest]
    fn boolean_predicates_filter() {
        let items = Selector::path(vec![Selector::child_named("list"), Selector::child_named("item")]);
        let n_ge_2 = Selector::general(ComparisonOp::Ge, Selector::attribute_named("n"), Selector::integer(2));
        assert_eq!(values(&Selector::filter(items, n_ge_2)).len(), 2);
    }

    #[rstest]
    fn paths_are_in_document_order_without_duplicates() {
        let up_and_down = Selector::path(vec![
            Selector::descendant_named("item"),
            Selector::axis(Axis::Parent, Selector::UniversalWildcard),
            Selector::child_named("item"),
        ]);
        let found = values(&up_and_down);
        let texts: Vec<String> =
            found.iter().map(|v| ctx().dom_facade.string_value(&v.as_node().unwrap().handle)).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[rstest]
    fn mixed_last_step_is_rejected() {
        let mixed = Selector::path(vec![
            Selector::child_named("list"),
            Selector::sequence(vec![Selector::child_named("item"), Selector::integer(1)]),
        ]);
        let err = evaluate_values(&mixed, &ctx()).unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::XPTY0018);
    }

    #[rstest]
    fn atomic_intermediate_step_is_rejected() {
        let bad = Selector::path(vec![Selector::integer(1), Selector::child_named("x")]);
        let err = evaluate_values(&bad, &ctx()).unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::XPTY0019);
    }

    #[rstest]
    #[case(Selector::range(Selector::integer(2), Selector::integer(5)), vec![2, 3, 4, 5])]
    #[case(Selector::range(Selector::integer(5), Selector::integer(2)), vec![])]
    #[case(Selector::range(Selector::sequence(vec![]), Selector::integer(2)), vec![])]
    #[case(Selector::arithmetic(ArithmeticOp::Add, Selector::sequence(vec![]), Selector::var("unbound")), vec![])]
    fn integer_sequences(#[case] selector: Selector, #[case] expected: Vec<i64>) {
        assert_eq!(ints(&selector), expected);
    }

    #[rstest]
    fn and_or_short_circuit() {
        let unbound = Selector::var("missing");
        let and = Selector::and(vec![Selector::integer(0), unbound.clone()]);
        let or = Selector::or(vec![Selector::string("x"), unbound]);
        assert_eq!(single(&and), AtomicValue::Boolean(false));
        assert_eq!(single(&or), AtomicValue::Boolean(true));
    }

    #[rstest]
    fn conditional_evaluates_one_branch() {
        let selector = Selector::if_then_else(Selector::integer(1), Selector::string("yes"), Selector::var("missing"));
        assert_eq!(single(&selector), AtomicValue::String("yes".into()));
    }

    #[rstest]
    fn string_concatenation_atomizes() {
        let selector = Selector::concat_strings(vec![
            Selector::string("n="),
            Selector::path(vec![
                Selector::child_named("list"),
                Selector::filter(Selector::child_named("item"), Selector::integer(1)),
                Selector::attribute_named("n"),
            ]),
            Selector::sequence(vec![]),
        ]);
        assert_eq!(single(&selector), AtomicValue::String("n=1".into()));
    }

    #[rstest]
    fn quantifiers_over_attributes() {
        let ns = Selector::path(vec![Selector::descendant_named("item"), Selector::attribute_named("n")]);
        let some = Selector::quantified(
            Quantifier::Some,
            vec![("v", ns.clone())],
            Selector::general(ComparisonOp::Eq, Selector::var("v"), Selector::integer(3)),
        );
        let every = Selector::quantified(
            Quantifier::Every,
            vec![("v", ns)],
            Selector::general(ComparisonOp::Lt, Selector::var("v"), Selector::integer(3)),
        );
        assert_eq!(single(&some), AtomicValue::Boolean(true));
        assert_eq!(single(&every), AtomicValue::Boolean(false));
    }

    #[rstest]
    fn bare_tests_answer_for_the_context_item() {
        assert_eq!(single(&Selector::KindTest(crate::model::NodeKind::Document)), AtomicValue::Boolean(true));
        assert_eq!(single(&Selector::name("list")), AtomicValue::Boolean(false));
    }

    #[rstest]
    fn drive_rejects_unresolved_pendings() {
        let pending = Pending::new("never");
        let handed_out = pending.clone();
        let stuck: Sequence<SimpleNode> = Sequence::from_stepper(move || Ok(Fetch::NotReady(handed_out.clone())));
        let err = drive(&stuck, |_| Ok(())).unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::FOER0000);
        assert!(!pending.is_resolved());
    }
}

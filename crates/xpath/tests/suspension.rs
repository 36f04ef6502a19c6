//! Suspension propagates through every combinator and resuming never replays finished work.

mod common;

use common::*;
use rstest::rstest;
use xselect::{
    ArithmeticOp, AtomicValue, ComparisonOp, ExpandedName, Fetch, NodeKind, Quantifier, Selector, Value, XdmNode, evaluate,
    evaluate_values,
};

fn books_by_id() -> Selector {
    Selector::path(vec![Selector::descendant_named("book"), Selector::attribute_named("id")])
}

#[rstest]
fn deferred_navigation_yields_the_same_result() {
    let root = library();
    let eager = eval_all(&books_by_id(), &ctx_for(root.clone()));

    let (facade, ctx) = deferred_ctx(root);
    let (values, suspensions) = drive_counting(&evaluate(&books_by_id(), &ctx).unwrap());

    assert_eq!(strings(&values, &ctx), vec!["b1", "b2", "b3"]);
    assert_eq!(strings(&eager, &ctx), strings(&values, &ctx));
    assert_eq!(suspensions, facade.issued());
    assert!(suspensions > 0);
}

#[rstest]
fn first_pull_reports_not_ready_then_resumes() {
    let (_, ctx) = deferred_ctx(library());
    let sequence = evaluate(&Selector::child_named("library"), &ctx).unwrap();

    let Fetch::NotReady(pending) = sequence.get_all_values().unwrap() else {
        panic!("child navigation should suspend first");
    };
    assert_eq!(pending.label(), "children#0");
    pending.resolve();

    match sequence.get_all_values().unwrap() {
        Fetch::Ready(values) => assert_eq!(values.len(), 1),
        Fetch::NotReady(p) => panic!("still suspended on {}", p.label()),
    }
}

#[rstest]
fn fresh_evaluation_after_not_ready_is_a_new_pull() {
    let (_, ctx) = deferred_ctx(library());
    let first = evaluate_values(&Selector::child_named("library"), &ctx).unwrap();
    assert!(!first.is_ready());
}

#[rstest]
fn resumed_descent_asks_for_each_node_once() {
    let (facade, ctx) = deferred_ctx(library());
    let (values, _) = drive_counting(&evaluate(&Selector::descendant_named("price"), &ctx).unwrap());
    assert_eq!(strings(&values, &ctx), vec!["9.5", "4", "12.25"]);

    let answered = facade.answered_children();
    for (i, node) in answered.iter().enumerate() {
        assert!(!answered[i + 1..].contains(node), "children of {node:?} were requested twice");
    }
}

#[rstest]
fn predicates_suspend_and_resume() {
    let (_, ctx) = deferred_ctx(library());
    let selector = Selector::path(vec![
        Selector::filter(
            Selector::descendant_named("book"),
            Selector::general(ComparisonOp::Eq, Selector::attribute_named("id"), Selector::string("b2")),
        ),
        Selector::child_named("title"),
    ]);
    let values = eval_all(&selector, &ctx);
    assert_eq!(strings(&values, &ctx), vec!["Emma"]);
}

#[rstest]
fn function_arguments_and_operands_suspend() {
    let (_, ctx) = deferred_ctx(library());
    let count = Selector::function_call(
        ExpandedName::fn_name("count"),
        vec![Selector::descendant_named("book")],
        &ctx.functions,
    )
    .unwrap();
    let plus_one = Selector::arithmetic(ArithmeticOp::Add, count.clone(), Selector::integer(1));

    assert_eq!(atomics(&eval_all(&count, &ctx)), vec![AtomicValue::Integer(3)]);
    assert_eq!(atomics(&eval_all(&plus_one, &ctx)), vec![AtomicValue::Integer(4)]);
}

#[rstest]
fn sum_over_suspending_path_atomizes_untyped_prices() {
    let (_, ctx) = deferred_ctx(library());
    let sum = Selector::function_call(
        ExpandedName::fn_name("sum"),
        vec![Selector::descendant_named("price")],
        &ctx.functions,
    )
    .unwrap();
    assert_eq!(atomics(&eval_all(&sum, &ctx)), vec![AtomicValue::Double(25.75)]);
}

#[rstest]
fn matching_suspends_until_the_facade_answers() {
    let root = library();
    let book = root.children()[0].children()[0].clone();
    let (_, ctx) = deferred_ctx(root);
    let pattern = Selector::filter(Selector::ContextItem, Selector::child_named("price"));

    let Fetch::NotReady(pending) = pattern.matches(&book, &ctx).unwrap() else {
        panic!("matching needs the children of the book");
    };
    pending.resolve();
    assert!(matches!(pattern.matches(&book, &ctx).unwrap(), Fetch::Ready(true)));
}

#[rstest]
fn quantifier_over_suspending_domain() {
    let (_, ctx) = deferred_ctx(library());
    let every_book_has_title = Selector::quantified(
        Quantifier::Every,
        vec![("b", Selector::descendant_named("book"))],
        Selector::path(vec![Selector::var("b"), Selector::child_named("title")]),
    );
    assert_eq!(atomics(&eval_all(&every_book_has_title, &ctx)), vec![AtomicValue::Boolean(true)]);
}

#[rstest]
fn suspended_results_keep_node_kinds() {
    let (_, ctx) = deferred_ctx(library());
    let values = eval_all(&books_by_id(), &ctx);
    assert!(values.iter().all(|v| matches!(v, Value::Node(n) if n.kind == NodeKind::Attribute)));
}

//! Evaluation of the selector tree against an in-memory document.

mod common;

use common::*;
use rstest::rstest;
use xselect::engine::runtime::DynamicContextBuilder;
use xselect::model::simple::{SimpleNode, doc, elem};
use xselect::{
    AtomicValue, Axis, ComparisonOp, ExpandedName, Fetch, NodeKind, Quantifier, ResultOrder, Selector, Sequence,
    SequenceType, SpecificityKind, TypeName, Value, XdmNode, evaluate,
};

fn book(id: &str) -> Selector {
    Selector::filter(
        Selector::descendant_named("book"),
        Selector::general(ComparisonOp::Eq, Selector::attribute_named("id"), Selector::string(id)),
    )
}

#[rstest]
fn reverse_axis_positions_count_from_the_origin() {
    let ctx = ctx_for(library());
    let nearest = Selector::path(vec![
        book("b3"),
        Selector::filter(Selector::axis(Axis::PrecedingSibling, Selector::name("book")), Selector::integer(1)),
        Selector::attribute_named("id"),
    ]);
    assert_eq!(strings(&eval_all(&nearest, &ctx), &ctx), vec!["b2"]);
}

#[rstest]
fn paths_over_reverse_axes_come_back_in_document_order() {
    let ctx = ctx_for(library());
    let ancestors = Selector::path(vec![
        Selector::descendant_named("title"),
        Selector::axis(Axis::Ancestor, Selector::UniversalWildcard),
    ]);
    let kinds: Vec<_> = eval_all(&ancestors, &ctx)
        .into_iter()
        .map(|v| match v {
            Value::Node(n) => n.kind,
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    // document, library, three books
    assert_eq!(kinds.len(), 5);
    assert_eq!(kinds[0], NodeKind::Document);
    assert!(kinds[1..].iter().all(|k| *k == NodeKind::Element));
}

#[rstest]
fn last_and_position_follow_the_focus() {
    let ctx = ctx_for(library());
    let last = Selector::function_call(ExpandedName::fn_name("last"), vec![], &ctx.functions).unwrap();
    let final_book = Selector::path(vec![
        Selector::child_named("library"),
        Selector::filter(Selector::child_named("book"), last),
        Selector::attribute_named("id"),
    ]);
    assert_eq!(strings(&eval_all(&final_book, &ctx), &ctx), vec!["b3"]);
}

#[rstest]
fn for_let_and_simple_map_bind_in_order() {
    let ctx = ctx_for(library());
    let pairs = Selector::for_each(
        vec![("x", Selector::range(Selector::integer(1), Selector::integer(2))), ("y", Selector::sequence(vec![
            Selector::string("a"),
            Selector::string("b"),
        ]))],
        Selector::concat_strings(vec![Selector::var("x"), Selector::var("y")]),
    );
    assert_eq!(strings(&eval_all(&pairs, &ctx), &ctx), vec!["1a", "1b", "2a", "2b"]);

    let doubled = Selector::let_in(
        "n",
        Selector::integer(21),
        Selector::arithmetic(xselect::ArithmeticOp::Mul, Selector::var("n"), Selector::integer(2)),
    );
    assert_eq!(atomics(&eval_all(&doubled, &ctx)), vec![AtomicValue::Integer(42)]);

    let ids = Selector::simple_map(Selector::descendant_named("book"), Selector::attribute_named("id"));
    assert_eq!(strings(&eval_all(&ids, &ctx), &ctx), vec!["b1", "b2", "b3"]);
}

#[rstest]
fn some_over_empty_domain_is_false_and_every_is_true() {
    let ctx = ctx_for(library());
    let nothing = || vec![("v", Selector::descendant_named("magazine"))];
    let some = Selector::quantified(Quantifier::Some, nothing(), Selector::ContextItem);
    let every = Selector::quantified(Quantifier::Every, nothing(), Selector::ContextItem);
    assert_eq!(atomics(&eval_all(&some, &ctx)), vec![AtomicValue::Boolean(false)]);
    assert_eq!(atomics(&eval_all(&every, &ctx)), vec![AtomicValue::Boolean(true)]);
}

#[rstest]
fn quantifier_over_two_bindings_tries_every_combination() {
    let ctx = ctx_for(library());
    let small = || Selector::range(Selector::integer(1), Selector::integer(3));
    // some x, y in 1..3 satisfies x * y = 6
    let found = Selector::quantified(
        Quantifier::Some,
        vec![("x", small()), ("y", small())],
        Selector::compare(
            xselect::CompareKind::Value(ComparisonOp::Eq),
            Selector::arithmetic(xselect::ArithmeticOp::Mul, Selector::var("x"), Selector::var("y")),
            Selector::integer(6),
        ),
    );
    assert_eq!(atomics(&eval_all(&found, &ctx)), vec![AtomicValue::Boolean(true)]);
}

#[rstest]
#[case(Selector::cast(Selector::string("12"), TypeName::Integer, false), AtomicValue::Integer(12))]
#[case(Selector::castable(Selector::string("abc"), TypeName::Integer, false), AtomicValue::Boolean(false))]
#[case(Selector::castable(Selector::sequence(vec![]), TypeName::Integer, true), AtomicValue::Boolean(true))]
#[case(
    Selector::instance_of(Selector::integer(1), SequenceType::one(TypeName::Decimal)),
    AtomicValue::Boolean(true)
)]
#[case(
    Selector::instance_of(Selector::sequence(vec![]), SequenceType::one(TypeName::Integer)),
    AtomicValue::Boolean(false)
)]
fn casts_and_type_tests(#[case] selector: Selector, #[case] expected: AtomicValue) {
    let ctx = ctx_for(library());
    assert_eq!(atomics(&eval_all(&selector, &ctx)), vec![expected]);
}

#[rstest]
fn failed_cast_reports_the_value() {
    let ctx = ctx_for(library());
    let selector = Selector::cast(Selector::string("abc"), TypeName::Integer, false);
    assert_eq!(eval_err(&selector, &ctx), "err:FORG0001");
}

#[rstest]
fn variables_come_from_the_builder() {
    let ctx = DynamicContextBuilder::<SimpleNode>::default()
        .with_context_node(library())
        .with_variable(ExpandedName::local("limit"), Sequence::singleton(Value::integer(5)))
        .build();
    let cheap = Selector::path(vec![
        Selector::filter(
            Selector::descendant_named("book"),
            Selector::general(ComparisonOp::Lt, Selector::child_named("price"), Selector::var("limit")),
        ),
        Selector::child_named("title"),
    ]);
    assert_eq!(strings(&eval_all(&cheap, &ctx), &ctx), vec!["Emma"]);
    assert_eq!(eval_err(&Selector::var("missing"), &ctx), "err:XPST0008");
}

#[rstest]
fn range_is_pulled_lazily() {
    let ctx = ctx_for(library());
    let huge = evaluate(&Selector::range(Selector::integer(1), Selector::integer(i64::MAX)), &ctx).unwrap();
    let Fetch::Ready(Some(third)) = huge.item_at(2).unwrap() else { panic!("range should produce items") };
    assert_eq!(third.as_atomic(), Some(&AtomicValue::Integer(3)));
    assert_eq!(huge.known_len(), None);
}

#[rstest]
fn prefixed_name_tests_resolve_through_the_context() {
    let root = doc()
        .child(
            elem("r")
                .child(SimpleNode::element_ns(Some("p"), "leaf", "urn:p"))
                .child(elem("leaf")),
        )
        .build();
    let ctx = DynamicContextBuilder::<SimpleNode>::default()
        .with_context_node(root)
        .with_namespace("q", "urn:p")
        .build();
    let test = Selector::NameTest(xselect::NameTest {
        namespace: xselect::NamespaceTest::Prefix(Some("q".to_string())),
        local: Some("leaf".to_string()),
    });
    let found = eval_all(&Selector::axis(Axis::Descendant, test), &ctx);
    assert_eq!(found.len(), 1);

    let unbound = Selector::NameTest(xselect::NameTest {
        namespace: xselect::NamespaceTest::Prefix(Some("zz".to_string())),
        local: Some("leaf".to_string()),
    });
    assert_eq!(eval_err(&Selector::axis(Axis::Descendant, unbound), &ctx), "err:XPST0081");
}

#[rstest]
fn matches_answers_patterns_from_the_node() {
    let root = library();
    let ctx = ctx_for(root.clone());
    let first_book = root.children()[0].children()[0].clone();
    let id = first_book.attributes()[0].clone();

    let book_child = Selector::axis(Axis::Child, Selector::name("book"));
    let id_attr = Selector::attribute_named("id");
    assert!(matches!(book_child.matches(&first_book, &ctx).unwrap(), Fetch::Ready(true)));
    assert!(matches!(book_child.matches(&id, &ctx).unwrap(), Fetch::Ready(false)));
    assert!(matches!(id_attr.matches(&id, &ctx).unwrap(), Fetch::Ready(true)));
    assert!(matches!(Selector::or(vec![book_child, id_attr]).matches(&id, &ctx).unwrap(), Fetch::Ready(true)));
}

#[rstest]
fn static_properties_of_a_selector() {
    let selector = Selector::path(vec![
        Selector::descendant_named("book"),
        Selector::attribute_named("id"),
    ]);
    let specificity = selector.specificity();
    assert_eq!(specificity.get(SpecificityKind::NodeName), 2);
    assert_eq!(specificity.get(SpecificityKind::Attribute), 1);
    assert_eq!(selector.expected_result_order(), ResultOrder::Sorted);
    assert!(selector.equals(&selector.clone()));
    assert!(!selector.equals(&Selector::descendant_named("book")));
    assert_eq!(Selector::child_named("book").bucket(), Some(xselect::Bucket::Name("book".to_string())));
}

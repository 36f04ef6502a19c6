//! `instance of` and the conversion applied to function arguments.

use crate::engine::runtime::{DynamicContext, Error, ErrorCode};
use crate::engine::selector::Child;
use crate::ready;
use crate::xdm::{AtomicValue, Fetch, NodeHandle, Sequence, SequenceType, TypeName, Value};

use super::casting::{atomize_values, cast_atomic, parse_double};
use super::eval;

pub(crate) fn instance_of<N>(values: &[Value<N>], expected: &SequenceType) -> bool {
    expected.occurrence.allows(values.len()) && values.iter().all(|v| v.type_name().is_subtype_of(expected.item))
}

pub(super) fn instance_of_expr<N: NodeHandle>(operand: &Child, expected: SequenceType, ctx: &DynamicContext<N>) -> Result<Sequence<N>, Error> {
    let input = eval(operand, ctx)?;
    Ok(Sequence::deferred(move || {
        let values = ready!(input.get_all_values()?);
        Ok(Fetch::Ready(Sequence::singleton(Value::boolean(instance_of(&values, &expected)))))
    }))
}

/// Untyped values are cast to the expected type; numerics and URIs are promoted.
fn promote(atom: AtomicValue, target: TypeName) -> Result<AtomicValue, Error> {
    Ok(match (atom, target) {
        (atom @ AtomicValue::UntypedAtomic(_), TypeName::AnyAtomicType | TypeName::UntypedAtomic | TypeName::Item) => atom,
        (AtomicValue::UntypedAtomic(s), TypeName::Numeric | TypeName::Double) => AtomicValue::Double(parse_double(&s)?),
        (atom @ AtomicValue::UntypedAtomic(_), target) => cast_atomic(&atom, target)?,
        (atom, TypeName::Double) if atom.is_numeric() => cast_atomic(&atom, TypeName::Double)?,
        (atom @ (AtomicValue::Integer(_) | AtomicValue::Decimal(_)), TypeName::Float) => cast_atomic(&atom, TypeName::Float)?,
        (AtomicValue::AnyUri(s), TypeName::String) => AtomicValue::String(s),
        (atom, _) => atom,
    })
}

/// Applies the function conversion rules for one argument.
///
/// `item()*` parameters receive the argument untouched, still lazy. Everything else is materialized,
/// atomized when an atomic type is expected, promoted, and checked against the declared type.
pub(crate) fn convert_argument<N: NodeHandle>(
    argument: &Sequence<N>,
    expected: &SequenceType,
    ctx: &DynamicContext<N>,
    function: &str,
    position: usize,
) -> Result<Fetch<Sequence<N>>, Error> {
    if expected.accepts_anything() {
        return Ok(Fetch::Ready(argument.clone()));
    }
    let values = ready!(argument.get_all_values()?);
    let converted: Vec<Value<N>> = if expected.item.is_atomic() {
        atomize_values(&values, ctx.dom_facade.as_ref())?
            .into_iter()
            .map(|atom| promote(atom, expected.item).map(Value::Atomic))
            .collect::<Result<_, _>>()?
    } else {
        values
    };
    let mismatch = |found: String| {
        Error::from_code(
            ErrorCode::XPTY0004,
            format!("argument {} of {function} must be {expected}, found {found}", position + 1),
        )
    };
    if !expected.occurrence.allows(converted.len()) {
        return Err(mismatch(format!("{} items", converted.len())));
    }
    if let Some(wrong) = converted.iter().find(|v| !v.type_name().is_subtype_of(expected.item)) {
        return Err(mismatch(wrong.type_name().to_string()));
    }
    Ok(Fetch::Ready(Sequence::from_values(converted)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xdm::Occurrence;
    use rstest::rstest;

    #[rstest]
    #[case(vec![Value::integer(1)], SequenceType::one(TypeName::Decimal), true)]
    #[case(vec![Value::integer(1), Value::integer(2)], SequenceType::one(TypeName::Integer), false)]
    #[case(vec![], SequenceType::optional(TypeName::String), true)]
    #[case(vec![], SequenceType::new(TypeName::Item, Occurrence::OneOrMore), false)]
    #[case(vec![Value::string("a")], SequenceType::many(TypeName::Numeric), false)]
    fn instance_checks(#[case] values: Vec<Value<()>>, #[case] expected: SequenceType, #[case] result: bool) {
        assert_eq!(instance_of(&values, &expected), result);
    }

    #[rstest]
    #[case(AtomicValue::UntypedAtomic("2".into()), TypeName::Numeric, AtomicValue::Double(2.0))]
    #[case(AtomicValue::Integer(2), TypeName::Double, AtomicValue::Double(2.0))]
    #[case(AtomicValue::AnyUri("u".into()), TypeName::String, AtomicValue::String("u".into()))]
    #[case(AtomicValue::UntypedAtomic("x".into()), TypeName::String, AtomicValue::String("x".into()))]
    #[case(AtomicValue::Integer(2), TypeName::Decimal, AtomicValue::Integer(2))]
    fn promotions(#[case] atom: AtomicValue, #[case] target: TypeName, #[case] expected: AtomicValue) {
        assert_eq!(promote(atom, target).unwrap(), expected);
    }
}

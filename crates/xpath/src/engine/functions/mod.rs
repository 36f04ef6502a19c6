//! Builtin function library.
//!
//! Every function receives its arguments already converted to the declared parameter types, so
//! typed arguments arrive materialized. Parameters declared `item()*` are handed over lazily and the
//! function decides how much of them to pull.

use crate::consts::{EXT_NS, FNS};
use crate::engine::registry::FunctionRegistry;
use crate::engine::runtime::{DynamicContext, Error, ErrorCode};
use crate::xdm::{AtomicValue, ExpandedName, NodeHandle, ParamSpec, Sequence, SequenceType, TypeName, Value};

mod boolean;
mod context;
mod datetime;
mod ext;
mod higher_order;
mod numeric;
mod regex;
mod sequences;
mod strings;

const ANY: SequenceType = SequenceType::any();
const ITEM_OPT: SequenceType = SequenceType::optional(TypeName::Item);
const ATOMS: SequenceType = SequenceType::many(TypeName::AnyAtomicType);
const ATOM: SequenceType = SequenceType::one(TypeName::AnyAtomicType);
const ATOM_OPT: SequenceType = SequenceType::optional(TypeName::AnyAtomicType);
const STRING: SequenceType = SequenceType::one(TypeName::String);
const STRING_OPT: SequenceType = SequenceType::optional(TypeName::String);
const STRINGS: SequenceType = SequenceType::many(TypeName::String);
const NUMERIC_OPT: SequenceType = SequenceType::optional(TypeName::Numeric);
const DOUBLE: SequenceType = SequenceType::one(TypeName::Double);
const INTEGER: SequenceType = SequenceType::one(TypeName::Integer);
const BOOLEAN: SequenceType = SequenceType::one(TypeName::Boolean);
const NODE_OPT: SequenceType = SequenceType::optional(TypeName::Node);
const NODES: SequenceType = SequenceType::many(TypeName::Node);
const FUNCTION: SequenceType = SequenceType::one(TypeName::Function);
const QNAME: SequenceType = SequenceType::one(TypeName::QName);
const QNAME_OPT: SequenceType = SequenceType::optional(TypeName::QName);
const DATE_TIME: SequenceType = SequenceType::one(TypeName::DateTime);
const DATE: SequenceType = SequenceType::one(TypeName::Date);
const TIME: SequenceType = SequenceType::one(TypeName::Time);
const DAY_TIME_DURATION: SequenceType = SequenceType::one(TypeName::DayTimeDuration);
const NODE: SequenceType = SequenceType::one(TypeName::Node);

pub(crate) fn register_builtins<N: NodeHandle>(reg: &mut FunctionRegistry<N>) {
    macro_rules! reg {
        ($ns:expr, $local:expr, [$($param:expr),* $(,)?], $ret:expr, $func:expr $(,)?) => {
            reg.register_fn(ExpandedName::in_ns($ns, $local), vec![$(ParamSpec::Type($param)),*], $ret, $func)
        };
    }
    macro_rules! reg_variadic {
        ($ns:expr, $local:expr, [$($param:expr),+ $(,)?], $ret:expr, $func:expr $(,)?) => {
            reg.register_fn(
                ExpandedName::in_ns($ns, $local),
                vec![$(ParamSpec::Type($param)),+, ParamSpec::Variadic],
                $ret,
                $func,
            )
        };
    }

    // ===== Booleans =====
    reg!(FNS, "true", [], BOOLEAN, boolean::true_fn::<N>);
    reg!(FNS, "false", [], BOOLEAN, boolean::false_fn::<N>);
    reg!(FNS, "not", [ANY], BOOLEAN, boolean::not_fn::<N>);
    reg!(FNS, "boolean", [ANY], BOOLEAN, boolean::boolean_fn::<N>);

    // ===== Sequences =====
    reg!(FNS, "empty", [ANY], BOOLEAN, sequences::empty_fn::<N>);
    reg!(FNS, "exists", [ANY], BOOLEAN, sequences::exists_fn::<N>);
    reg!(FNS, "count", [ANY], INTEGER, sequences::count_fn::<N>);
    reg!(FNS, "head", [ANY], ITEM_OPT, sequences::head_fn::<N>);
    reg!(FNS, "tail", [ANY], ANY, sequences::tail_fn::<N>);
    reg!(FNS, "insert-before", [ANY, INTEGER, ANY], ANY, sequences::insert_before_fn::<N>);
    reg!(FNS, "remove", [ANY, INTEGER], ANY, sequences::remove_fn::<N>);
    reg!(FNS, "reverse", [ANY], ANY, sequences::reverse_fn::<N>);
    reg!(FNS, "subsequence", [ANY, DOUBLE], ANY, sequences::subsequence_fn::<N>);
    reg!(FNS, "subsequence", [ANY, DOUBLE, DOUBLE], ANY, sequences::subsequence_fn::<N>);
    reg!(FNS, "exactly-one", [ANY], SequenceType::one(TypeName::Item), sequences::exactly_one_fn::<N>);
    reg!(FNS, "zero-or-one", [ANY], ITEM_OPT, sequences::zero_or_one_fn::<N>);
    reg!(FNS, "one-or-more", [ANY], SequenceType::new(TypeName::Item, crate::xdm::Occurrence::OneOrMore), sequences::one_or_more_fn::<N>);
    reg!(FNS, "data", [ANY], ATOMS, sequences::data_fn::<N>);
    reg!(FNS, "distinct-values", [ATOMS], ATOMS, sequences::distinct_values_fn::<N>);
    reg!(FNS, "index-of", [ATOMS, ATOM], SequenceType::many(TypeName::Integer), sequences::index_of_fn::<N>);

    // ===== Numerics and aggregates =====
    reg!(FNS, "sum", [ATOMS], ATOM, numeric::sum_fn::<N>);
    reg!(FNS, "sum", [ATOMS, ATOM_OPT], ATOM_OPT, numeric::sum_fn::<N>);
    reg!(FNS, "avg", [ATOMS], ATOM_OPT, numeric::avg_fn::<N>);
    reg!(FNS, "min", [ATOMS], ATOM_OPT, numeric::min_fn::<N>);
    reg!(FNS, "max", [ATOMS], ATOM_OPT, numeric::max_fn::<N>);
    reg!(FNS, "abs", [NUMERIC_OPT], NUMERIC_OPT, numeric::abs_fn::<N>);
    reg!(FNS, "floor", [NUMERIC_OPT], NUMERIC_OPT, numeric::floor_fn::<N>);
    reg!(FNS, "ceiling", [NUMERIC_OPT], NUMERIC_OPT, numeric::ceiling_fn::<N>);
    reg!(FNS, "round", [NUMERIC_OPT], NUMERIC_OPT, numeric::round_fn::<N>);
    reg!(FNS, "number", [], DOUBLE, numeric::number_fn::<N>);
    reg!(FNS, "number", [ATOM_OPT], DOUBLE, numeric::number_fn::<N>);

    // ===== Strings =====
    reg!(FNS, "string", [], STRING, strings::string_fn::<N>);
    reg!(FNS, "string", [ITEM_OPT], STRING, strings::string_fn::<N>);
    reg_variadic!(FNS, "concat", [ATOM_OPT, ATOM_OPT], STRING, strings::concat_fn::<N>);
    reg!(FNS, "string-length", [], INTEGER, strings::string_length_fn::<N>);
    reg!(FNS, "string-length", [STRING_OPT], INTEGER, strings::string_length_fn::<N>);
    reg!(FNS, "contains", [STRING_OPT, STRING_OPT], BOOLEAN, strings::contains_fn::<N>);
    reg!(FNS, "starts-with", [STRING_OPT, STRING_OPT], BOOLEAN, strings::starts_with_fn::<N>);
    reg!(FNS, "ends-with", [STRING_OPT, STRING_OPT], BOOLEAN, strings::ends_with_fn::<N>);
    reg!(FNS, "upper-case", [STRING_OPT], STRING, strings::upper_case_fn::<N>);
    reg!(FNS, "lower-case", [STRING_OPT], STRING, strings::lower_case_fn::<N>);
    reg!(FNS, "string-join", [STRINGS], STRING, strings::string_join_fn::<N>);
    reg!(FNS, "string-join", [STRINGS, STRING], STRING, strings::string_join_fn::<N>);
    reg!(FNS, "substring", [STRING_OPT, DOUBLE], STRING, strings::substring_fn::<N>);
    reg!(FNS, "substring", [STRING_OPT, DOUBLE, DOUBLE], STRING, strings::substring_fn::<N>);
    reg!(FNS, "normalize-space", [], STRING, strings::normalize_space_fn::<N>);
    reg!(FNS, "normalize-space", [STRING_OPT], STRING, strings::normalize_space_fn::<N>);
    reg!(FNS, "matches", [STRING_OPT, STRING], BOOLEAN, regex::matches_fn::<N>);
    reg!(FNS, "matches", [STRING_OPT, STRING, STRING], BOOLEAN, regex::matches_fn::<N>);
    reg!(FNS, "replace", [STRING_OPT, STRING, STRING], STRING, regex::replace_fn::<N>);
    reg!(FNS, "replace", [STRING_OPT, STRING, STRING, STRING], STRING, regex::replace_fn::<N>);
    reg!(FNS, "tokenize", [STRING_OPT], STRINGS, regex::tokenize_fn::<N>);
    reg!(FNS, "tokenize", [STRING_OPT, STRING], STRINGS, regex::tokenize_fn::<N>);
    reg!(FNS, "tokenize", [STRING_OPT, STRING, STRING], STRINGS, regex::tokenize_fn::<N>);

    // ===== Focus and nodes =====
    reg!(FNS, "position", [], INTEGER, context::position_fn::<N>);
    reg!(FNS, "last", [], INTEGER, context::last_fn::<N>);
    reg!(FNS, "name", [], STRING, context::name_fn::<N>);
    reg!(FNS, "name", [NODE_OPT], STRING, context::name_fn::<N>);
    reg!(FNS, "local-name", [], STRING, context::local_name_fn::<N>);
    reg!(FNS, "local-name", [NODE_OPT], STRING, context::local_name_fn::<N>);
    reg!(FNS, "namespace-uri", [], SequenceType::one(TypeName::AnyUri), context::namespace_uri_fn::<N>);
    reg!(FNS, "namespace-uri", [NODE_OPT], SequenceType::one(TypeName::AnyUri), context::namespace_uri_fn::<N>);
    reg!(FNS, "root", [], NODE, context::root_fn::<N>);
    reg!(FNS, "root", [NODE_OPT], NODE_OPT, context::root_fn::<N>);

    // ===== Date and time =====
    reg!(FNS, "current-dateTime", [], DATE_TIME, datetime::current_date_time_fn::<N>);
    reg!(FNS, "current-date", [], DATE, datetime::current_date_fn::<N>);
    reg!(FNS, "current-time", [], TIME, datetime::current_time_fn::<N>);
    reg!(FNS, "implicit-timezone", [], DAY_TIME_DURATION, datetime::implicit_timezone_fn::<N>);

    // ===== Function items =====
    reg!(FNS, "function-arity", [FUNCTION], INTEGER, higher_order::function_arity_fn::<N>);
    reg!(FNS, "function-name", [FUNCTION], QNAME_OPT, higher_order::function_name_fn::<N>);
    reg!(FNS, "for-each", [ANY, FUNCTION], ANY, higher_order::for_each_fn::<N>);
    reg!(FNS, "filter", [ANY, FUNCTION], ANY, higher_order::filter_fn::<N>);
    reg!(FNS, "function-lookup", [QNAME, INTEGER], SequenceType::optional(TypeName::Function), higher_order::function_lookup_fn::<N>);

    // ===== Extensions =====
    reg!(EXT_NS, "evaluate", [STRING], ANY, ext::evaluate_fn::<N>);
    reg!(EXT_NS, "create-text", [STRING], NODE, ext::create_text_fn::<N>);
    reg!(EXT_NS, "create-element", [STRING], NODE, ext::create_element_fn::<N>);
    reg!(EXT_NS, "create-element", [STRING, NODES], NODE, ext::create_element_fn::<N>);
}

/// Values of an argument the call machinery has already converted and materialized.
fn converted<N: NodeHandle>(arg: &Sequence<N>) -> Result<Vec<Value<N>>, Error> {
    arg.materialized()
        .ok_or_else(|| Error::from_code(ErrorCode::FOER0000, "typed argument reached the function unconverted"))
}

fn atoms<N: NodeHandle>(arg: &Sequence<N>) -> Result<Vec<AtomicValue>, Error> {
    Ok(converted(arg)?
        .into_iter()
        .filter_map(|v| match v {
            Value::Atomic(a) => Some(a),
            _ => None,
        })
        .collect())
}

fn opt_atom<N: NodeHandle>(arg: &Sequence<N>) -> Result<Option<AtomicValue>, Error> {
    Ok(atoms(arg)?.into_iter().next())
}

/// `xs:string?` argument; the empty sequence reads as `""`.
fn string_arg<N: NodeHandle>(arg: &Sequence<N>) -> Result<String, Error> {
    Ok(opt_atom(arg)?.map(|a| a.lexical()).unwrap_or_default())
}

fn integer_arg<N: NodeHandle>(arg: &Sequence<N>) -> Result<i64, Error> {
    match opt_atom(arg)? {
        Some(AtomicValue::Integer(i)) => Ok(i),
        other => Err(Error::from_code(
            ErrorCode::XPTY0004,
            format!("expected xs:integer, found {}", other.map_or("empty sequence".to_string(), |a| a.type_name().to_string())),
        )),
    }
}

fn double_arg<N: NodeHandle>(arg: &Sequence<N>) -> Result<f64, Error> {
    match opt_atom(arg)? {
        Some(AtomicValue::Double(d)) => Ok(d),
        other => Err(Error::from_code(
            ErrorCode::XPTY0004,
            format!("expected xs:double, found {}", other.map_or("empty sequence".to_string(), |a| a.type_name().to_string())),
        )),
    }
}

/// The first argument, or the context item for the zero-argument form.
fn item_or_focus<N: NodeHandle>(ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Option<Value<N>>, Error> {
    match args.first() {
        Some(arg) => Ok(converted(arg)?.into_iter().next()),
        None => Ok(Some(ctx.context_item()?.clone())),
    }
}

fn string_value<N: NodeHandle>(value: &Value<N>, ctx: &DynamicContext<N>) -> Result<String, Error> {
    match value {
        Value::Atomic(a) => Ok(a.lexical()),
        Value::Node(node) => Ok(ctx.dom_facade.string_value(&node.handle)),
        Value::Function(f) => Err(Error::from_code(
            ErrorCode::FOTY0013,
            format!("function {} has no string value", f.display_name()),
        )),
    }
}

fn atomic<N: NodeHandle>(value: AtomicValue) -> Result<Sequence<N>, Error> {
    Ok(Sequence::singleton(Value::Atomic(value)))
}

fn optional<N: NodeHandle>(value: Option<AtomicValue>) -> Result<Sequence<N>, Error> {
    Ok(value.map_or_else(Sequence::empty, |a| Sequence::singleton(Value::Atomic(a))))
}

fn boolean_result<N: NodeHandle>(b: bool) -> Result<Sequence<N>, Error> {
    atomic(AtomicValue::Boolean(b))
}

fn string_result<N: NodeHandle>(s: impl Into<String>) -> Result<Sequence<N>, Error> {
    atomic(AtomicValue::String(s.into()))
}

fn integer_result<N: NodeHandle>(i: i64) -> Result<Sequence<N>, Error> {
    atomic(AtomicValue::Integer(i))
}

fn count_as_integer(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

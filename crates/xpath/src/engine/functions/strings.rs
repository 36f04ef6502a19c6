use crate::engine::runtime::{DynamicContext, Error};
use crate::xdm::{NodeHandle, Sequence};

use super::{
    boolean_result, converted, count_as_integer, double_arg, integer_result, item_or_focus, string_arg, string_result,
    string_value,
};

/// String value of the argument or, without arguments, of the context item.
fn focus_string<N: NodeHandle>(ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<String, Error> {
    match item_or_focus(ctx, args)? {
        Some(item) => string_value(&item, ctx),
        None => Ok(String::new()),
    }
}

pub(super) fn string_fn<N: NodeHandle>(ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    string_result(focus_string(ctx, args)?)
}

pub(super) fn concat_fn<N: NodeHandle>(_ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    let mut out = String::new();
    for arg in args {
        out.push_str(&string_arg(arg)?);
    }
    string_result(out)
}

pub(super) fn string_length_fn<N: NodeHandle>(ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    integer_result(count_as_integer(focus_string(ctx, args)?.chars().count()))
}

fn string_pair<N: NodeHandle>(args: &[Sequence<N>], test: fn(&str, &str) -> bool) -> Result<Sequence<N>, Error> {
    boolean_result(test(&string_arg(&args[0])?, &string_arg(&args[1])?))
}

pub(super) fn contains_fn<N: NodeHandle>(_ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    string_pair(args, |s, sub| s.contains(sub))
}

pub(super) fn starts_with_fn<N: NodeHandle>(_ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    string_pair(args, |s, prefix| s.starts_with(prefix))
}

pub(super) fn ends_with_fn<N: NodeHandle>(_ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    string_pair(args, |s, suffix| s.ends_with(suffix))
}

pub(super) fn upper_case_fn<N: NodeHandle>(_ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    string_result(string_arg(&args[0])?.to_uppercase())
}

pub(super) fn lower_case_fn<N: NodeHandle>(_ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    string_result(string_arg(&args[0])?.to_lowercase())
}

pub(super) fn string_join_fn<N: NodeHandle>(_ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    let separator = match args.get(1) {
        Some(sep) => string_arg(sep)?,
        None => String::new(),
    };
    let parts: Vec<String> = converted(&args[0])?
        .iter()
        .filter_map(|v| v.as_atomic().map(crate::xdm::AtomicValue::lexical))
        .collect();
    string_result(parts.join(&separator))
}

/// Characters at 1-based positions `p` with `round(start) <= p < round(start) + round(length)`.
pub(super) fn substring_fn<N: NodeHandle>(_ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    let source = string_arg(&args[0])?;
    let start = round_half_up(double_arg(&args[1])?);
    let end = match args.get(2) {
        Some(length) => start + round_half_up(double_arg(length)?),
        None => f64::INFINITY,
    };
    #[allow(clippy::cast_precision_loss)]
    let picked: String = source
        .chars()
        .enumerate()
        .filter(|(i, _)| {
            let position = (i + 1) as f64;
            position >= start && position < end
        })
        .map(|(_, c)| c)
        .collect();
    string_result(picked)
}

fn round_half_up(x: f64) -> f64 {
    (x + 0.5).floor()
}

pub(super) fn normalize_space_fn<N: NodeHandle>(ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    let text = focus_string(ctx, args)?;
    string_result(text.split_whitespace().collect::<Vec<_>>().join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::runtime::DynamicContextBuilder;
    use crate::model::simple::SimpleNode;
    use crate::xdm::{AtomicValue, Value};
    use rstest::rstest;

    fn call(f: fn(&DynamicContext<SimpleNode>, &[Sequence<SimpleNode>]) -> Result<Sequence<SimpleNode>, Error>, args: Vec<Value<SimpleNode>>) -> String {
        let ctx = DynamicContextBuilder::<SimpleNode>::default().build();
        let args: Vec<Sequence<SimpleNode>> = args.into_iter().map(Sequence::singleton).collect();
        let result = f(&ctx, &args).unwrap().materialized().unwrap();
        result[0].as_atomic().map(AtomicValue::lexical).unwrap()
    }

    #[rstest]
    #[case("12345", 2.0, Some(3.0), "234")]
    #[case("12345", 1.5, Some(2.6), "234")]
    #[case("12345", 0.0, Some(3.0), "12")]
    #[case("12345", 5.0, Some(-3.0), "")]
    #[case("12345", -3.0, Some(5.0), "1")]
    #[case("12345", f64::NAN, Some(3.0), "")]
    #[case("12345", -42.0, Some(f64::INFINITY), "12345")]
    #[case("motor car", 6.0, None, " car")]
    fn substrings(#[case] source: &str, #[case] start: f64, #[case] length: Option<f64>, #[case] expected: &str) {
        let mut args = vec![Value::string(source), Value::double(start)];
        args.extend(length.map(Value::double));
        assert_eq!(call(substring_fn, args), expected);
    }

    #[rstest]
    #[case(starts_with_fn, "tattoo", "tat", "true")]
    #[case(starts_with_fn, "tattoo", "att", "false")]
    #[case(starts_with_fn, "abc", "", "true")]
    #[case(ends_with_fn, "tattoo", "too", "true")]
    #[case(ends_with_fn, "tattoo", "tat", "false")]
    #[case(ends_with_fn, "", "", "true")]
    fn affix_tests(
        #[case] f: fn(&DynamicContext<SimpleNode>, &[Sequence<SimpleNode>]) -> Result<Sequence<SimpleNode>, Error>,
        #[case] source: &str,
        #[case] affix: &str,
        #[case] expected: &str,
    ) {
        assert_eq!(call(f, vec![Value::string(source), Value::string(affix)]), expected);
    }

    #[rstest]
    fn normalize_space_collapses_runs() {
        assert_eq!(call(normalize_space_fn, vec![Value::string("  a \t b\n\nc ")]), "a b c");
    }
}

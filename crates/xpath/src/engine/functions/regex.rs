//! `matches`, `replace` and `tokenize` on top of `fancy-regex`.

use fancy_regex::Regex;

use crate::engine::runtime::{DynamicContext, Error, ErrorCode};
use crate::xdm::{NodeHandle, Sequence, Value};

use super::{boolean_result, string_arg, string_result};

/// Compiles an XPath pattern with its flag string (`s`, `m`, `i`, `x`, `q`).
fn compile(pattern: &str, flags: &str) -> Result<Regex, Error> {
    let mut inline = String::new();
    let mut literal = false;
    for flag in flags.chars() {
        match flag {
            's' | 'm' | 'i' | 'x' => {
                if !inline.contains(flag) {
                    inline.push(flag);
                }
            }
            'q' => literal = true,
            other => {
                return Err(Error::from_code(ErrorCode::FORX0001, format!("invalid regular expression flag '{other}'")));
            }
        }
    }
    let body = if literal { fancy_regex::escape(pattern).into_owned() } else { pattern.to_string() };
    let source = if inline.is_empty() { body } else { format!("(?{inline}){body}") };
    Ok(Regex::new(&source)?)
}

fn flags_arg<N: NodeHandle>(args: &[Sequence<N>], index: usize) -> Result<String, Error> {
    args.get(index).map_or_else(|| Ok(String::new()), string_arg)
}

pub(super) fn matches_fn<N: NodeHandle>(_ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    let input = string_arg(&args[0])?;
    let regex = compile(&string_arg(&args[1])?, &flags_arg(args, 2)?)?;
    boolean_result(regex.is_match(&input)?)
}

fn matches_empty(regex: &Regex) -> Result<(), Error> {
    if regex.is_match("")? {
        return Err(Error::from_code(ErrorCode::FORX0003, format!("pattern '{}' matches the empty string", regex.as_str())));
    }
    Ok(())
}

enum Piece {
    Literal(String),
    Group(usize),
}

/// Parses `$n` group references and `\$`, `\\` escapes. A reference takes as many digits as still
/// name an existing group.
fn parse_replacement(replacement: &str, groups: usize) -> Result<Vec<Piece>, Error> {
    let invalid = || Error::from_code(ErrorCode::FORX0004, format!("invalid replacement string '{replacement}'"));
    let mut pieces = Vec::new();
    let mut literal = String::new();
    let mut chars = replacement.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped @ ('\\' | '$')) => literal.push(escaped),
                _ => return Err(invalid()),
            },
            '$' => {
                let mut group = match chars.next().and_then(|d| d.to_digit(10)) {
                    Some(d) => d as usize,
                    None => return Err(invalid()),
                };
                while let Some(d) = chars.peek().and_then(|d| d.to_digit(10)) {
                    let longer = group * 10 + d as usize;
                    if longer >= groups {
                        break;
                    }
                    group = longer;
                    chars.next();
                }
                if !literal.is_empty() {
                    pieces.push(Piece::Literal(std::mem::take(&mut literal)));
                }
                pieces.push(Piece::Group(group));
            }
            other => literal.push(other),
        }
    }
    if !literal.is_empty() {
        pieces.push(Piece::Literal(literal));
    }
    Ok(pieces)
}

pub(super) fn replace_fn<N: NodeHandle>(_ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    let input = string_arg(&args[0])?;
    let regex = compile(&string_arg(&args[1])?, &flags_arg(args, 3)?)?;
    matches_empty(&regex)?;
    let pieces = parse_replacement(&string_arg(&args[2])?, regex.captures_len())?;
    let mut out = String::with_capacity(input.len());
    let mut last = 0;
    for captures in regex.captures_iter(&input) {
        let captures = captures?;
        let Some(whole) = captures.get(0) else { continue };
        out.push_str(&input[last..whole.start()]);
        for piece in &pieces {
            match piece {
                Piece::Literal(text) => out.push_str(text),
                Piece::Group(index) => out.push_str(captures.get(*index).map_or("", |m| m.as_str())),
            }
        }
        last = whole.end();
    }
    out.push_str(&input[last..]);
    string_result(out)
}

/// One-argument form splits on whitespace after trimming.
pub(super) fn tokenize_fn<N: NodeHandle>(_ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    let input = string_arg(&args[0])?;
    if args.len() == 1 {
        return Ok(Sequence::from_values(input.split_whitespace().map(Value::string).collect()));
    }
    if input.is_empty() {
        return Ok(Sequence::empty());
    }
    let regex = compile(&string_arg(&args[1])?, &flags_arg(args, 2)?)?;
    matches_empty(&regex)?;
    let mut tokens = Vec::new();
    let mut last = 0;
    for found in regex.find_iter(&input) {
        let found = found?;
        tokens.push(Value::string(&input[last..found.start()]));
        last = found.end();
    }
    tokens.push(Value::string(&input[last..]));
    Ok(Sequence::from_values(tokens))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("abracadabra", "bra", "i", true)]
    #[case("abracadabra", "^A", "i", true)]
    #[case("abracadabra", "^A", "", false)]
    #[case("a.c", ".", "q", true)]
    #[case("abc", "a.c", "q", false)]
    fn flags_apply(#[case] input: &str, #[case] pattern: &str, #[case] flags: &str, #[case] expected: bool) {
        assert_eq!(compile(pattern, flags).unwrap().is_match(input).unwrap(), expected);
    }

    #[rstest]
    fn unknown_flags_and_bad_patterns_are_reported() {
        assert_eq!(compile("a", "z").unwrap_err().code_enum(), ErrorCode::FORX0001);
        assert_eq!(compile("(", "").unwrap_err().code_enum(), ErrorCode::FORX0002);
    }

    #[rstest]
    fn replacement_references_prefer_existing_groups() {
        let pieces = parse_replacement("[$12]", 2).unwrap();
        assert!(matches!(pieces.as_slice(), [Piece::Literal(a), Piece::Group(1), Piece::Literal(b)] if a == "[" && b == "2]"));
        assert!(parse_replacement("$", 2).is_err());
        assert!(parse_replacement("\\n", 2).is_err());
    }
}

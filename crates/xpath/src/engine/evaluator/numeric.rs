//! Numeric classification, promotion and arithmetic.
//!
//! [`NumKind`] carries a value tagged with one of the four numeric types. Binary operators unify
//! both operands to the wider type first; aggregates use [`promote_to_common_type`] instead, which
//! follows a fixed ladder and rejects mixtures it cannot unify.

use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};

use crate::engine::runtime::{Error, ErrorCode};
use crate::engine::selector::ArithmeticOp;
use crate::xdm::{AtomicValue, TypeName};

use super::casting::parse_double;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum NumKind {
    Int(i64),
    Dec(Decimal),
    Float(f32),
    Double(f64),
}

impl NumKind {
    pub(crate) fn classify(value: &AtomicValue) -> Option<NumKind> {
        match value {
            AtomicValue::Integer(i) => Some(NumKind::Int(*i)),
            AtomicValue::Decimal(d) => Some(NumKind::Dec(*d)),
            AtomicValue::Float(f) => Some(NumKind::Float(*f)),
            AtomicValue::Double(d) => Some(NumKind::Double(*d)),
            _ => None,
        }
    }

    /// Lossy for decimals outside the `f64` range.
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn to_f64(self) -> f64 {
        match self {
            NumKind::Int(i) => i as f64,
            NumKind::Dec(d) => d.to_f64().unwrap_or(f64::NAN),
            NumKind::Float(f) => f64::from(f),
            NumKind::Double(d) => d,
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn to_f32(self) -> f32 {
        match self {
            NumKind::Int(i) => i as f32,
            NumKind::Dec(d) => d.to_f32().unwrap_or(f32::NAN),
            NumKind::Float(f) => f,
            NumKind::Double(d) => d as f32,
        }
    }

    pub(crate) fn into_atomic(self) -> AtomicValue {
        match self {
            NumKind::Int(i) => AtomicValue::Integer(i),
            NumKind::Dec(d) => AtomicValue::Decimal(d),
            NumKind::Float(f) => AtomicValue::Float(f),
            NumKind::Double(d) => AtomicValue::Double(d),
        }
    }
}

/// Converts an arithmetic operand: numerics as they are, untyped values via `xs:double`.
pub(crate) fn numeric_operand(value: &AtomicValue) -> Result<NumKind, Error> {
    if let AtomicValue::UntypedAtomic(s) = value {
        return parse_double(s).map(NumKind::Double);
    }
    NumKind::classify(value).ok_or_else(|| {
        Error::from_code(ErrorCode::XPTY0004, format!("arithmetic is not defined for {}", value.type_name()))
    })
}

/// Widens two operands to a common type: integer < decimal < float < double.
pub(crate) fn unify_numeric(a: NumKind, b: NumKind) -> (NumKind, NumKind) {
    use NumKind::*;
    match (a, b) {
        (Double(_), _) | (_, Double(_)) => (Double(a.to_f64()), Double(b.to_f64())),
        (Float(_), _) | (_, Float(_)) => (Float(a.to_f32()), Float(b.to_f32())),
        (Dec(x), Int(y)) => (Dec(x), Dec(Decimal::from(y))),
        (Int(x), Dec(y)) => (Dec(Decimal::from(x)), Dec(y)),
        pair => pair,
    }
}

fn overflow() -> Error {
    Error::from_code(ErrorCode::FOAR0002, "numeric overflow")
}

fn division_by_zero() -> Error {
    Error::from_code(ErrorCode::FOAR0001, "division by zero")
}

pub(crate) fn arithmetic(op: ArithmeticOp, lhs: NumKind, rhs: NumKind) -> Result<AtomicValue, Error> {
    use NumKind::*;
    Ok(match unify_numeric(lhs, rhs) {
        (Int(a), Int(b)) => match op {
            ArithmeticOp::Add => AtomicValue::Integer(a.checked_add(b).ok_or_else(overflow)?),
            ArithmeticOp::Sub => AtomicValue::Integer(a.checked_sub(b).ok_or_else(overflow)?),
            ArithmeticOp::Mul => AtomicValue::Integer(a.checked_mul(b).ok_or_else(overflow)?),
            ArithmeticOp::Div => return decimal_arithmetic(op, Decimal::from(a), Decimal::from(b)),
            ArithmeticOp::IDiv if b == 0 => return Err(division_by_zero()),
            ArithmeticOp::IDiv => AtomicValue::Integer(a.checked_div(b).ok_or_else(overflow)?),
            ArithmeticOp::Mod if b == 0 => return Err(division_by_zero()),
            ArithmeticOp::Mod => AtomicValue::Integer(a.checked_rem(b).unwrap_or(0)),
        },
        (Dec(a), Dec(b)) => return decimal_arithmetic(op, a, b),
        (Float(a), Float(b)) => match op {
            ArithmeticOp::IDiv => return float_idiv(f64::from(a), f64::from(b)),
            _ => AtomicValue::Float(ieee(op, f64::from(a), f64::from(b)) as f32),
        },
        (a, b) => match op {
            ArithmeticOp::IDiv => return float_idiv(a.to_f64(), b.to_f64()),
            _ => AtomicValue::Double(ieee(op, a.to_f64(), b.to_f64())),
        },
    })
}

fn decimal_arithmetic(op: ArithmeticOp, a: Decimal, b: Decimal) -> Result<AtomicValue, Error> {
    if matches!(op, ArithmeticOp::Div | ArithmeticOp::IDiv | ArithmeticOp::Mod) && b.is_zero() {
        return Err(division_by_zero());
    }
    let result = match op {
        ArithmeticOp::Add => a.checked_add(b),
        ArithmeticOp::Sub => a.checked_sub(b),
        ArithmeticOp::Mul => a.checked_mul(b),
        ArithmeticOp::Div => a.checked_div(b),
        ArithmeticOp::Mod => a.checked_rem(b),
        ArithmeticOp::IDiv => {
            let quotient = a.checked_div(b).ok_or_else(overflow)?.trunc();
            return quotient.to_i64().map(AtomicValue::Integer).ok_or_else(overflow);
        }
    };
    result.map(AtomicValue::Decimal).ok_or_else(overflow)
}

fn ieee(op: ArithmeticOp, a: f64, b: f64) -> f64 {
    match op {
        ArithmeticOp::Add => a + b,
        ArithmeticOp::Sub => a - b,
        ArithmeticOp::Mul => a * b,
        ArithmeticOp::Div => a / b,
        // Truncating remainder, sign of the dividend.
        ArithmeticOp::Mod | ArithmeticOp::IDiv => a % b,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn float_idiv(a: f64, b: f64) -> Result<AtomicValue, Error> {
    if b == 0.0 {
        return Err(division_by_zero());
    }
    let quotient = (a / b).trunc();
    if !quotient.is_finite() || quotient.abs() >= 9.2e18 {
        return Err(overflow());
    }
    Ok(AtomicValue::Integer(quotient as i64))
}

pub(crate) fn negate(value: NumKind) -> Result<AtomicValue, Error> {
    Ok(match value {
        NumKind::Int(i) => AtomicValue::Integer(i.checked_neg().ok_or_else(overflow)?),
        NumKind::Dec(d) => AtomicValue::Decimal(-d),
        NumKind::Float(f) => AtomicValue::Float(-f),
        NumKind::Double(d) => AtomicValue::Double(-d),
    })
}

/// Unifies the operands of `sum`, `avg`, `min` and `max`.
///
/// All integers or all doubles stay as they are, as does any set sharing one primitive type.
/// Otherwise strings and URIs unify to `xs:string`, decimals and floats to `xs:float`, and decimals,
/// floats and doubles to `xs:double`. Any other mixture is `err:FORG0006`.
pub(crate) fn promote_to_common_type(values: Vec<AtomicValue>) -> Result<Vec<AtomicValue>, Error> {
    let Some(first) = values.first().map(AtomicValue::type_name) else { return Ok(values) };
    let all = |pred: &dyn Fn(TypeName) -> bool| values.iter().all(|v| pred(v.type_name()));
    if all(&|t| t == TypeName::Integer) || all(&|t| t == TypeName::Double) || all(&|t| t.primitive() == first.primitive()) {
        return Ok(values);
    }
    if all(&|t| matches!(t, TypeName::String | TypeName::AnyUri)) {
        return Ok(values.into_iter().map(|v| AtomicValue::String(v.lexical())).collect());
    }
    if all(&|t| matches!(t, TypeName::Decimal | TypeName::Integer | TypeName::Float)) {
        return Ok(values
            .into_iter()
            .filter_map(|v| NumKind::classify(&v))
            .map(|n| AtomicValue::Float(n.to_f32()))
            .collect());
    }
    if all(&|t| t.is_numeric()) {
        return Ok(values
            .into_iter()
            .filter_map(|v| NumKind::classify(&v))
            .map(|n| AtomicValue::Double(n.to_f64()))
            .collect());
    }
    let types = values.iter().map(|v| v.type_name().to_string()).collect::<Vec<_>>().join(", ");
    Err(Error::from_code(ErrorCode::FORG0006, format!("no common type for ({types})")))
}

/// Rounds half towards positive infinity, as `fn:round` does.
pub(crate) fn round_half_up(value: NumKind) -> Result<AtomicValue, Error> {
    Ok(match value {
        NumKind::Int(i) => AtomicValue::Integer(i),
        NumKind::Dec(d) => AtomicValue::Decimal((d + Decimal::new(5, 1)).floor()),
        NumKind::Float(f) => AtomicValue::Float(round_ieee(f64::from(f)) as f32),
        NumKind::Double(d) => AtomicValue::Double(round_ieee(d)),
    })
}

fn round_ieee(x: f64) -> f64 {
    if !x.is_finite() || x == 0.0 {
        return x;
    }
    let rounded = (x + 0.5).floor();
    if rounded == 0.0 && x < 0.0 { -0.0 } else { rounded }
}

pub(crate) fn decimal_from_f64(value: f64) -> Result<Decimal, Error> {
    Decimal::from_f64(value).ok_or_else(|| {
        Error::from_code(ErrorCode::FOCA0002, format!("{value} cannot be represented as xs:decimal"))
    })
}

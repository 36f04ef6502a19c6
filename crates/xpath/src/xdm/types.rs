//! The static type lattice and sequence types used for signatures and `instance of`.

use core::fmt;

use crate::model::NodeKind;

/// Every type the engine distinguishes, arranged as a single-rooted tree via [`TypeName::parent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeName {
    Item,
    Node,
    Document,
    Element,
    Attribute,
    Text,
    Comment,
    ProcessingInstruction,
    Namespace,
    Function,
    AnyAtomicType,
    UntypedAtomic,
    String,
    AnyUri,
    Boolean,
    Numeric,
    Decimal,
    Integer,
    Float,
    Double,
    Duration,
    YearMonthDuration,
    DayTimeDuration,
    DateTime,
    Date,
    Time,
    QName,
}

impl TypeName {
    pub fn parent(self) -> Option<TypeName> {
        use TypeName::*;
        Some(match self {
            Item => return None,
            Node | Function | AnyAtomicType => Item,
            Document | Element | Attribute | Text | Comment | ProcessingInstruction | Namespace => Node,
            UntypedAtomic | String | AnyUri | Boolean | Numeric | Duration | DateTime | Date | Time | QName => {
                AnyAtomicType
            }
            Decimal | Float | Double => Numeric,
            Integer => Decimal,
            YearMonthDuration | DayTimeDuration => Duration,
        })
    }

    pub fn is_atomic(self) -> bool {
        self.is_subtype_of(TypeName::AnyAtomicType)
    }

    pub fn is_node(self) -> bool {
        self.is_subtype_of(TypeName::Node)
    }

    pub fn is_numeric(self) -> bool {
        self.is_subtype_of(TypeName::Numeric)
    }

    /// Abstract types have no values of their own and cannot be cast targets.
    pub fn is_abstract(self) -> bool {
        matches!(self, TypeName::Item | TypeName::Node | TypeName::AnyAtomicType | TypeName::Numeric)
    }

    pub fn is_subtype_of(self, other: TypeName) -> bool {
        let mut current = Some(self);
        while let Some(t) = current {
            if t == other {
                return true;
            }
            current = t.parent();
        }
        false
    }

    /// The primitive atomic type a value of this type is derived from (`xs:integer` → `xs:decimal`).
    pub fn primitive(self) -> TypeName {
        match self {
            TypeName::Integer => TypeName::Decimal,
            TypeName::YearMonthDuration | TypeName::DayTimeDuration => TypeName::Duration,
            other => other,
        }
    }

    pub fn from_node_kind(kind: NodeKind) -> TypeName {
        match kind {
            NodeKind::Document => TypeName::Document,
            NodeKind::Element => TypeName::Element,
            NodeKind::Attribute => TypeName::Attribute,
            NodeKind::Text => TypeName::Text,
            NodeKind::Comment => TypeName::Comment,
            NodeKind::ProcessingInstruction => TypeName::ProcessingInstruction,
            NodeKind::Namespace => TypeName::Namespace,
        }
    }

    /// Parses the lexical `xs:` form of an atomic type name.
    pub fn from_xs_name(name: &str) -> Option<TypeName> {
        let local = name.strip_prefix("xs:").unwrap_or(name);
        Some(match local {
            "anyAtomicType" => TypeName::AnyAtomicType,
            "untypedAtomic" => TypeName::UntypedAtomic,
            "string" => TypeName::String,
            "anyURI" => TypeName::AnyUri,
            "boolean" => TypeName::Boolean,
            "numeric" => TypeName::Numeric,
            "decimal" => TypeName::Decimal,
            "integer" => TypeName::Integer,
            "float" => TypeName::Float,
            "double" => TypeName::Double,
            "duration" => TypeName::Duration,
            "yearMonthDuration" => TypeName::YearMonthDuration,
            "dayTimeDuration" => TypeName::DayTimeDuration,
            "dateTime" => TypeName::DateTime,
            "date" => TypeName::Date,
            "time" => TypeName::Time,
            "QName" => TypeName::QName,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        use TypeName::*;
        match self {
            Item => "item()",
            Node => "node()",
            Document => "document-node()",
            Element => "element()",
            Attribute => "attribute()",
            Text => "text()",
            Comment => "comment()",
            ProcessingInstruction => "processing-instruction()",
            Namespace => "namespace-node()",
            Function => "function(*)",
            AnyAtomicType => "xs:anyAtomicType",
            UntypedAtomic => "xs:untypedAtomic",
            String => "xs:string",
            AnyUri => "xs:anyURI",
            Boolean => "xs:boolean",
            Numeric => "xs:numeric",
            Decimal => "xs:decimal",
            Integer => "xs:integer",
            Float => "xs:float",
            Double => "xs:double",
            Duration => "xs:duration",
            YearMonthDuration => "xs:yearMonthDuration",
            DayTimeDuration => "xs:dayTimeDuration",
            DateTime => "xs:dateTime",
            Date => "xs:date",
            Time => "xs:time",
            QName => "xs:QName",
        }
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `true` when every value of `a` is also a value of `b`.
pub fn subtype_of(a: TypeName, b: TypeName) -> bool {
    a.is_subtype_of(b)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Occurrence {
    ExactlyOne,
    ZeroOrOne,
    ZeroOrMore,
    OneOrMore,
}

impl Occurrence {
    pub fn allows(self, count: usize) -> bool {
        match self {
            Occurrence::ExactlyOne => count == 1,
            Occurrence::ZeroOrOne => count <= 1,
            Occurrence::ZeroOrMore => true,
            Occurrence::OneOrMore => count >= 1,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            Occurrence::ExactlyOne => "",
            Occurrence::ZeroOrOne => "?",
            Occurrence::ZeroOrMore => "*",
            Occurrence::OneOrMore => "+",
        }
    }
}

/// An item type with an occurrence indicator, e.g. `xs:string?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SequenceType {
    pub item: TypeName,
    pub occurrence: Occurrence,
}

impl SequenceType {
    pub const fn new(item: TypeName, occurrence: Occurrence) -> Self {
        Self { item, occurrence }
    }

    pub const fn any() -> Self {
        Self::new(TypeName::Item, Occurrence::ZeroOrMore)
    }

    pub const fn one(item: TypeName) -> Self {
        Self::new(item, Occurrence::ExactlyOne)
    }

    pub const fn optional(item: TypeName) -> Self {
        Self::new(item, Occurrence::ZeroOrOne)
    }

    pub const fn many(item: TypeName) -> Self {
        Self::new(item, Occurrence::ZeroOrMore)
    }

    /// `item()*` accepts every sequence, so arguments of this type are passed through untouched.
    pub fn accepts_anything(&self) -> bool {
        self.item == TypeName::Item && self.occurrence == Occurrence::ZeroOrMore
    }
}

impl fmt::Display for SequenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.item, self.occurrence.suffix())
    }
}

/// One entry of a declared parameter list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamSpec {
    Type(SequenceType),
    /// Repeats the preceding parameter type for every remaining argument. Only valid in last position.
    Variadic,
}

/// Expands a declared parameter list to exactly `arity` types, or `None` when the list cannot take
/// that many arguments.
pub fn expand_params(params: &[ParamSpec], arity: usize) -> Option<Vec<SequenceType>> {
    let fixed: Vec<SequenceType> = params
        .iter()
        .filter_map(|p| match p {
            ParamSpec::Type(t) => Some(*t),
            ParamSpec::Variadic => None,
        })
        .collect();
    let variadic = matches!(params.last(), Some(ParamSpec::Variadic));
    if arity == fixed.len() {
        return Some(fixed);
    }
    if !variadic || arity < fixed.len() {
        return None;
    }
    let repeated = *fixed.last()?;
    let mut out = fixed;
    out.resize(arity, repeated);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const ALL: [TypeName; 27] = [
        TypeName::Item,
        TypeName::Node,
        TypeName::Document,
        TypeName::Element,
        TypeName::Attribute,
        TypeName::Text,
        TypeName::Comment,
        TypeName::ProcessingInstruction,
        TypeName::Namespace,
        TypeName::Function,
        TypeName::AnyAtomicType,
        TypeName::UntypedAtomic,
        TypeName::String,
        TypeName::AnyUri,
        TypeName::Boolean,
        TypeName::Numeric,
        TypeName::Decimal,
        TypeName::Integer,
        TypeName::Float,
        TypeName::Double,
        TypeName::Duration,
        TypeName::YearMonthDuration,
        TypeName::DayTimeDuration,
        TypeName::DateTime,
        TypeName::Date,
        TypeName::Time,
        TypeName::QName,
    ];

    #[rstest]
    fn subtyping_is_reflexive_and_antisymmetric() {
        for a in ALL {
            assert!(subtype_of(a, a), "{a} should be a subtype of itself");
            for b in ALL {
                if a != b {
                    assert!(!(subtype_of(a, b) && subtype_of(b, a)), "{a} and {b} are mutual subtypes");
                }
            }
        }
    }

    #[rstest]
    fn subtyping_is_transitive() {
        for a in ALL {
            for b in ALL {
                for c in ALL {
                    if subtype_of(a, b) && subtype_of(b, c) {
                        assert!(subtype_of(a, c), "{a} <: {b} <: {c}");
                    }
                }
            }
        }
    }

    #[rstest]
    #[case(TypeName::Integer, TypeName::Decimal, true)]
    #[case(TypeName::Integer, TypeName::Numeric, true)]
    #[case(TypeName::Decimal, TypeName::Integer, false)]
    #[case(TypeName::Attribute, TypeName::Node, true)]
    #[case(TypeName::Attribute, TypeName::AnyAtomicType, false)]
    #[case(TypeName::Function, TypeName::Item, true)]
    #[case(TypeName::DayTimeDuration, TypeName::Duration, true)]
    #[case(TypeName::Float, TypeName::Double, false)]
    fn lattice_edges(#[case] a: TypeName, #[case] b: TypeName, #[case] expected: bool) {
        assert_eq!(subtype_of(a, b), expected);
    }

    #[rstest]
    fn variadic_expansion_repeats_last_type() {
        let s = SequenceType::optional(TypeName::AnyAtomicType);
        let params = [ParamSpec::Type(s), ParamSpec::Type(s), ParamSpec::Variadic];
        assert_eq!(expand_params(&params, 1), None);
        assert_eq!(expand_params(&params, 2).map(|v| v.len()), Some(2));
        assert_eq!(expand_params(&params, 5), Some(vec![s; 5]));
        let fixed = [ParamSpec::Type(s)];
        assert_eq!(expand_params(&fixed, 2), None);
    }
}

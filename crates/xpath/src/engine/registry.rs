//! Function registry: (name, arity) → declaration.
//!
//! Built once, then shared read-only through an `Arc` by every context that uses it.

use core::fmt;
use std::collections::HashMap;
use std::sync::Arc;

use itertools::Itertools;

use crate::consts::FNS;
use crate::engine::runtime::{DynamicContext, Error, ErrorCode};
use crate::xdm::{ExpandedName, FunctionImpl, FunctionItem, NodeHandle, ParamSpec, Sequence, SequenceType, expand_params};

/// A registered function: signature plus implementation.
pub struct FunctionDeclaration<N> {
    pub name: ExpandedName,
    pub params: Vec<ParamSpec>,
    pub return_type: SequenceType,
    pub implementation: FunctionImpl<N>,
}

impl<N> Clone for FunctionDeclaration<N> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            params: self.params.clone(),
            return_type: self.return_type,
            implementation: Arc::clone(&self.implementation),
        }
    }
}

impl<N> fmt::Debug for FunctionDeclaration<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDeclaration")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("return_type", &self.return_type)
            .finish_non_exhaustive()
    }
}

impl<N> FunctionDeclaration<N> {
    pub fn new<F>(name: ExpandedName, params: Vec<ParamSpec>, return_type: SequenceType, implementation: F) -> Self
    where
        F: Fn(&DynamicContext<N>, &[Sequence<N>]) -> Result<Sequence<N>, Error> + Send + Sync + 'static,
    {
        Self { name, params, return_type, implementation: Arc::new(implementation) }
    }

    /// Number of declared parameters before any variadic marker.
    pub fn fixed_arity(&self) -> usize {
        self.params.iter().filter(|p| matches!(p, ParamSpec::Type(_))).count()
    }

    pub fn is_variadic(&self) -> bool {
        matches!(self.params.last(), Some(ParamSpec::Variadic))
    }

    pub fn accepts(&self, arity: usize) -> bool {
        arity == self.fixed_arity() || (self.is_variadic() && arity > self.fixed_arity())
    }

    pub fn param_types(&self, arity: usize) -> Option<Vec<SequenceType>> {
        expand_params(&self.params, arity)
    }

    fn arity_label(&self) -> String {
        if self.is_variadic() { format!("{}+", self.fixed_arity()) } else { self.fixed_arity().to_string() }
    }

    /// A function value bound to one concrete arity, as produced by a named function reference.
    pub fn to_function_item(&self, arity: usize) -> Option<FunctionItem<N>> {
        let params = self.param_types(arity)?;
        Some(FunctionItem {
            name: Some(self.name.clone()),
            arity,
            params: params.into_iter().map(ParamSpec::Type).collect(),
            return_type: self.return_type,
            implementation: Arc::clone(&self.implementation),
        })
    }
}

/// Why a (name, arity) pair did not resolve.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// No function of that name exists at any arity.
    Unknown { name: ExpandedName, arity: usize, suggestions: Vec<String> },
    /// The name exists, but not with the requested arity.
    WrongArity { name: ExpandedName, arity: usize, available: Vec<String> },
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::Unknown { name, arity, suggestions } => {
                write!(f, "unknown function {name}#{arity}")?;
                if !suggestions.is_empty() {
                    write!(f, "; did you mean {}?", suggestions.join(", "))?;
                }
                Ok(())
            }
            ResolveError::WrongArity { name, arity, available } => write!(
                f,
                "function {name} cannot be called with {arity} argument{}; available arities: {}",
                if *arity == 1 { "" } else { "s" },
                available.join(", ")
            ),
        }
    }
}

impl From<ResolveError> for Error {
    fn from(e: ResolveError) -> Self {
        Error::from_code(ErrorCode::XPST0017, e.to_string())
    }
}

pub struct FunctionRegistry<N> {
    entries: HashMap<ExpandedName, Vec<Arc<FunctionDeclaration<N>>>>,
}

impl<N> Default for FunctionRegistry<N> {
    fn default() -> Self {
        Self { entries: HashMap::new() }
    }
}

impl<N> fmt::Debug for FunctionRegistry<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry").field("functions", &self.len()).finish()
    }
}

impl<N> FunctionRegistry<N> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a declaration. A previous declaration accepting the same fixed arity is replaced.
    pub fn register(&mut self, declaration: FunctionDeclaration<N>) {
        let arity = declaration.fixed_arity();
        let slot = self.entries.entry(declaration.name.clone()).or_default();
        slot.retain(|d| d.fixed_arity() != arity);
        slot.push(Arc::new(declaration));
    }

    pub fn register_fn<F>(&mut self, name: ExpandedName, params: Vec<ParamSpec>, return_type: SequenceType, f: F)
    where
        F: Fn(&DynamicContext<N>, &[Sequence<N>]) -> Result<Sequence<N>, Error> + Send + Sync + 'static,
    {
        self.register(FunctionDeclaration::new(name, params, return_type, f));
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &ExpandedName, arity: usize) -> bool {
        self.resolve(name, arity).is_ok()
    }

    /// Exact lookup. Names without namespace fall back to the standard function namespace.
    pub fn resolve(&self, name: &ExpandedName, arity: usize) -> Result<Arc<FunctionDeclaration<N>>, ResolveError> {
        let (resolved_name, candidates) = match self.candidates(name) {
            Some(found) => found,
            None => {
                let suggestions = self.near_misses(name);
                tracing::debug!(name = %name, arity, "unknown function");
                return Err(ResolveError::Unknown { name: name.clone(), arity, suggestions });
            }
        };
        if let Some(decl) = candidates.iter().find(|d| d.accepts(arity)) {
            return Ok(Arc::clone(decl));
        }
        tracing::debug!(name = %resolved_name, arity, "no overload with this arity");
        let available = candidates.iter().sorted_by_key(|d| d.fixed_arity()).map(|d| d.arity_label()).collect();
        Err(ResolveError::WrongArity { name: resolved_name.clone(), arity, available })
    }

    fn candidates(&self, name: &ExpandedName) -> Option<(&ExpandedName, &Vec<Arc<FunctionDeclaration<N>>>)> {
        if let Some(found) = self.entries.get_key_value(name) {
            return Some(found);
        }
        if name.ns_uri.is_none() {
            return self.entries.get_key_value(&ExpandedName::in_ns(FNS, name.local.clone()));
        }
        None
    }

    fn near_misses(&self, name: &ExpandedName) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(candidate, _)| candidate.local == name.local || edit_distance(&candidate.local, &name.local) <= 2)
            .sorted_by_key(|(candidate, _)| (edit_distance(&candidate.local, &name.local), (*candidate).clone()))
            .take(3)
            .map(|(candidate, decls)| {
                let arities = decls.iter().sorted_by_key(|d| d.fixed_arity()).map(|d| d.arity_label()).join("|");
                format!("{candidate}#{arities}")
            })
            .collect()
    }
}

impl<N: NodeHandle> FunctionRegistry<N> {
    /// Registry preloaded with the builtin library.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::engine::functions::register_builtins(&mut registry);
        tracing::debug!(functions = registry.len(), "function registry built");
        registry
    }
}

fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut row = Vec::with_capacity(b.len() + 1);
        row.push(i + 1);
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != *cb);
            row.push(substitution.min(prev[j + 1] + 1).min(row[j] + 1));
        }
        prev = row;
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xdm::{Occurrence, TypeName, Value};
    use rstest::rstest;

    fn registry() -> FunctionRegistry<()> {
        let mut r = FunctionRegistry::new();
        let s = SequenceType::optional(TypeName::String);
        r.register_fn(ExpandedName::fn_name("contains"), vec![ParamSpec::Type(s), ParamSpec::Type(s)], SequenceType::one(TypeName::Boolean), |_, _| {
            Ok(Sequence::singleton(Value::boolean(true)))
        });
        r.register_fn(
            ExpandedName::fn_name("concat"),
            vec![ParamSpec::Type(s), ParamSpec::Type(s), ParamSpec::Variadic],
            SequenceType::new(TypeName::String, Occurrence::ExactlyOne),
            |_, _| Ok(Sequence::empty()),
        );
        r
    }

    #[rstest]
    fn exact_and_variadic_resolution() {
        let r = registry();
        assert!(r.resolve(&ExpandedName::fn_name("contains"), 2).is_ok());
        assert!(r.resolve(&ExpandedName::local("contains"), 2).is_ok());
        assert!(r.resolve(&ExpandedName::fn_name("concat"), 2).is_ok());
        assert!(r.resolve(&ExpandedName::fn_name("concat"), 7).is_ok());
        assert!(r.resolve(&ExpandedName::fn_name("concat"), 1).is_err());
    }

    #[rstest]
    fn unknown_and_wrong_arity_are_distinct() {
        let r = registry();
        match r.resolve(&ExpandedName::fn_name("contain"), 2) {
            Err(ResolveError::Unknown { suggestions, .. }) => assert_eq!(suggestions, vec!["fn:contains#2".to_string()]),
            other => panic!("unexpected {other:?}"),
        }
        match r.resolve(&ExpandedName::fn_name("contains"), 3) {
            Err(ResolveError::WrongArity { available, .. }) => assert_eq!(available, vec!["2".to_string()]),
            other => panic!("unexpected {other:?}"),
        }
        let err: Error = r.resolve(&ExpandedName::fn_name("concat"), 1).map(|_| ()).unwrap_err().into();
        assert_eq!(err.code_enum(), ErrorCode::XPST0017);
        assert!(err.message.contains("2+"), "{}", err.message);
    }

    #[rstest]
    #[case("kitten", "sitting", 3)]
    #[case("", "abc", 3)]
    #[case("same", "same", 0)]
    fn edit_distances(#[case] a: &str, #[case] b: &str, #[case] expected: usize) {
        assert_eq!(edit_distance(a, b), expected);
    }
}

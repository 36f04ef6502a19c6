//! Errors, the dynamic context and its builder.

use core::fmt;
use std::cell::OnceCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};

use crate::consts::{ERR_NS, XML_URI};
use crate::engine::facade::{DocumentFacade, NodeTreeFacade, NodesFactory, SelectorCompiler};
use crate::engine::registry::FunctionRegistry;
use crate::model::XdmNode;
use crate::ready;
use crate::xdm::{ExpandedName, Fetch, NodeHandle, NodeItem, Sequence, SequenceCursor, SequenceIter, Step, Value};

/// Error codes raised by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    FOAR0001,
    FOAR0002,
    FOCA0002,
    FOER0000,
    FORG0001,
    FORG0003,
    FORG0004,
    FORG0005,
    FORG0006,
    FORX0001,
    FORX0002,
    FORX0003,
    FORX0004,
    FOTY0013,
    XPDY0002,
    XPST0008,
    XPST0017,
    XPST0080,
    XPST0081,
    XPTY0004,
    XPTY0018,
    XPTY0019,
    XPTY0020,
    Unknown,
}

/// The failure families callers can tell apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Unresolvable function name/arity or namespace prefix.
    StaticBinding,
    /// Wrong arity or argument types at a dynamic call, non-singleton or non-numeric operands.
    DynamicType,
    /// Invalid lexical form for a cast or no common type for an aggregate.
    Cast,
    /// A variable referenced where it is not bound.
    Scope,
    Dynamic,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        use ErrorCode::*;
        match self {
            FOAR0001 => "FOAR0001",
            FOAR0002 => "FOAR0002",
            FOCA0002 => "FOCA0002",
            FOER0000 => "FOER0000",
            FORG0001 => "FORG0001",
            FORG0003 => "FORG0003",
            FORG0004 => "FORG0004",
            FORG0005 => "FORG0005",
            FORG0006 => "FORG0006",
            FORX0001 => "FORX0001",
            FORX0002 => "FORX0002",
            FORX0003 => "FORX0003",
            FORX0004 => "FORX0004",
            FOTY0013 => "FOTY0013",
            XPDY0002 => "XPDY0002",
            XPST0008 => "XPST0008",
            XPST0017 => "XPST0017",
            XPST0080 => "XPST0080",
            XPST0081 => "XPST0081",
            XPTY0004 => "XPTY0004",
            XPTY0018 => "XPTY0018",
            XPTY0019 => "XPTY0019",
            XPTY0020 => "XPTY0020",
            Unknown => "UNKNOWN",
        }
    }

    pub fn qname(self) -> ExpandedName {
        ExpandedName::in_ns(ERR_NS, self.as_str())
    }

    pub fn from_local(local: &str) -> Self {
        use ErrorCode::*;
        [
            FOAR0001, FOAR0002, FOCA0002, FOER0000, FORG0001, FORG0003, FORG0004, FORG0005, FORG0006, FORX0001,
            FORX0002, FORX0003, FORX0004, FOTY0013, XPDY0002, XPST0008, XPST0017, XPST0080, XPST0081, XPTY0004,
            XPTY0018, XPTY0019, XPTY0020,
        ]
        .into_iter()
        .find(|code| code.as_str() == local)
        .unwrap_or(Unknown)
    }

    pub fn category(self) -> ErrorCategory {
        use ErrorCode::*;
        match self {
            XPST0017 | XPST0081 => ErrorCategory::StaticBinding,
            XPST0008 => ErrorCategory::Scope,
            XPTY0004 | XPTY0018 | XPTY0019 | XPTY0020 | FOTY0013 => ErrorCategory::DynamicType,
            FORG0001 | FOCA0002 | FORG0006 | XPST0080 => ErrorCategory::Cast,
            _ => ErrorCategory::Dynamic,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub struct Error {
    pub code: ExpandedName,
    pub message: String,
    #[source]
    pub source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    pub fn new_qname(code: ExpandedName, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), source: None }
    }

    pub fn from_code(code: ErrorCode, msg: impl Into<String>) -> Self {
        Self::new_qname(code.qname(), msg)
    }

    pub fn with_source(mut self, source: impl Into<Option<Arc<dyn std::error::Error + Send + Sync>>>) -> Self {
        self.source = source.into();
        self
    }

    pub fn code_enum(&self) -> ErrorCode {
        if self.code.ns_uri.as_deref() == Some(ERR_NS) { ErrorCode::from_local(&self.code.local) } else { ErrorCode::Unknown }
    }

    pub fn code_qname(&self) -> &ExpandedName {
        &self.code
    }

    pub fn category(&self) -> ErrorCategory {
        self.code_enum().category()
    }

    /// `err:LOCAL` for standard codes, `Q{ns}local` otherwise.
    pub fn format_code(&self) -> String {
        match self.code.ns_uri.as_deref() {
            Some(ERR_NS) => format!("err:{}", self.code.local),
            Some(ns) => format!("Q{{{ns}}}{}", self.code.local),
            None => self.code.local.clone(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error: {} ({})", self.message, self.format_code())
    }
}

impl From<fancy_regex::Error> for Error {
    fn from(e: fancy_regex::Error) -> Self {
        Error::from_code(ErrorCode::FORX0002, format!("invalid regular expression: {e}"))
            .with_source(Some(Arc::new(e) as Arc<dyn std::error::Error + Send + Sync>))
    }
}

/// Lazily evaluated variable value. Called each time the variable is referenced.
pub type VariableThunk<N> = Rc<dyn Fn() -> Result<Sequence<N>, Error>>;

/// Maps a prefix (`None` for the default namespace) to a namespace URI.
pub type NamespaceResolver = Arc<dyn Fn(Option<&str>) -> Option<String> + Send + Sync>;

/// Current date-time fixed once per top-level evaluation and shared by all derived scopes.
#[derive(Debug, Default)]
pub struct TemporalSnapshot {
    fixed_now: Option<DateTime<FixedOffset>>,
    timezone: Option<FixedOffset>,
    now: OnceCell<DateTime<FixedOffset>>,
}

impl TemporalSnapshot {
    pub fn new(fixed_now: Option<DateTime<FixedOffset>>, timezone: Option<FixedOffset>) -> Self {
        Self { fixed_now, timezone, now: OnceCell::new() }
    }

    pub fn current_date_time(&self) -> DateTime<FixedOffset> {
        *self.now.get_or_init(|| {
            let base = self.fixed_now.unwrap_or_else(|| chrono::Local::now().fixed_offset());
            let now = self.timezone.map_or(base, |tz| base.with_timezone(&tz));
            tracing::trace!(now = %now, "temporal snapshot fixed");
            now
        })
    }

    pub fn implicit_timezone(&self) -> FixedOffset {
        *self.current_date_time().offset()
    }
}

/// Evaluation environment of one scope. Never mutated; scopes derive new contexts.
pub struct DynamicContext<N> {
    pub context_item: Option<Value<N>>,
    pub context_item_index: usize,
    pub context_sequence: Option<Sequence<N>>,
    pub dom_facade: Arc<dyn DocumentFacade<N>>,
    pub nodes_factory: Option<Arc<dyn NodesFactory<N>>>,
    pub functions: Arc<FunctionRegistry<N>>,
    pub selector_compiler: Option<Arc<dyn SelectorCompiler>>,
    variables: Rc<HashMap<ExpandedName, VariableThunk<N>>>,
    namespace_resolver: NamespaceResolver,
    temporal: Rc<TemporalSnapshot>,
}

impl<N: Clone> Clone for DynamicContext<N> {
    fn clone(&self) -> Self {
        Self {
            context_item: self.context_item.clone(),
            context_item_index: self.context_item_index,
            context_sequence: self.context_sequence.clone(),
            dom_facade: Arc::clone(&self.dom_facade),
            nodes_factory: self.nodes_factory.clone(),
            functions: Arc::clone(&self.functions),
            selector_compiler: self.selector_compiler.clone(),
            variables: Rc::clone(&self.variables),
            namespace_resolver: Arc::clone(&self.namespace_resolver),
            temporal: Rc::clone(&self.temporal),
        }
    }
}

impl<N: fmt::Debug> fmt::Debug for DynamicContext<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicContext")
            .field("context_item", &self.context_item)
            .field("context_item_index", &self.context_item_index)
            .field("variables", &self.variables.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl<N: NodeHandle> DynamicContext<N> {
    /// New bindings shadow existing ones with the same name.
    pub fn scope_with_variables(&self, bindings: impl IntoIterator<Item = (ExpandedName, VariableThunk<N>)>) -> Self {
        let mut variables = (*self.variables).clone();
        variables.extend(bindings);
        Self { variables: Rc::new(variables), ..self.clone() }
    }

    pub fn scope_with_variable(&self, name: ExpandedName, value: Sequence<N>) -> Self {
        let thunk: VariableThunk<N> = Rc::new(move || Ok(value.clone()));
        self.scope_with_variables([(name, thunk)])
    }

    /// Rebinds the focus. `sequence = None` keeps the current context sequence.
    pub fn scope_with_focus(&self, index: usize, item: Value<N>, sequence: Option<Sequence<N>>) -> Self {
        Self {
            context_item: Some(item),
            context_item_index: index,
            context_sequence: sequence.or_else(|| self.context_sequence.clone()),
            ..self.clone()
        }
    }

    pub fn scope_with_namespace_resolver(&self, resolver: NamespaceResolver) -> Self {
        Self { namespace_resolver: resolver, ..self.clone() }
    }

    pub fn resolve_namespace_prefix(&self, prefix: Option<&str>) -> Option<String> {
        (self.namespace_resolver)(prefix)
    }

    pub fn has_variable(&self, name: &ExpandedName) -> bool {
        self.variables.contains_key(name)
    }

    pub fn lookup_variable(&self, name: &ExpandedName) -> Result<Sequence<N>, Error> {
        match self.variables.get(name) {
            Some(thunk) => thunk(),
            None => Err(Error::from_code(ErrorCode::XPST0008, format!("variable ${name} is not in scope"))),
        }
    }

    /// Yields, for each item of `sequence`, a context focused on it at its 0-based position.
    pub fn create_sequence_iterator(&self, sequence: &Sequence<N>) -> FocusIter<N> {
        FocusIter { base: self.clone(), sequence: sequence.clone(), items: sequence.iter() }
    }

    pub fn context_item(&self) -> Result<&Value<N>, Error> {
        self.context_item
            .as_ref()
            .ok_or_else(|| Error::from_code(ErrorCode::XPDY0002, "context item is absent"))
    }

    pub fn context_node(&self) -> Result<&NodeItem<N>, Error> {
        match self.context_item()? {
            Value::Node(node) => Ok(node),
            other => Err(Error::from_code(
                ErrorCode::XPTY0020,
                format!("context item is not a node but {}", other.type_name()),
            )),
        }
    }

    pub fn current_date_time(&self) -> DateTime<FixedOffset> {
        self.temporal.current_date_time()
    }

    pub fn implicit_timezone(&self) -> FixedOffset {
        self.temporal.implicit_timezone()
    }

    pub fn shares_temporal_snapshot(&self, other: &DynamicContext<N>) -> bool {
        Rc::ptr_eq(&self.temporal, &other.temporal)
    }
}

/// Stepper over focused sub-contexts, see [`DynamicContext::create_sequence_iterator`].
pub struct FocusIter<N> {
    base: DynamicContext<N>,
    sequence: Sequence<N>,
    items: SequenceIter<N>,
}

impl<N: NodeHandle> FocusIter<N> {
    pub fn next_context(&mut self) -> Result<Step<DynamicContext<N>>, Error> {
        let index = self.items.position();
        let Some(item) = ready!(self.items.next_item()?) else { return Ok(Fetch::Ready(None)) };
        Ok(Fetch::Ready(Some(self.base.scope_with_focus(index, item, Some(self.sequence.clone())))))
    }
}

/// Configuration surface for a top-level evaluation.
pub struct DynamicContextBuilder<N> {
    context_item: Option<Value<N>>,
    context_node: Option<N>,
    context_sequence: Option<Sequence<N>>,
    variables: HashMap<ExpandedName, VariableThunk<N>>,
    facade: Arc<dyn DocumentFacade<N>>,
    nodes_factory: Option<Arc<dyn NodesFactory<N>>>,
    namespaces: HashMap<String, String>,
    namespace_resolver: Option<NamespaceResolver>,
    functions: Option<Arc<FunctionRegistry<N>>>,
    selector_compiler: Option<Arc<dyn SelectorCompiler>>,
    now: Option<DateTime<FixedOffset>>,
    timezone: Option<FixedOffset>,
}

impl<N: XdmNode> Default for DynamicContextBuilder<N> {
    fn default() -> Self {
        Self::new(Arc::new(NodeTreeFacade::new()))
    }
}

impl<N: NodeHandle> DynamicContextBuilder<N> {
    pub fn new(facade: Arc<dyn DocumentFacade<N>>) -> Self {
        Self {
            context_item: None,
            context_node: None,
            context_sequence: None,
            variables: HashMap::new(),
            facade,
            nodes_factory: None,
            namespaces: HashMap::new(),
            namespace_resolver: None,
            functions: None,
            selector_compiler: None,
            now: None,
            timezone: None,
        }
    }

    pub fn with_context_item(mut self, item: impl Into<Value<N>>) -> Self {
        self.context_item = Some(item.into());
        self.context_node = None;
        self
    }

    /// Context item given as a raw handle; its kind is taken from the facade.
    pub fn with_context_node(mut self, node: N) -> Self {
        self.context_node = Some(node);
        self.context_item = None;
        self
    }

    pub fn with_context_sequence(mut self, sequence: Sequence<N>) -> Self {
        self.context_sequence = Some(sequence);
        self
    }

    pub fn with_variable(mut self, name: ExpandedName, value: Sequence<N>) -> Self {
        self.variables.insert(name, Rc::new(move || Ok(value.clone())));
        self
    }

    pub fn with_variable_thunk(mut self, name: ExpandedName, thunk: VariableThunk<N>) -> Self {
        self.variables.insert(name, thunk);
        self
    }

    pub fn with_facade(mut self, facade: Arc<dyn DocumentFacade<N>>) -> Self {
        self.facade = facade;
        self
    }

    pub fn with_nodes_factory(mut self, factory: Arc<dyn NodesFactory<N>>) -> Self {
        self.nodes_factory = Some(factory);
        self
    }

    pub fn with_namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.namespaces.insert(prefix.into(), uri.into());
        self
    }

    pub fn with_namespace_resolver(mut self, resolver: NamespaceResolver) -> Self {
        self.namespace_resolver = Some(resolver);
        self
    }

    pub fn with_functions(mut self, registry: Arc<FunctionRegistry<N>>) -> Self {
        self.functions = Some(registry);
        self
    }

    pub fn with_selector_compiler(mut self, compiler: Arc<dyn SelectorCompiler>) -> Self {
        self.selector_compiler = Some(compiler);
        self
    }

    /// Fixes the instant returned by the current-date/time functions.
    pub fn with_now(mut self, now: DateTime<FixedOffset>) -> Self {
        self.now = Some(now);
        self
    }

    /// Overrides the implicit timezone, in minutes east of UTC.
    pub fn with_timezone(mut self, offset_minutes: i32) -> Self {
        self.timezone = FixedOffset::east_opt(offset_minutes * 60);
        self
    }

    pub fn build(self) -> DynamicContext<N> {
        let context_item = match self.context_node {
            Some(node) => {
                let kind = self.facade.kind(&node);
                Some(Value::node(node, kind))
            }
            None => self.context_item,
        };
        let context_sequence = self.context_sequence.or_else(|| context_item.clone().map(Sequence::singleton));
        let namespace_resolver = self.namespace_resolver.unwrap_or_else(|| {
            let bindings = self.namespaces;
            Arc::new(move |prefix: Option<&str>| match prefix {
                Some("xml") => Some(XML_URI.to_string()),
                Some(p) => bindings.get(p).cloned(),
                None => bindings.get("").cloned(),
            })
        });
        DynamicContext {
            context_item,
            context_item_index: 0,
            context_sequence,
            dom_facade: self.facade,
            nodes_factory: self.nodes_factory,
            functions: self.functions.unwrap_or_else(|| Arc::new(FunctionRegistry::with_builtins())),
            selector_compiler: self.selector_compiler,
            variables: Rc::new(self.variables),
            namespace_resolver,
            temporal: Rc::new(TemporalSnapshot::new(self.now, self.timezone)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::simple::{SimpleNode, doc, elem};
    use rstest::rstest;

    fn ctx() -> DynamicContext<SimpleNode> {
        DynamicContextBuilder::default()
            .with_variable(ExpandedName::local("x"), Sequence::singleton(Value::integer(1)))
            .with_namespace("p", "urn:p")
            .build()
    }

    #[rstest]
    fn variables_shadow_on_derivation() {
        let base = ctx();
        let derived = base.scope_with_variable(ExpandedName::local("x"), Sequence::singleton(Value::integer(2)));
        let read = |c: &DynamicContext<SimpleNode>| {
            c.lookup_variable(&ExpandedName::local("x")).unwrap().first().unwrap().ready().flatten()
        };
        assert_eq!(read(&derived), Some(Value::integer(2)));
        assert_eq!(read(&base), Some(Value::integer(1)));
    }

    #[rstest]
    fn unbound_variable_is_a_scope_error() {
        let err = ctx().lookup_variable(&ExpandedName::local("nope")).unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::XPST0008);
        assert_eq!(err.category(), ErrorCategory::Scope);
    }

    #[rstest]
    fn focus_iterator_tracks_positions() {
        let base = ctx();
        let seq = Sequence::from_values(vec![Value::string("a"), Value::string("b")]);
        let mut it = base.create_sequence_iterator(&seq);
        let mut seen = Vec::new();
        while let Some(scoped) = it.next_context().unwrap().ready().flatten() {
            seen.push((scoped.context_item_index, scoped.context_item.clone()));
            assert!(scoped.shares_temporal_snapshot(&base));
        }
        assert_eq!(seen, vec![(0, Some(Value::string("a"))), (1, Some(Value::string("b")))]);
    }

    #[rstest]
    fn temporal_snapshot_is_computed_once_and_shared() {
        let base = ctx();
        let child = base.scope_with_focus(0, Value::integer(1), None);
        let first = child.current_date_time();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(base.current_date_time(), first);
        assert_eq!(child.implicit_timezone(), *first.offset());
    }

    #[rstest]
    fn namespace_resolver_can_be_swapped() {
        let base = ctx();
        assert_eq!(base.resolve_namespace_prefix(Some("p")).as_deref(), Some("urn:p"));
        assert_eq!(base.resolve_namespace_prefix(Some("xml")).as_deref(), Some(XML_URI));
        let swapped = base.scope_with_namespace_resolver(Arc::new(|_| Some("urn:any".to_string())));
        assert_eq!(swapped.resolve_namespace_prefix(Some("p")).as_deref(), Some("urn:any"));
        assert_eq!(base.resolve_namespace_prefix(Some("q")), None);
    }

    #[rstest]
    fn context_node_reports_absent_focus() {
        let empty = DynamicContextBuilder::<SimpleNode>::default().build();
        assert_eq!(empty.context_node().unwrap_err().code_enum(), ErrorCode::XPDY0002);
        let root = doc().child(elem("a")).build();
        let with_node = DynamicContextBuilder::default().with_context_node(root.clone()).build();
        assert_eq!(with_node.context_node().unwrap().handle, root);
        let atomic = with_node.scope_with_focus(0, Value::integer(3), None);
        assert_eq!(atomic.context_node().unwrap_err().code_enum(), ErrorCode::XPTY0020);
    }

    #[rstest]
    fn error_codes_round_trip_through_display() {
        let err = Error::from_code(ErrorCode::FORG0001, "bad lexical form");
        assert_eq!(err.format_code(), "err:FORG0001");
        assert_eq!(err.to_string(), "error: bad lexical form (err:FORG0001)");
        assert_eq!(err.category(), ErrorCategory::Cast);
        assert_eq!(ErrorCode::from_local("XPTY0004"), ErrorCode::XPTY0004);
    }
}

//! Expression evaluation: runtime context, capabilities, selector trees, evaluation and builtins.

pub mod evaluator;
pub mod facade;
pub(crate) mod functions;
pub mod registry;
pub mod runtime;
pub mod selector;

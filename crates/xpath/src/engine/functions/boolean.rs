use crate::engine::runtime::{DynamicContext, Error};
use crate::ready;
use crate::xdm::{Fetch, NodeHandle, Sequence, Value};

use super::boolean_result;

pub(super) fn true_fn<N: NodeHandle>(_ctx: &DynamicContext<N>, _args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    boolean_result(true)
}

pub(super) fn false_fn<N: NodeHandle>(_ctx: &DynamicContext<N>, _args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    boolean_result(false)
}

/// Effective boolean value of the argument, pulled no further than needed.
fn ebv<N: NodeHandle>(arg: &Sequence<N>, negate: bool) -> Sequence<N> {
    let arg = arg.clone();
    Sequence::deferred(move || {
        let truth = ready!(arg.effective_boolean_value()?);
        Ok(Fetch::Ready(Sequence::singleton(Value::boolean(truth != negate))))
    })
}

pub(super) fn not_fn<N: NodeHandle>(_ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    Ok(ebv(&args[0], true))
}

pub(super) fn boolean_fn<N: NodeHandle>(_ctx: &DynamicContext<N>, args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    Ok(ebv(&args[0], false))
}

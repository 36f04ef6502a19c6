//! Variable-binding forms: quantifiers, `for`, `let` and the simple map operator.

use std::cell::OnceCell;
use std::rc::Rc;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::engine::runtime::{DynamicContext, Error, VariableThunk};
use crate::engine::selector::{Child, Quantifier};
use crate::ready;
use crate::xdm::{ExpandedName, Fetch, NodeHandle, Sequence, Value};

use super::eval;

/// Advances the rightmost index first; `false` once every combination was visited.
fn advance<T>(odometer: &mut [usize], domains: &[Vec<T>]) -> bool {
    for slot in (0..odometer.len()).rev() {
        odometer[slot] += 1;
        if odometer[slot] < domains[slot].len() {
            return true;
        }
        odometer[slot] = 0;
    }
    false
}

/// `some`/`every`. All `in` clauses are evaluated up front in the enclosing scope.
pub(super) fn quantified<N: NodeHandle>(
    quantifier: Quantifier,
    bindings: &[(ExpandedName, Child)],
    satisfies: &Child,
    ctx: &DynamicContext<N>,
) -> Result<Sequence<N>, Error> {
    let sources: Vec<Sequence<N>> = bindings.iter().map(|(_, s)| eval(s, ctx)).collect::<Result<_, _>>()?;
    let names: Vec<ExpandedName> = bindings.iter().map(|(name, _)| name.clone()).collect();
    let satisfies = Arc::clone(satisfies);
    let ctx = ctx.clone();
    let every = quantifier == Quantifier::Every;
    let mut domains: Vec<Vec<Value<N>>> = Vec::new();
    let mut odometer: SmallVec<[usize; 4]> = SmallVec::new();
    let mut current: Option<Sequence<N>> = None;
    Ok(Sequence::deferred(move || {
        while domains.len() < sources.len() {
            let values = ready!(sources[domains.len()].get_all_values()?);
            domains.push(values);
        }
        if domains.iter().any(Vec::is_empty) {
            return Ok(Fetch::Ready(Sequence::singleton(Value::boolean(every))));
        }
        if odometer.len() != domains.len() {
            odometer = SmallVec::from_elem(0, domains.len());
        }
        loop {
            let verdict = match &current {
                Some(verdict) => verdict.clone(),
                None => {
                    let mut scope = ctx.clone();
                    for ((name, domain), index) in names.iter().zip(&domains).zip(&odometer) {
                        scope = scope.scope_with_variable(name.clone(), Sequence::singleton(domain[*index].clone()));
                    }
                    let verdict = eval(&satisfies, &scope)?;
                    current = Some(verdict.clone());
                    verdict
                }
            };
            let holds = ready!(verdict.effective_boolean_value()?);
            current = None;
            if holds != every {
                return Ok(Fetch::Ready(Sequence::singleton(Value::boolean(holds))));
            }
            if !advance(&mut odometer, &domains) {
                return Ok(Fetch::Ready(Sequence::singleton(Value::boolean(every))));
            }
        }
    }))
}

pub(super) fn for_expr<N: NodeHandle>(bindings: &[(ExpandedName, Child)], body: &Child, ctx: &DynamicContext<N>) -> Result<Sequence<N>, Error> {
    let Some(((name, source), rest)) = bindings.split_first() else { return eval(body, ctx) };
    let input = eval(source, ctx)?;
    let name = name.clone();
    let rest: Vec<(ExpandedName, Child)> = rest.to_vec();
    let body = Arc::clone(body);
    let ctx = ctx.clone();
    Ok(input.flat_map(move |item, _| {
        let scope = ctx.scope_with_variable(name.clone(), Sequence::singleton(item));
        for_expr(&rest, &body, &scope)
    }))
}

/// The bound value is evaluated on first reference and shared by every later one.
pub(super) fn let_expr<N: NodeHandle>(name: &ExpandedName, value: &Child, body: &Child, ctx: &DynamicContext<N>) -> Result<Sequence<N>, Error> {
    let cell: Rc<OnceCell<Sequence<N>>> = Rc::new(OnceCell::new());
    let value = Arc::clone(value);
    let outer = ctx.clone();
    let thunk: VariableThunk<N> = Rc::new(move || {
        if let Some(bound) = cell.get() {
            return Ok(bound.clone());
        }
        let bound = eval(&value, &outer)?;
        Ok(cell.get_or_init(|| bound).clone())
    });
    eval(body, &ctx.scope_with_variables([(name.clone(), thunk)]))
}

pub(super) fn simple_map<N: NodeHandle>(lhs: &Child, rhs: &Child, ctx: &DynamicContext<N>) -> Result<Sequence<N>, Error> {
    let input = eval(lhs, ctx)?;
    let focus_sequence = input.clone();
    let rhs = Arc::clone(rhs);
    let ctx = ctx.clone();
    Ok(input.flat_map(move |item, index| {
        let focus = ctx.scope_with_focus(index, item, Some(focus_sequence.clone()));
        eval(&rhs, &focus)
    }))
}

#[cfg(test)]
mod tests {
    use super::advance;
    use rstest::rstest;

    #[rstest]
    fn odometer_varies_rightmost_fastest() {
        let domains = vec![vec!['a', 'b'], vec!['x', 'y', 'z']];
        let mut odometer = [0, 0];
        let mut seen = vec![odometer];
        while advance(&mut odometer, &domains) {
            seen.push(odometer);
        }
        assert_eq!(seen, vec![[0, 0], [0, 1], [0, 2], [1, 0], [1, 1], [1, 2]]);
    }
}

//! Lazy, memoizing, suspendable sequences.
//!
//! A [`Sequence`] is either materialized (a plain list) or driven by a [`SequenceCursor`]. Items
//! pulled from the cursor are buffered, which gives every sequence repeatable iteration and makes a
//! resumed pull continue at the item that suspended instead of starting over. Clones share the
//! buffer, so handing a sequence to several consumers produces each item once.

use core::fmt;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::engine::runtime::{Error, ErrorCode};
use crate::ready;
use crate::xdm::{Fetch, Step, Value};

/// Pull-based producer of values.
pub trait SequenceCursor<N> {
    fn next_item(&mut self) -> Result<Step<Value<N>>, Error>;
}

pub struct Sequence<N> {
    state: Rc<RefCell<SequenceState<N>>>,
}

struct SequenceState<N> {
    buffered: Vec<Value<N>>,
    source: Option<Box<dyn SequenceCursor<N>>>,
    exhausted: bool,
}

impl<N> Clone for Sequence<N> {
    fn clone(&self) -> Self {
        Self { state: Rc::clone(&self.state) }
    }
}

impl<N: fmt::Debug> fmt::Debug for Sequence<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Sequence").field("buffered", &state.buffered).field("exhausted", &state.exhausted).finish()
    }
}

impl<N: Clone + 'static> Sequence<N> {
    pub fn empty() -> Self {
        Self::from_values(Vec::new())
    }

    pub fn singleton(value: Value<N>) -> Self {
        Self::from_values(vec![value])
    }

    pub fn from_values(values: Vec<Value<N>>) -> Self {
        Self { state: Rc::new(RefCell::new(SequenceState { buffered: values, source: None, exhausted: true })) }
    }

    pub fn from_cursor(cursor: impl SequenceCursor<N> + 'static) -> Self {
        Self {
            state: Rc::new(RefCell::new(SequenceState {
                buffered: Vec::new(),
                source: Some(Box::new(cursor)),
                exhausted: false,
            })),
        }
    }

    /// A sequence generated by a stepper closure.
    pub fn from_stepper<F>(stepper: F) -> Self
    where
        F: FnMut() -> Result<Step<Value<N>>, Error> + 'static,
    {
        Self::from_cursor(StepperCursor(stepper))
    }

    /// A sequence whose construction itself may suspend. The thunk is retried until it yields a
    /// sequence, after which it is never called again.
    pub fn deferred<F>(thunk: F) -> Self
    where
        F: FnMut() -> Result<Fetch<Sequence<N>>, Error> + 'static,
    {
        Self::from_cursor(DeferredCursor { thunk: Some(thunk), delegate: None })
    }

    /// Length without pulling, known once the sequence is fully produced.
    pub fn known_len(&self) -> Option<usize> {
        let state = self.state.borrow();
        state.exhausted.then_some(state.buffered.len())
    }

    pub fn is_materialized(&self) -> bool {
        self.state.borrow().exhausted
    }

    /// The items, if the sequence is fully produced.
    pub fn materialized(&self) -> Option<Vec<Value<N>>> {
        let state = self.state.borrow();
        state.exhausted.then(|| state.buffered.clone())
    }

    pub fn iter(&self) -> SequenceIter<N> {
        SequenceIter { sequence: self.clone(), position: 0 }
    }

    /// Item at a 0-based position, producing items up to it if needed.
    pub fn item_at(&self, index: usize) -> Result<Step<Value<N>>, Error> {
        loop {
            let mut source = {
                let mut state = self.state.borrow_mut();
                if let Some(value) = state.buffered.get(index) {
                    return Ok(Fetch::Ready(Some(value.clone())));
                }
                if state.exhausted {
                    return Ok(Fetch::Ready(None));
                }
                match state.source.take() {
                    Some(source) => source,
                    None => {
                        return Err(Error::from_code(
                            ErrorCode::FOER0000,
                            "sequence was pulled while producing its own next item",
                        ));
                    }
                }
            };
            let step = source.next_item();
            let mut state = self.state.borrow_mut();
            match step {
                Ok(Fetch::Ready(Some(value))) => {
                    state.buffered.push(value);
                    state.source = Some(source);
                }
                Ok(Fetch::Ready(None)) => state.exhausted = true,
                Ok(Fetch::NotReady(pending)) => {
                    state.source = Some(source);
                    return Ok(Fetch::NotReady(pending));
                }
                Err(err) => {
                    state.source = Some(source);
                    return Err(err);
                }
            }
        }
    }

    pub fn first(&self) -> Result<Step<Value<N>>, Error> {
        self.item_at(0)
    }

    pub fn is_empty(&self) -> Result<Fetch<bool>, Error> {
        Ok(Fetch::Ready(ready!(self.item_at(0)?).is_none()))
    }

    pub fn is_singleton(&self) -> Result<Fetch<bool>, Error> {
        if ready!(self.item_at(0)?).is_none() {
            return Ok(Fetch::Ready(false));
        }
        Ok(Fetch::Ready(ready!(self.item_at(1)?).is_none()))
    }

    /// Forces full materialization.
    pub fn get_all_values(&self) -> Result<Fetch<Vec<Value<N>>>, Error> {
        loop {
            let len = self.state.borrow().buffered.len();
            if ready!(self.item_at(len)?).is_none() {
                return Ok(Fetch::Ready(self.state.borrow().buffered.clone()));
            }
        }
    }

    pub fn effective_boolean_value(&self) -> Result<Fetch<bool>, Error> {
        let first = match ready!(self.item_at(0)?) {
            None => return Ok(Fetch::Ready(false)),
            Some(Value::Node(_)) => return Ok(Fetch::Ready(true)),
            Some(first) => first,
        };
        if ready!(self.item_at(1)?).is_some() {
            return Err(Error::from_code(
                ErrorCode::FORG0006,
                "effective boolean value is not defined for a sequence of two or more items starting with a non-node",
            ));
        }
        match first {
            Value::Atomic(a) => a.effective_boolean_value().map(Fetch::Ready),
            _ => Err(Error::from_code(ErrorCode::FORG0006, "effective boolean value is not defined for a function")),
        }
    }

    /// Order-preserving concatenation.
    pub fn merge(&self, other: &Sequence<N>) -> Sequence<N> {
        if other.known_len() == Some(0) {
            return self.clone();
        }
        if self.known_len() == Some(0) {
            return other.clone();
        }
        Self::concat(vec![self.clone(), other.clone()])
    }

    pub fn concat(parts: Vec<Sequence<N>>) -> Sequence<N> {
        let mut parts: Vec<Sequence<N>> = parts.into_iter().filter(|p| p.known_len() != Some(0)).collect();
        if parts.len() <= 1 {
            return parts.pop().unwrap_or_else(Self::empty);
        }
        if parts.iter().all(Sequence::is_materialized) {
            let values = parts.iter().filter_map(Sequence::materialized).flatten().collect();
            return Self::from_values(values);
        }
        Self::from_cursor(ConcatCursor { parts: parts.iter().map(Sequence::iter).collect() })
    }

    pub fn map_values<F>(&self, mut f: F) -> Sequence<N>
    where
        F: FnMut(Value<N>) -> Result<Value<N>, Error> + 'static,
    {
        let mut source = self.iter();
        Self::from_stepper(move || match ready!(source.next_item()?) {
            Some(value) => f(value).map(|v| Fetch::Ready(Some(v))),
            None => Ok(Fetch::Ready(None)),
        })
    }

    /// Maps every item (with its 0-based position) to a sequence and concatenates the results lazily.
    pub fn flat_map<F>(&self, f: F) -> Sequence<N>
    where
        F: FnMut(Value<N>, usize) -> Result<Sequence<N>, Error> + 'static,
    {
        Self::from_cursor(FlatMapCursor { outer: self.iter(), index: 0, inner: None, f })
    }

    /// Materializes the sequence once and hands the values to `f`.
    pub fn map_all<F>(&self, mut f: F) -> Sequence<N>
    where
        F: FnMut(Vec<Value<N>>) -> Result<Sequence<N>, Error> + 'static,
    {
        let source = self.clone();
        Self::deferred(move || {
            let values = ready!(source.get_all_values()?);
            f(values).map(Fetch::Ready)
        })
    }

    pub fn head(&self) -> Sequence<N> {
        let source = self.clone();
        Self::deferred(move || {
            Ok(Fetch::Ready(match ready!(source.first()?) {
                Some(v) => Self::singleton(v),
                None => Self::empty(),
            }))
        })
    }

    pub fn tail(&self) -> Sequence<N> {
        Self::from_cursor(SliceCursor { source: self.iter(), skip: 1, take: usize::MAX })
    }

    /// Items at 1-based positions `p` with `round(start) <= p < round(start) + round(length)`.
    pub fn subsequence(&self, start: f64, length: Option<f64>) -> Sequence<N> {
        let first = round_half_up(start);
        let end = length.map_or(f64::INFINITY, |len| first + round_half_up(len));
        if first.is_nan() || end.is_nan() {
            return Self::empty();
        }
        let lo = first.max(1.0);
        if end <= lo {
            return Self::empty();
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let skip = (lo - 1.0).min(usize::MAX as f64) as usize;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let take = if end.is_infinite() { usize::MAX } else { (end - lo).min(usize::MAX as f64) as usize };
        if let Some(values) = self.materialized() {
            return Self::from_values(values.into_iter().skip(skip).take(take).collect());
        }
        Self::from_cursor(SliceCursor { source: self.iter(), skip, take })
    }

    /// Splices `inserts` before the 1-based `position`, clamped into `[1, len + 1]`.
    pub fn insert_before(&self, position: i64, inserts: &Sequence<N>) -> Sequence<N> {
        let inserts = inserts.clone();
        self.map_all(move |values| {
            let upper = i64::try_from(values.len()).unwrap_or(i64::MAX).saturating_add(1);
            let at = usize::try_from(position.clamp(1, upper) - 1).unwrap_or(values.len());
            let (before, after) = values.split_at(at);
            Ok(Self::concat(vec![
                Self::from_values(before.to_vec()),
                inserts.clone(),
                Self::from_values(after.to_vec()),
            ]))
        })
    }

    /// Drops the item at the 1-based `position`; out-of-range positions leave the sequence unchanged.
    pub fn remove(&self, position: i64) -> Sequence<N> {
        self.map_all(move |mut values| {
            if position >= 1
                && let Ok(index) = usize::try_from(position - 1)
                && index < values.len()
            {
                values.remove(index);
            }
            Ok(Self::from_values(values))
        })
    }

    pub fn reverse(&self) -> Sequence<N> {
        self.map_all(|mut values| {
            values.reverse();
            Ok(Self::from_values(values))
        })
    }
}

fn round_half_up(x: f64) -> f64 {
    (x + 0.5).floor()
}

/// Cursor over a sequence's shared buffer.
pub struct SequenceIter<N> {
    sequence: Sequence<N>,
    position: usize,
}

impl<N> SequenceIter<N> {
    /// Number of items already handed out.
    pub fn position(&self) -> usize {
        self.position
    }
}

impl<N: Clone + 'static> SequenceCursor<N> for SequenceIter<N> {
    fn next_item(&mut self) -> Result<Step<Value<N>>, Error> {
        let step = self.sequence.item_at(self.position)?;
        if let Fetch::Ready(Some(_)) = step {
            self.position += 1;
        }
        Ok(step)
    }
}

struct StepperCursor<F>(F);

impl<N, F> SequenceCursor<N> for StepperCursor<F>
where
    F: FnMut() -> Result<Step<Value<N>>, Error>,
{
    fn next_item(&mut self) -> Result<Step<Value<N>>, Error> {
        (self.0)()
    }
}

struct DeferredCursor<N, F> {
    thunk: Option<F>,
    delegate: Option<SequenceIter<N>>,
}

impl<N, F> SequenceCursor<N> for DeferredCursor<N, F>
where
    N: Clone + 'static,
    F: FnMut() -> Result<Fetch<Sequence<N>>, Error>,
{
    fn next_item(&mut self) -> Result<Step<Value<N>>, Error> {
        if self.delegate.is_none() {
            let Some(thunk) = self.thunk.as_mut() else { return Ok(Fetch::Ready(None)) };
            let sequence = ready!(thunk()?);
            self.thunk = None;
            self.delegate = Some(sequence.iter());
        }
        match self.delegate.as_mut() {
            Some(delegate) => delegate.next_item(),
            None => Ok(Fetch::Ready(None)),
        }
    }
}

struct ConcatCursor<N> {
    parts: VecDeque<SequenceIter<N>>,
}

impl<N: Clone + 'static> SequenceCursor<N> for ConcatCursor<N> {
    fn next_item(&mut self) -> Result<Step<Value<N>>, Error> {
        while let Some(front) = self.parts.front_mut() {
            match front.next_item()? {
                Fetch::Ready(None) => {
                    self.parts.pop_front();
                }
                step => return Ok(step),
            }
        }
        Ok(Fetch::Ready(None))
    }
}

struct FlatMapCursor<N, F> {
    outer: SequenceIter<N>,
    index: usize,
    inner: Option<SequenceIter<N>>,
    f: F,
}

impl<N, F> SequenceCursor<N> for FlatMapCursor<N, F>
where
    N: Clone + 'static,
    F: FnMut(Value<N>, usize) -> Result<Sequence<N>, Error>,
{
    fn next_item(&mut self) -> Result<Step<Value<N>>, Error> {
        loop {
            if let Some(inner) = self.inner.as_mut() {
                match inner.next_item()? {
                    Fetch::Ready(None) => self.inner = None,
                    step => return Ok(step),
                }
                continue;
            }
            let Some(value) = ready!(self.outer.next_item()?) else { return Ok(Fetch::Ready(None)) };
            let produced = (self.f)(value, self.index)?;
            self.index += 1;
            self.inner = Some(produced.iter());
        }
    }
}

struct SliceCursor<N> {
    source: SequenceIter<N>,
    skip: usize,
    take: usize,
}

impl<N: Clone + 'static> SequenceCursor<N> for SliceCursor<N> {
    fn next_item(&mut self) -> Result<Step<Value<N>>, Error> {
        while self.skip > 0 {
            if ready!(self.source.next_item()?).is_none() {
                self.skip = 0;
                self.take = 0;
                return Ok(Fetch::Ready(None));
            }
            self.skip -= 1;
        }
        if self.take == 0 {
            return Ok(Fetch::Ready(None));
        }
        let step = self.source.next_item()?;
        if let Fetch::Ready(Some(_)) = step {
            self.take -= 1;
        }
        Ok(step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xdm::Pending;
    use rstest::rstest;
    use std::cell::Cell;

    type S = Sequence<()>;

    fn strings(items: &[&str]) -> S {
        Sequence::from_values(items.iter().map(|s| Value::string(*s)).collect())
    }

    fn ready_values(seq: &S) -> Vec<String> {
        match seq.get_all_values().unwrap() {
            Fetch::Ready(values) => values
                .into_iter()
                .map(|v| v.as_atomic().map(|a| a.lexical()).unwrap_or_default())
                .collect(),
            Fetch::NotReady(p) => panic!("unexpected suspension: {p:?}"),
        }
    }

    fn counted(n: i64, pulls: Rc<Cell<usize>>) -> S {
        let mut i = 0;
        Sequence::from_stepper(move || {
            pulls.set(pulls.get() + 1);
            i += 1;
            Ok(Fetch::Ready((i <= n).then(|| Value::integer(i))))
        })
    }

    #[rstest]
    #[case(&[])]
    #[case(&["a"])]
    #[case(&["a", "b", "c"])]
    fn merge_with_empty_is_identity(#[case] items: &[&str]) {
        let seq = strings(items);
        let merged = seq.merge(&Sequence::empty());
        assert_eq!(ready_values(&merged), ready_values(&seq));
        assert_eq!(merged.is_empty().unwrap().ready(), Some(items.is_empty()));
        assert_eq!(merged.is_singleton().unwrap().ready(), Some(items.len() == 1));
    }

    #[rstest]
    fn lazy_sequence_is_repeatable_and_pulled_once() {
        let pulls = Rc::new(Cell::new(0));
        let seq = counted(3, Rc::clone(&pulls));
        assert_eq!(ready_values(&seq), ["1", "2", "3"]);
        assert_eq!(ready_values(&seq), ["1", "2", "3"]);
        assert_eq!(pulls.get(), 4);
        assert_eq!(seq.known_len(), Some(3));
    }

    #[rstest]
    fn is_empty_pulls_only_one_item() {
        let pulls = Rc::new(Cell::new(0));
        let seq = counted(1_000, Rc::clone(&pulls));
        assert_eq!(seq.is_empty().unwrap().ready(), Some(false));
        assert_eq!(pulls.get(), 1);
        assert_eq!(seq.known_len(), None);
    }

    #[rstest]
    #[case(0, &["x", "a", "b", "c"])]
    #[case(1, &["x", "a", "b", "c"])]
    #[case(2, &["a", "x", "b", "c"])]
    #[case(10, &["a", "b", "c", "x"])]
    fn insert_before_clamps_position(#[case] position: i64, #[case] expected: &[&str]) {
        let seq = strings(&["a", "b", "c"]);
        assert_eq!(ready_values(&seq.insert_before(position, &strings(&["x"]))), expected);
        assert_eq!(ready_values(&seq), ["a", "b", "c"]);
    }

    #[rstest]
    #[case(0, &["a", "b", "c"])]
    #[case(2, &["a", "c"])]
    #[case(4, &["a", "b", "c"])]
    fn remove_outside_range_is_noop(#[case] position: i64, #[case] expected: &[&str]) {
        assert_eq!(ready_values(&strings(&["a", "b", "c"]).remove(position)), expected);
    }

    #[rstest]
    #[case(2.0, Some(2.0), &["b", "c"])]
    #[case(1.5, Some(1.4), &["b"])]
    #[case(-1.0, Some(3.0), &["a"])]
    #[case(3.0, None, &["c", "d"])]
    #[case(0.0, Some(f64::INFINITY), &["a", "b", "c", "d"])]
    #[case(f64::NAN, Some(2.0), &[])]
    #[case(f64::NEG_INFINITY, Some(f64::INFINITY), &[])]
    fn subsequence_rounds_and_clamps(#[case] start: f64, #[case] len: Option<f64>, #[case] expected: &[&str]) {
        let seq = strings(&["a", "b", "c", "d"]);
        assert_eq!(ready_values(&seq.subsequence(start, len)), expected);
    }

    #[rstest]
    fn subsequence_of_lazy_input_stops_early() {
        let pulls = Rc::new(Cell::new(0));
        let seq = counted(1_000_000, Rc::clone(&pulls)).subsequence(5.0, Some(2.0));
        assert_eq!(ready_values(&seq), ["5", "6"]);
        assert_eq!(pulls.get(), 6);
    }

    #[rstest]
    fn head_tail_and_reverse() {
        let seq = strings(&["a", "b", "c"]);
        assert_eq!(ready_values(&seq.head()), ["a"]);
        assert_eq!(ready_values(&seq.tail()), ["b", "c"]);
        assert_eq!(ready_values(&seq.reverse()), ["c", "b", "a"]);
        assert!(ready_values(&strings(&["a"]).tail()).is_empty());
        assert!(ready_values(&S::empty().head()).is_empty());
    }

    #[rstest]
    #[case(strings(&[]), false)]
    #[case(strings(&["x"]), true)]
    #[case(strings(&[""]), false)]
    #[case(Sequence::singleton(Value::double(f64::NAN)), false)]
    #[case(Sequence::singleton(Value::integer(3)), true)]
    #[case(Sequence::from_values(vec![Value::node((), crate::model::NodeKind::Text), Value::integer(0)]), true)]
    fn effective_boolean_value_rules(#[case] seq: S, #[case] expected: bool) {
        assert_eq!(seq.effective_boolean_value().unwrap().ready(), Some(expected));
    }

    #[rstest]
    fn effective_boolean_value_of_two_atomics_fails() {
        let err = strings(&["a", "b"]).effective_boolean_value().unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::FORG0006);
    }

    #[rstest]
    fn suspension_resumes_without_replaying_completed_steps() {
        let pending = Pending::new("slow source");
        let gate = pending.clone();
        let pulls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&pulls);
        let mut i = 0;
        let seq: S = Sequence::from_stepper(move || {
            counter.set(counter.get() + 1);
            if i == 1 && !gate.is_resolved() {
                return Ok(Fetch::NotReady(gate.clone()));
            }
            i += 1;
            Ok(Fetch::Ready((i <= 2).then(|| Value::integer(i))))
        });
        let merged = strings(&["x"]).merge(&seq);
        let first = merged.get_all_values().unwrap();
        assert!(first.pending().is_some_and(|p| p.same_as(&pending)));
        pending.resolve();
        let values = ready_values(&merged);
        assert_eq!(values, ["x", "1", "2"]);
        assert_eq!(pulls.get(), 4);
    }
}

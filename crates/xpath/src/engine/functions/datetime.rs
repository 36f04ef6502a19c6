use crate::engine::runtime::{DynamicContext, Error};
use crate::xdm::{AtomicValue, NodeHandle, Sequence};

use super::atomic;

// All four read the context's temporal snapshot, so they agree within one evaluation.

pub(super) fn current_date_time_fn<N: NodeHandle>(ctx: &DynamicContext<N>, _args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    let now = ctx.current_date_time();
    atomic(AtomicValue::DateTime { value: now.naive_local(), tz: Some(*now.offset()) })
}

pub(super) fn current_date_fn<N: NodeHandle>(ctx: &DynamicContext<N>, _args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    let now = ctx.current_date_time();
    atomic(AtomicValue::Date { date: now.date_naive(), tz: Some(*now.offset()) })
}

pub(super) fn current_time_fn<N: NodeHandle>(ctx: &DynamicContext<N>, _args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    let now = ctx.current_date_time();
    atomic(AtomicValue::Time { time: now.time(), tz: Some(*now.offset()) })
}

pub(super) fn implicit_timezone_fn<N: NodeHandle>(ctx: &DynamicContext<N>, _args: &[Sequence<N>]) -> Result<Sequence<N>, Error> {
    atomic(AtomicValue::DayTimeDuration(i64::from(ctx.implicit_timezone().local_minus_utc())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::runtime::DynamicContextBuilder;
    use crate::model::simple::SimpleNode;
    use chrono::{DateTime, NaiveDate};
    use rstest::rstest;

    fn only(seq: Sequence<SimpleNode>) -> AtomicValue {
        seq.materialized().unwrap()[0].as_atomic().cloned().unwrap()
    }

    #[rstest]
    fn snapshot_drives_every_clock_function() {
        let now = DateTime::parse_from_rfc3339("2024-02-29T23:30:00+02:00").unwrap();
        let ctx = DynamicContextBuilder::<SimpleNode>::default().with_now(now).build();
        assert_eq!(only(current_date_time_fn(&ctx, &[]).unwrap()).lexical(), "2024-02-29T23:30:00+02:00");
        assert_eq!(
            only(current_date_fn(&ctx, &[]).unwrap()),
            AtomicValue::Date { date: NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(), tz: Some(*now.offset()) }
        );
        assert_eq!(only(current_time_fn(&ctx, &[]).unwrap()).lexical(), "23:30:00+02:00");
        assert_eq!(only(implicit_timezone_fn(&ctx, &[]).unwrap()), AtomicValue::DayTimeDuration(7200));
    }
}

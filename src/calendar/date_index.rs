use std::collections::BTreeMap;

use chrono::{Local, NaiveDate, TimeZone};

use crate::calendar::{Event, days};

/// Events grouped by the local calendar days they occupy.
///
/// Built from a snapshot and never patched; rebuild it when the event list
/// changes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalendarDateIndex<'a> {
    buckets: BTreeMap<NaiveDate, Vec<&'a Event>>,
}

impl<'a> CalendarDateIndex<'a> {
    pub fn events_on(&self, date: NaiveDate) -> &[&'a Event] {
        self.buckets.get(&date).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_events(&self, date: NaiveDate) -> bool {
        !self.events_on(date).is_empty()
    }

    pub fn occupies(&self, event_id: &str, date: NaiveDate) -> bool {
        self.events_on(date).iter().any(|e| e.id == event_id)
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.buckets.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

pub fn build_date_index(events: &[Event]) -> CalendarDateIndex<'_> {
    build_date_index_in(events, &Local)
}

pub fn build_date_index_in<'a, Tz: TimeZone>(events: &'a [Event], tz: &Tz) -> CalendarDateIndex<'a> {
    let mut buckets: BTreeMap<NaiveDate, Vec<&'a Event>> = BTreeMap::new();

    for event in events {
        let last_day = days::local_day(event.end_at, tz);
        let mut day = days::local_day(event.start_at, tz);
        loop {
            buckets.entry(day).or_default().push(event);
            // A reversed range stops here too, leaving a single-day event.
            if day >= last_day {
                break;
            }
            let Some(next) = day.succ_opt() else { break };
            day = next;
        }
    }

    CalendarDateIndex { buckets }
}

use std::collections::BTreeSet;

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};

use crate::calendar::{Event, RsvpStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewMode {
    #[default]
    Upcoming,
    SelectedDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RsvpFilter {
    #[default]
    All,
    Going,
    Maybe,
    Declined,
}

impl RsvpFilter {
    /// Exact match only; an event with no response passes `All` and nothing else.
    pub fn matches(&self, rsvp: Option<RsvpStatus>) -> bool {
        match self {
            RsvpFilter::All => true,
            RsvpFilter::Going => rsvp == Some(RsvpStatus::Going),
            RsvpFilter::Maybe => rsvp == Some(RsvpStatus::Maybe),
            RsvpFilter::Declined => rsvp == Some(RsvpStatus::Declined),
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "all" => Some(RsvpFilter::All),
            other => RsvpStatus::parse(other).map(RsvpFilter::from),
        }
    }
}

impl From<RsvpStatus> for RsvpFilter {
    fn from(status: RsvpStatus) -> Self {
        match status {
            RsvpStatus::Going => RsvpFilter::Going,
            RsvpStatus::Maybe => RsvpFilter::Maybe,
            RsvpStatus::Declined => RsvpFilter::Declined,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    pub view_mode: ViewMode,
    pub rsvp: RsvpFilter,
    pub tag_ids: BTreeSet<String>,
}

impl FilterState {
    pub fn with_view_mode(mut self, view_mode: ViewMode) -> Self {
        self.view_mode = view_mode;
        self
    }

    pub fn with_rsvp(mut self, rsvp: RsvpFilter) -> Self {
        self.rsvp = rsvp;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tag_ids = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Adds the tag if absent, removes it otherwise.
    pub fn toggle_tag(&mut self, tag_id: &str) {
        if !self.tag_ids.remove(tag_id) {
            self.tag_ids.insert(tag_id.to_string());
        }
    }
}

pub fn apply_filters<'a>(
    events: &'a [Event],
    state: &FilterState,
    now: DateTime<Utc>,
    selected_date: NaiveDate,
) -> Vec<&'a Event> {
    apply_filters_in(events, state, now, selected_date, &Local)
}

/// View mode, then RSVP, then tags, then a stable sort on start time.
/// Every stage only narrows; the result borrows from `events`.
pub fn apply_filters_in<'a, Tz: TimeZone>(
    events: &'a [Event],
    state: &FilterState,
    now: DateTime<Utc>,
    selected_date: NaiveDate,
    tz: &Tz,
) -> Vec<&'a Event> {
    let mut visible: Vec<&'a Event> = events
        .iter()
        .filter(|event| match state.view_mode {
            ViewMode::Upcoming => event.end_at >= now,
            ViewMode::SelectedDate => event.occupies_in(selected_date, tz),
        })
        .filter(|event| state.rsvp.matches(event.my_rsvp))
        .filter(|event| state.tag_ids.is_empty() || event.has_any_tag(&state.tag_ids))
        .collect();

    visible.sort_by_key(|event| event.start_at);
    visible
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn create_event(id: &str, start: &str, end: &str) -> Event {
        Event {
            id: id.to_string(),
            title: id.to_string(),
            description: None,
            location: None,
            start_at: at(start),
            end_at: at(end),
            is_all_day: false,
            my_rsvp: None,
            audience_tags: BTreeSet::new(),
            image_path: None,
        }
    }

    fn tagged(mut event: Event, tags: &[&str]) -> Event {
        event.audience_tags = tags.iter().map(|t| t.to_string()).collect();
        event
    }

    fn ids(events: &[&Event]) -> Vec<String> {
        events.iter().map(|e| e.id.clone()).collect()
    }

    fn sample_pair() -> Vec<Event> {
        vec![
            create_event("A", "2024-03-10T09:00:00Z", "2024-03-10T10:00:00Z"),
            create_event("B", "2024-03-09T22:00:00Z", "2024-03-11T01:00:00Z"),
        ]
    }

    #[test]
    fn default_state_is_upcoming_all_untagged() {
        let state = FilterState::default();

        assert_eq!(state.view_mode, ViewMode::Upcoming);
        assert_eq!(state.rsvp, RsvpFilter::All);
        assert!(state.tag_ids.is_empty());
    }

    #[test]
    fn selected_date_mode_returns_overlapping_events_sorted() {
        let events = sample_pair();
        let state = FilterState::default().with_view_mode(ViewMode::SelectedDate);

        let result = apply_filters_in(&events, &state, at("2024-01-01T00:00:00Z"), date(2024, 3, 10), &Utc);

        assert_eq!(ids(&result), vec!["B", "A"]);
    }

    #[test]
    fn upcoming_keeps_events_until_they_have_ended() {
        let events = sample_pair();
        let state = FilterState::default();

        let result = apply_filters_in(&events, &state, at("2024-03-10T12:00:00Z"), date(2024, 3, 10), &Utc);

        assert_eq!(ids(&result), vec!["B"]);
    }

    #[test]
    fn upcoming_includes_event_ending_exactly_now() {
        let events = vec![create_event("A", "2024-03-10T09:00:00Z", "2024-03-10T10:00:00Z")];

        let result = apply_filters_in(
            &events,
            &FilterState::default(),
            at("2024-03-10T10:00:00Z"),
            date(2024, 3, 10),
            &Utc,
        );

        assert_eq!(ids(&result), vec!["A"]);
    }

    #[test]
    fn untagged_event_excluded_when_tag_filter_active() {
        let events = vec![
            create_event("C", "2024-03-10T09:00:00Z", "2024-03-10T10:00:00Z"),
            tagged(create_event("T", "2024-03-10T11:00:00Z", "2024-03-10T12:00:00Z"), &["t1"]),
        ];
        let state = FilterState::default().with_tags(["t1"]);

        let result = apply_filters_in(&events, &state, at("2024-01-01T00:00:00Z"), date(2024, 3, 10), &Utc);

        assert_eq!(ids(&result), vec!["T"]);
    }

    #[test]
    fn tag_filter_uses_or_semantics() {
        let events = vec![
            tagged(create_event("one", "2024-03-10T09:00:00Z", "2024-03-10T10:00:00Z"), &["t1"]),
            tagged(create_event("two", "2024-03-10T11:00:00Z", "2024-03-10T12:00:00Z"), &["t2"]),
            tagged(create_event("three", "2024-03-10T13:00:00Z", "2024-03-10T14:00:00Z"), &["t3"]),
        ];
        let state = FilterState::default().with_tags(["t1", "t2"]);

        let result = apply_filters_in(&events, &state, at("2024-01-01T00:00:00Z"), date(2024, 3, 10), &Utc);

        assert_eq!(ids(&result), vec!["one", "two"]);
    }

    #[test]
    fn rsvp_filter_is_exact_match() {
        let mut going = create_event("G", "2024-03-10T09:00:00Z", "2024-03-10T10:00:00Z");
        going.my_rsvp = Some(RsvpStatus::Going);
        let no_answer = create_event("D", "2024-03-10T11:00:00Z", "2024-03-10T12:00:00Z");
        let events = vec![going, no_answer];
        let now = at("2024-01-01T00:00:00Z");

        let only_going = FilterState::default().with_rsvp(RsvpFilter::Going);
        let everything = FilterState::default();

        assert_eq!(ids(&apply_filters_in(&events, &only_going, now, date(2024, 3, 10), &Utc)), vec!["G"]);
        assert_eq!(ids(&apply_filters_in(&events, &everything, now, date(2024, 3, 10), &Utc)), vec!["G", "D"]);
        for status in [RsvpFilter::Maybe, RsvpFilter::Declined] {
            let state = FilterState::default().with_rsvp(status);
            assert!(apply_filters_in(&events, &state, now, date(2024, 3, 10), &Utc).is_empty());
        }
    }

    #[test]
    fn sort_keeps_input_order_for_equal_start_times() {
        let events = vec![
            create_event("late", "2024-03-10T12:00:00Z", "2024-03-10T13:00:00Z"),
            create_event("first", "2024-03-10T09:00:00Z", "2024-03-10T10:00:00Z"),
            create_event("second", "2024-03-10T09:00:00Z", "2024-03-10T11:00:00Z"),
        ];

        let result = apply_filters_in(&events, &FilterState::default(), at("2024-01-01T00:00:00Z"), date(2024, 3, 10), &Utc);

        assert_eq!(ids(&result), vec!["first", "second", "late"]);
    }

    #[test]
    fn toggle_tag_adds_then_removes() {
        let mut state = FilterState::default();

        state.toggle_tag("t1");
        assert!(state.tag_ids.contains("t1"));

        state.toggle_tag("t1");
        assert!(state.tag_ids.is_empty());
    }

    #[test]
    fn rsvp_filter_parses_all_and_statuses() {
        assert_eq!(RsvpFilter::parse("ALL"), Some(RsvpFilter::All));
        assert_eq!(RsvpFilter::parse("declined"), Some(RsvpFilter::Declined));
        assert_eq!(RsvpFilter::parse("later"), None);
    }

    fn arb_event() -> impl Strategy<Value = Event> {
        (
            0i64..20,
            0i64..48,
            prop::option::of(prop_oneof![
                Just(RsvpStatus::Going),
                Just(RsvpStatus::Maybe),
                Just(RsvpStatus::Declined)
            ]),
            prop::collection::btree_set(prop_oneof![Just("t1"), Just("t2"), Just("t3")], 0..3),
        )
            .prop_map(|(start_hour, len_hours, rsvp, tags)| {
                let start = at("2024-03-01T00:00:00Z") + chrono::Duration::hours(start_hour * 6);
                Event {
                    id: format!("e{}-{}", start_hour, len_hours),
                    title: "generated".to_string(),
                    description: None,
                    location: None,
                    start_at: start,
                    end_at: start + chrono::Duration::hours(len_hours),
                    is_all_day: false,
                    my_rsvp: rsvp,
                    audience_tags: tags.into_iter().map(String::from).collect(),
                    image_path: None,
                }
            })
    }

    fn arb_state() -> impl Strategy<Value = FilterState> {
        (
            prop_oneof![Just(ViewMode::Upcoming), Just(ViewMode::SelectedDate)],
            prop_oneof![
                Just(RsvpFilter::All),
                Just(RsvpFilter::Going),
                Just(RsvpFilter::Maybe),
                Just(RsvpFilter::Declined)
            ],
            prop::collection::btree_set(prop_oneof![Just("t1"), Just("t2"), Just("t4")], 0..3),
        )
            .prop_map(|(view_mode, rsvp, tags)| FilterState::default().with_view_mode(view_mode).with_rsvp(rsvp).with_tags(tags))
    }

    #[test]
    fn selected_date_agrees_with_index_for_sub_millisecond_times() {
        let events = vec![create_event("late", "2024-03-10T23:59:59.9995Z", "2024-03-10T23:59:59.9999Z")];
        let index = crate::calendar::build_date_index_in(&events, &Utc);
        let state = FilterState::default().with_view_mode(ViewMode::SelectedDate);

        let visible = apply_filters_in(&events, &state, at("2024-03-01T00:00:00Z"), date(2024, 3, 10), &Utc);

        assert!(index.occupies("late", date(2024, 3, 10)));
        assert_eq!(ids(&visible), vec!["late"]);
    }

    #[test]
    fn reversed_event_is_listed_on_its_start_day_only() {
        let events = vec![create_event("rev", "2024-03-10T09:00:00Z", "2024-03-09T09:00:00Z")];
        let state = FilterState::default().with_view_mode(ViewMode::SelectedDate);
        let now = at("2024-03-01T00:00:00Z");

        assert_eq!(ids(&apply_filters_in(&events, &state, now, date(2024, 3, 10), &Utc)), vec!["rev"]);
        assert!(apply_filters_in(&events, &state, now, date(2024, 3, 9), &Utc).is_empty());
    }

    proptest! {
        #[test]
        fn selected_date_matches_index_membership(
            start_nanos in 0i64..(5 * 86_400_000_000_000),
            len_nanos in 0i64..(2 * 86_400_000_000_000),
            day in 1u32..9,
        ) {
            let start = at("2024-03-01T00:00:00Z") + chrono::Duration::nanoseconds(start_nanos);
            let mut event = create_event("e", "2024-03-01T00:00:00Z", "2024-03-01T00:00:00Z");
            event.start_at = start;
            event.end_at = start + chrono::Duration::nanoseconds(len_nanos);
            let events = vec![event];
            let index = crate::calendar::build_date_index_in(&events, &Utc);
            let selected = date(2024, 3, day);

            prop_assert_eq!(index.occupies("e", selected), events[0].occupies_in(selected, &Utc));
        }

        #[test]
        fn output_is_sorted_subset_and_idempotent(
            events in prop::collection::vec(arb_event(), 0..30),
            state in arb_state(),
            now_hours in 0i64..120,
            day in 1u32..8,
        ) {
            let now = at("2024-03-01T00:00:00Z") + chrono::Duration::hours(now_hours);
            let selected = date(2024, 3, day);

            let first = apply_filters_in(&events, &state, now, selected, &Utc);
            let second = apply_filters_in(&events, &state, now, selected, &Utc);

            prop_assert!(first.len() <= events.len());
            for event in &first {
                prop_assert!(events.iter().any(|candidate| std::ptr::eq(candidate, *event)));
            }
            for (i, a) in first.iter().enumerate() {
                prop_assert!(!first[i + 1..].iter().any(|b| std::ptr::eq(*a, *b)));
            }
            for pair in first.windows(2) {
                prop_assert!(pair[0].start_at <= pair[1].start_at);
                if pair[0].start_at == pair[1].start_at {
                    let pos = |e: &Event| events.iter().position(|c| std::ptr::eq(c, e)).unwrap();
                    prop_assert!(pos(pair[0]) < pos(pair[1]));
                }
            }
            prop_assert_eq!(first.len(), second.len());
            for (a, b) in first.iter().zip(second.iter()) {
                prop_assert!(std::ptr::eq(*a, *b));
            }
        }
    }
}

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::days;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub is_all_day: bool,
    pub my_rsvp: Option<RsvpStatus>,
    pub audience_tags: BTreeSet<String>,
    pub image_path: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RsvpStatus {
    Going,
    Maybe,
    Declined,
}

impl RsvpStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RsvpStatus::Going => "going",
            RsvpStatus::Maybe => "maybe",
            RsvpStatus::Declined => "declined",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "going" => Some(RsvpStatus::Going),
            "maybe" => Some(RsvpStatus::Maybe),
            "declined" | "not_going" => Some(RsvpStatus::Declined),
            _ => None,
        }
    }
}

impl std::fmt::Display for RsvpStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Event {
    pub fn duration_minutes(&self) -> i64 {
        (self.end_at - self.start_at).num_minutes()
    }

    /// True when the event overlaps any part of `date` as seen in `tz`.
    /// A reversed range counts as a point event at `start_at`.
    pub fn occupies_in<Tz: TimeZone>(&self, date: NaiveDate, tz: &Tz) -> bool {
        days::overlaps_day(self.start_at, self.end_at.max(self.start_at), date, tz)
    }

    pub fn has_any_tag(&self, tag_ids: &BTreeSet<String>) -> bool {
        !self.audience_tags.is_disjoint(tag_ids)
    }

    pub fn with_rsvp(&self, rsvp: Option<RsvpStatus>) -> Event {
        Event {
            my_rsvp: rsvp,
            ..self.clone()
        }
    }

    pub fn with_audience_tags(&self, tags: BTreeSet<String>) -> Event {
        Event {
            audience_tags: tags,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn create_test_event(id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Event {
        Event {
            id: id.to_string(),
            title: format!("Event {}", id),
            description: None,
            location: None,
            start_at: start,
            end_at: end,
            is_all_day: false,
            my_rsvp: None,
            audience_tags: BTreeSet::new(),
            image_path: None,
        }
    }

    #[test]
    fn event_duration_calculated_correctly() {
        let start = at("2024-03-10T09:00:00Z");
        let event = create_test_event("a", start, start + chrono::Duration::minutes(90));

        assert_eq!(event.duration_minutes(), 90);
    }

    #[test]
    fn event_occupies_every_touched_day() {
        let event = create_test_event("b", at("2024-03-09T22:00:00Z"), at("2024-03-11T01:00:00Z"));
        let day = |d| NaiveDate::from_ymd_opt(2024, 3, d).unwrap();

        assert!(!event.occupies_in(day(8), &Utc));
        assert!(event.occupies_in(day(9), &Utc));
        assert!(event.occupies_in(day(10), &Utc));
        assert!(event.occupies_in(day(11), &Utc));
        assert!(!event.occupies_in(day(12), &Utc));
    }

    #[test]
    fn event_ending_exactly_at_midnight_touches_next_day() {
        let event = create_test_event("c", at("2024-03-10T20:00:00Z"), at("2024-03-11T00:00:00Z"));
        let next = NaiveDate::from_ymd_opt(2024, 3, 11).unwrap();

        assert!(event.occupies_in(next, &Utc));
    }

    #[test]
    fn with_rsvp_replaces_only_the_response() {
        let event = create_test_event("d", at("2024-03-10T09:00:00Z"), at("2024-03-10T10:00:00Z"));

        let updated = event.with_rsvp(Some(RsvpStatus::Going));

        assert_eq!(updated.my_rsvp, Some(RsvpStatus::Going));
        assert_eq!(event.my_rsvp, None);
        assert_eq!(updated.with_rsvp(None), event);
    }

    #[test]
    fn rsvp_status_parses_backend_spellings() {
        assert_eq!(RsvpStatus::parse("Going"), Some(RsvpStatus::Going));
        assert_eq!(RsvpStatus::parse("maybe"), Some(RsvpStatus::Maybe));
        assert_eq!(RsvpStatus::parse("not_going"), Some(RsvpStatus::Declined));
        assert_eq!(RsvpStatus::parse("unknown"), None);
    }

    #[test]
    fn has_any_tag_is_false_for_untagged_event() {
        let event = create_test_event("e", at("2024-03-10T09:00:00Z"), at("2024-03-10T10:00:00Z"));
        let wanted: BTreeSet<String> = ["t1".to_string()].into_iter().collect();

        assert!(!event.has_any_tag(&wanted));
    }
}

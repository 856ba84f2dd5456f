use std::collections::BTreeSet;
use std::fmt::Display;

use chrono::{DateTime, Datelike, Local, Months, NaiveDate, Utc};

use crate::calendar::{
    CalendarDateIndex, Event, FilterState, RsvpFilter, RsvpStatus, Tag, ViewMode, apply_filters,
    build_date_index, days,
};
use crate::sync::sync_engine::validate_id;
use crate::sync::{
    BackendApi, MutationError, MutationKey, MutationState, Optimistic, PendingMutations, SyncEngine,
    SyncError,
};
use crate::ui::month_view::{self, CalendarCell, GRID_CELLS};

#[derive(Debug, Clone, PartialEq)]
pub enum SyncStatus {
    Synced,
    Syncing,
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// Transient, non-blocking message for the user.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

pub struct AppState {
    pub selected_date: NaiveDate,
    pub month_anchor: NaiveDate,
    pub filter: FilterState,
    pub sync_status: SyncStatus,
    events: Vec<Event>,
    tags: Vec<Tag>,
    pending: PendingMutations,
    notices: Vec<Notice>,
}

impl AppState {
    pub fn new() -> Self {
        Self::starting_on(Local::now().date_naive())
    }

    pub fn starting_on(today: NaiveDate) -> Self {
        Self {
            selected_date: today,
            month_anchor: days::first_of_month(today),
            filter: FilterState::default(),
            sync_status: SyncStatus::Synced,
            events: Vec::new(),
            tags: Vec::new(),
            pending: PendingMutations::default(),
            notices: Vec::new(),
        }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn event(&self, event_id: &str) -> Option<&Event> {
        self.events.iter().find(|e| e.id == event_id)
    }

    /// Replaces the whole snapshot. Pending mutations stay pending.
    pub fn set_events(&mut self, events: Vec<Event>) {
        self.events = events;
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn set_tags(&mut self, tags: Vec<Tag>) {
        self.tags = tags;
    }

    pub fn tag_name(&self, tag_id: &str) -> Option<&str> {
        self.tags.iter().find(|t| t.id == tag_id).map(|t| t.name.as_str())
    }

    pub fn visible_events(&self, now: DateTime<Utc>) -> Vec<&Event> {
        apply_filters(&self.events, &self.filter, now, self.selected_date)
    }

    pub fn date_index(&self) -> CalendarDateIndex<'_> {
        build_date_index(&self.events)
    }

    pub fn month_cells(&self) -> [CalendarCell<'_>; GRID_CELLS] {
        let index = self.date_index();
        month_view::cells_for_month(self.month_anchor, &index, self.selected_date)
    }

    pub fn select_date(&mut self, date: NaiveDate) {
        self.selected_date = date;
        self.filter.view_mode = ViewMode::SelectedDate;
        if date.year() != self.month_anchor.year() || date.month() != self.month_anchor.month() {
            self.month_anchor = days::first_of_month(date);
        }
    }

    pub fn show_upcoming(&mut self) {
        self.filter.view_mode = ViewMode::Upcoming;
    }

    pub fn next_month(&mut self) {
        if let Some(next) = self.month_anchor.checked_add_months(Months::new(1)) {
            self.month_anchor = next;
        }
    }

    pub fn previous_month(&mut self) {
        if let Some(prev) = self.month_anchor.checked_sub_months(Months::new(1)) {
            self.month_anchor = prev;
        }
    }

    pub fn set_rsvp_filter(&mut self, rsvp: RsvpFilter) {
        self.filter.rsvp = rsvp;
    }

    pub fn toggle_tag_filter(&mut self, tag_id: &str) {
        self.filter.toggle_tag(tag_id);
    }

    pub fn mutation_state(&self, key: &MutationKey) -> MutationState {
        self.pending.state(key)
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    pub fn notify(&mut self, notice: Notice) {
        self.notices.push(notice);
    }

    fn position(&self, event_id: &str) -> Option<usize> {
        self.events.iter().position(|e| e.id == event_id)
    }

    fn check_id(kind: &str, id: &str) -> Result<(), MutationError> {
        validate_id(kind, id).map_err(|e| MutationError::InvalidInput(e.to_string()))
    }

    /// Writes the requested response locally and marks the RSVP pending.
    pub fn begin_rsvp(
        &mut self,
        event_id: &str,
        status: RsvpStatus,
    ) -> Result<Optimistic<Option<RsvpStatus>>, MutationError> {
        Self::check_id("event", event_id)?;
        let pos = self
            .position(event_id)
            .ok_or_else(|| MutationError::UnknownEvent(event_id.to_string()))?;
        let key = MutationKey::Rsvp(event_id.to_string());
        let token = self.pending.begin(key.clone())?;

        let previous = self.events[pos].my_rsvp;
        self.events[pos] = self.events[pos].with_rsvp(Some(status));

        Ok(Optimistic {
            key,
            token,
            previous,
            requested: Some(status),
        })
    }

    /// Adds the tag to the event if absent, removes it otherwise.
    pub fn begin_tag_toggle(
        &mut self,
        event_id: &str,
        tag_id: &str,
    ) -> Result<Optimistic<BTreeSet<String>>, MutationError> {
        Self::check_id("event", event_id)?;
        Self::check_id("tag", tag_id)?;
        let pos = self
            .position(event_id)
            .ok_or_else(|| MutationError::UnknownEvent(event_id.to_string()))?;
        let key = MutationKey::EventTags(event_id.to_string());
        let token = self.pending.begin(key.clone())?;

        let previous = self.events[pos].audience_tags.clone();
        let mut requested = previous.clone();
        if !requested.remove(tag_id) {
            requested.insert(tag_id.to_string());
        }
        self.events[pos] = self.events[pos].with_audience_tags(requested.clone());

        Ok(Optimistic {
            key,
            token,
            previous,
            requested,
        })
    }

    pub fn settle_rsvp<E: Display>(
        &mut self,
        ticket: Optimistic<Option<RsvpStatus>>,
        outcome: Result<(), E>,
    ) -> MutationState {
        self.settle(ticket, outcome, |e| e.my_rsvp, Event::with_rsvp, "your RSVP")
    }

    pub fn settle_tags<E: Display>(
        &mut self,
        ticket: Optimistic<BTreeSet<String>>,
        outcome: Result<(), E>,
    ) -> MutationState {
        self.settle(
            ticket,
            outcome,
            |e| e.audience_tags.clone(),
            Event::with_audience_tags,
            "the tags",
        )
    }

    fn settle<T: PartialEq, E: Display>(
        &mut self,
        ticket: Optimistic<T>,
        outcome: Result<(), E>,
        read: fn(&Event) -> T,
        write: fn(&Event, T) -> Event,
        what: &str,
    ) -> MutationState {
        if !self.pending.finish(&ticket.key, ticket.token) {
            tracing::debug!("Ignoring repeated settle for {:?}", ticket.key);
            return MutationState::Idle;
        }
        let event_id = ticket.key.event_id();

        let error = match outcome {
            Ok(()) => {
                tracing::info!("Confirmed {:?}", ticket.key);
                return MutationState::Confirmed;
            }
            Err(e) => e,
        };

        tracing::error!("Rolling back {:?}: {}", ticket.key, error);
        let Some(pos) = self.position(event_id) else {
            tracing::debug!("Event {} left the snapshot, discarding rollback", event_id);
            return MutationState::RolledBack;
        };

        // Only undo our own write; a fresher snapshot wins.
        if read(&self.events[pos]) == ticket.requested {
            self.events[pos] = write(&self.events[pos], ticket.previous);
        }
        let title = self.events[pos].title.clone();
        self.notices
            .push(Notice::error(format!("Couldn't update {} for \"{}\". Please try again.", what, title)));
        MutationState::RolledBack
    }

    pub async fn rsvp<A: BackendApi>(
        &mut self,
        engine: &SyncEngine<A>,
        event_id: &str,
        status: RsvpStatus,
    ) -> Result<MutationState, MutationError> {
        let ticket = self.begin_rsvp(event_id, status)?;
        let outcome = engine.set_rsvp(event_id, status).await;
        Ok(self.settle_rsvp(ticket, outcome))
    }

    pub async fn toggle_event_tag<A: BackendApi>(
        &mut self,
        engine: &SyncEngine<A>,
        event_id: &str,
        tag_id: &str,
    ) -> Result<MutationState, MutationError> {
        let ticket = self.begin_tag_toggle(event_id, tag_id)?;
        let outcome = engine
            .set_event_tags(event_id, &ticket.previous, &ticket.requested)
            .await;
        Ok(self.settle_tags(ticket, outcome))
    }

    /// Reloads events around the selected date and the active tags. A failed
    /// event fetch leaves the current snapshot untouched.
    pub async fn refresh<A: BackendApi>(&mut self, engine: &SyncEngine<A>) -> Result<(), SyncError> {
        self.sync_status = SyncStatus::Syncing;

        match engine.fetch_events_around(self.selected_date).await {
            Ok(events) => self.set_events(events),
            Err(e) => {
                tracing::error!("Failed to refresh events: {}", e);
                self.sync_status = SyncStatus::Error(e.to_string());
                self.notices.push(Notice::error("Couldn't load events."));
                return Err(e);
            }
        }

        self.tags = engine.fetch_tags_or_fallback(true).await;
        self.sync_status = SyncStatus::Synced;
        Ok(())
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

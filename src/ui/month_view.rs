use chrono::{Datelike, Days, Local, NaiveDate};

use crate::calendar::{CalendarDateIndex, Event, days};

pub const GRID_CELLS: usize = 42;

#[derive(Debug, Clone, PartialEq)]
pub struct CalendarCell<'a> {
    pub date: NaiveDate,
    pub is_selected: bool,
    pub is_today: bool,
    pub is_current_month: bool,
    pub events: Vec<&'a Event>,
}

impl<'a> CalendarCell<'a> {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            is_selected: false,
            is_today: false,
            is_current_month: true,
            events: Vec::new(),
        }
    }

    pub fn with_selected(mut self, selected: bool) -> Self {
        self.is_selected = selected;
        self
    }

    pub fn with_today(mut self, today: bool) -> Self {
        self.is_today = today;
        self
    }

    pub fn with_events(mut self, events: &[&'a Event]) -> Self {
        self.events = events.to_vec();
        self
    }

    pub fn with_current_month(mut self, current_month: bool) -> Self {
        self.is_current_month = current_month;
        self
    }

    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    /// Number of indicator dots to draw and how many events overflow them.
    pub fn dots(&self, max: usize) -> (usize, usize) {
        let shown = self.events.len().min(max);
        (shown, self.events.len() - shown)
    }
}

pub fn cells_for_month<'a>(
    month_anchor: NaiveDate,
    index: &CalendarDateIndex<'a>,
    selected_date: NaiveDate,
) -> [CalendarCell<'a>; GRID_CELLS] {
    cells_for_month_on(month_anchor, index, selected_date, Local::now().date_naive())
}

/// Six full weeks starting on the Sunday on or before the first of the
/// anchor's month, whatever the month's length.
pub fn cells_for_month_on<'a>(
    month_anchor: NaiveDate,
    index: &CalendarDateIndex<'a>,
    selected_date: NaiveDate,
    today: NaiveDate,
) -> [CalendarCell<'a>; GRID_CELLS] {
    let start = days::grid_start(month_anchor);

    std::array::from_fn(|offset| {
        let date = start.checked_add_days(Days::new(offset as u64)).unwrap_or(start);
        CalendarCell::new(date)
            .with_selected(date == selected_date)
            .with_today(date == today)
            .with_current_month(date.year() == month_anchor.year() && date.month() == month_anchor.month())
            .with_events(index.events_on(date))
    })
}

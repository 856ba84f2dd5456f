pub mod event;
pub mod tag;
pub mod days;
pub mod date_index;
pub mod filter;

pub use event::{Event, RsvpStatus};
pub use tag::Tag;
pub use date_index::{CalendarDateIndex, build_date_index, build_date_index_in};
pub use filter::{FilterState, RsvpFilter, ViewMode, apply_filters, apply_filters_in};

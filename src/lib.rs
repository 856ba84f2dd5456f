pub mod calendar;
pub mod ui;
pub mod sync;
pub mod storage;
pub mod app;

pub use calendar::{Event, RsvpStatus, Tag};
pub use app::{AppState, Notice, NoticeLevel, SyncStatus};

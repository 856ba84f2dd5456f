pub mod month_view;

pub use month_view::{CalendarCell, GRID_CELLS, cells_for_month, cells_for_month_on};

//! Day paging: calendar arithmetic, the pagination mediator and the read side
//! that drives it.

pub mod calendar;
pub mod cursor;
pub mod feed;
pub mod mediator;

pub use calendar::DayCalendar;
pub use feed::DayFeed;
pub use mediator::{MediatorResult, PaginationMediator};

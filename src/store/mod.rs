//! Local persistence: the transactional day store and the progress document.

mod days;
pub mod progress;

pub use days::{DayStore, StoreTransaction};
pub use progress::ProgressCache;

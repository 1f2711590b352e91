//! Read side over the stored days.
//!
//! The feed reads days from the store in ascending order and asks the
//! mediator for more whenever it runs out, the way a pager drives a remote
//! mediator. Every load is followed by an attempt to start the catch-up sweep;
//! the sweep handles are kept so the caller can let them finish before exit.

use color_eyre::{eyre::eyre, Report, Result};
use futures::stream::{self, Stream};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::calendar::DayCalendar;
use super::mediator::{MediatorResult, PaginationMediator};
use crate::config::TimeZoneSetting;
use crate::jokes::types::DayWithJoke;
use crate::jokes::JokeSource;
use crate::store::DayStore;

pub struct DayFeed<S> {
  store: Arc<DayStore>,
  mediator: Arc<PaginationMediator<S>>,
  calendar: DayCalendar,
  page_size: u32,
  background: Mutex<Vec<JoinHandle<()>>>,
}

impl<S: JokeSource + 'static> DayFeed<S> {
  pub fn new(
    store: Arc<DayStore>,
    mediator: Arc<PaginationMediator<S>>,
    calendar: DayCalendar,
    page_size: u32,
  ) -> Self {
    Self {
      store,
      mediator,
      calendar,
      page_size,
      background: Mutex::new(Vec::new()),
    }
  }

  pub fn page_size(&self) -> u32 {
    self.page_size
  }

  /// Load one page of days after the last stored day.
  pub async fn append(&self) -> Result<MediatorResult> {
    let last = self.last_offset()?;
    self.forward_from(last).await
  }

  /// Load one page of days before the first stored day.
  pub async fn prepend(&self) -> Result<MediatorResult> {
    let first = self.first_offset()?;
    let result = self.mediator.load_backward(first, self.page_size).await?;
    self.after_load();
    Ok(result)
  }

  /// The day for the current date in `zone`, loading it first if needed.
  pub async fn today(&self, zone: TimeZoneSetting) -> Result<Option<DayWithJoke>> {
    self.day_at(self.calendar.today_offset(zone)).await
  }

  /// The day at `offset`, loading towards it if it is not stored yet.
  ///
  /// An empty store starts its history at `offset`; otherwise the stored
  /// range is extended one page at a time so no dates are skipped. Returns
  /// `None` when the source has nothing more to give.
  pub async fn day_at(&self, offset: i64) -> Result<Option<DayWithJoke>> {
    let date = self.calendar.date_for_offset(offset)?;

    loop {
      if let Some(day) = self.store.day(&date)? {
        return Ok(Some(day));
      }

      let bounds = (self.first_offset()?, self.last_offset()?);
      let result = match bounds {
        (Some(first), _) if offset < first => self.prepend().await?,
        (_, Some(last)) if offset > last => self.append().await?,
        (None, _) | (_, None) => {
          info!(date = %date, "starting history");
          self.forward_from(Some(offset - 1).filter(|o| *o >= 0)).await?
        }
        _ => {
          debug!(date = %date, "date inside the stored range has no day");
          return Ok(None);
        }
      };

      if let MediatorResult::Error(e) = result {
        return Err(Report::new(e).wrap_err(format!("Could not load the joke for {date}")));
      }
      if (self.first_offset()?, self.last_offset()?) == bounds {
        warn!(date = %date, "no more days could be loaded");
        return Ok(None);
      }
    }
  }

  /// Pages of days in ascending date order, starting at `from` or at the first
  /// stored day.
  ///
  /// When the stored days run out a forward load is made, so the stream only
  /// ends when nothing more can be loaded or a load fails (the error is the
  /// last item).
  pub fn pages(&self, from: Option<String>) -> impl Stream<Item = Result<Vec<DayWithJoke>>> + '_ {
    stream::unfold(Some(from), move |cursor| async move {
      let from = cursor?;
      match self.next_page(from.as_deref()).await {
        Ok(page) if page.is_empty() => None,
        Ok(page) => {
          let next = page
            .last()
            .map(|last| self.date_after(&last.day.date))
            .transpose();
          match next {
            Ok(next) => Some((Ok(page), next.map(Some))),
            Err(e) => Some((Err(e), None)),
          }
        }
        Err(e) => Some((Err(e), None)),
      }
    })
  }

  /// Wait for any catch-up sweeps started by earlier loads.
  pub async fn wait_for_background(&self) {
    let handles = match self.background.lock() {
      Ok(mut handles) => std::mem::take(&mut *handles),
      Err(_) => return,
    };

    for handle in handles {
      if let Err(e) = handle.await {
        warn!("catch-up task did not finish: {}", e);
      }
    }
  }

  async fn next_page(&self, from: Option<&str>) -> Result<Vec<DayWithJoke>> {
    let page = self.read(from)?;
    if !page.is_empty() {
      return Ok(page);
    }

    match self.append().await? {
      MediatorResult::Error(e) => Err(Report::new(e).wrap_err("Could not load more days")),
      MediatorResult::Success { .. } => self.read(from),
    }
  }

  fn read(&self, from: Option<&str>) -> Result<Vec<DayWithJoke>> {
    let limit = self.page_size as usize;
    match from {
      Some(date) => self.store.days_from(date, limit),
      None => self.store.days_page(0, limit),
    }
  }

  async fn forward_from(&self, last: Option<i64>) -> Result<MediatorResult> {
    let result = self.mediator.load_forward(last, self.page_size).await?;
    self.after_load();
    Ok(result)
  }

  fn after_load(&self) {
    let Some(handle) = self.mediator.spawn_catch_up(self.page_size) else {
      return;
    };
    match self.background.lock() {
      Ok(mut handles) => handles.push(handle),
      Err(_) => warn!("could not track catch-up task"),
    }
  }

  fn date_after(&self, date: &str) -> Result<String> {
    let offset = self.calendar.offset_for_date(date)?;
    self
      .calendar
      .date_for_offset(offset + 1)
      .map_err(|e| eyre!("No date follows {}: {}", date, e))
  }

  fn first_offset(&self) -> Result<Option<i64>> {
    self.edge_offset(self.store.first_day()?.map(|day| day.date))
  }

  fn last_offset(&self) -> Result<Option<i64>> {
    self.edge_offset(self.store.last_day()?.map(|day| day.date))
  }

  fn edge_offset(&self, date: Option<String>) -> Result<Option<i64>> {
    date
      .map(|date| self.calendar.offset_for_date(&date))
      .transpose()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::jokes::fake::FakeJokeSource;
  use crate::jokes::SourceError;
  use crate::store::ProgressCache;
  use chrono::NaiveDate;
  use futures::StreamExt;
  use tracing::Span;

  fn feed(source: FakeJokeSource) -> DayFeed<FakeJokeSource> {
    let store = Arc::new(DayStore::open_in_memory().unwrap());
    let progress = Arc::new(ProgressCache::in_memory());
    let calendar = DayCalendar::new(NaiveDate::from_ymd_opt(2024, 11, 1).unwrap());
    let mediator = Arc::new(PaginationMediator::new(
      source,
      Arc::clone(&store),
      progress,
      calendar,
      Span::none(),
    ));
    DayFeed::new(store, mediator, calendar, 7)
  }

  fn dates(days: &[DayWithJoke]) -> Vec<&str> {
    days.iter().map(|d| d.day.date.as_str()).collect()
  }

  #[tokio::test]
  async fn test_day_at_on_empty_store_starts_history_there() {
    let feed = feed(FakeJokeSource::with_pages(5, 7));

    let day = feed.day_at(10).await.unwrap().unwrap();

    assert_eq!(day.day.date, "2024-11-11");
    assert_eq!(feed.first_offset().unwrap(), Some(10));
    assert_eq!(feed.store.count_days().unwrap(), 7);
  }

  #[tokio::test]
  async fn test_day_at_pages_forward_without_gaps() {
    let feed = feed(FakeJokeSource::with_pages(5, 7));
    feed.append().await.unwrap();

    let day = feed.day_at(15).await.unwrap().unwrap();

    assert_eq!(day.day.date, "2024-11-16");
    assert_eq!(feed.store.count_days().unwrap(), 21);
    assert_eq!(feed.first_offset().unwrap(), Some(0));
    assert_eq!(feed.last_offset().unwrap(), Some(20));
  }

  #[tokio::test]
  async fn test_day_at_before_first_day_prepends() {
    let feed = feed(FakeJokeSource::with_pages(5, 7));
    feed.day_at(10).await.unwrap();

    let day = feed.day_at(3).await.unwrap().unwrap();

    assert_eq!(day.day.date, "2024-11-04");
    assert_eq!(feed.first_offset().unwrap(), Some(0));
    assert_eq!(feed.store.count_days().unwrap(), 17);
  }

  #[tokio::test]
  async fn test_day_at_reports_source_failure() {
    let feed = feed(FakeJokeSource::with_pages(5, 7));
    feed_source(&feed).fail_next(SourceError::Transport("offline".into()));

    assert!(feed.day_at(0).await.is_err());
    assert_eq!(feed.store.count_days().unwrap(), 0);
  }

  #[tokio::test]
  async fn test_day_at_with_empty_source_gives_none() {
    let feed = feed(FakeJokeSource::default());

    assert!(feed.day_at(3).await.unwrap().is_none());
  }

  #[tokio::test]
  async fn test_pages_load_forward_when_store_runs_out() {
    let feed = feed(FakeJokeSource::with_pages(10, 7));

    let pages: Vec<_> = feed.pages(None).take(3).collect().await;

    let pages: Vec<Vec<DayWithJoke>> = pages.into_iter().map(|p| p.unwrap()).collect();
    assert_eq!(dates(&pages[0])[0], "2024-11-01");
    assert_eq!(dates(&pages[1])[0], "2024-11-08");
    assert_eq!(dates(&pages[2])[6], "2024-11-21");
    assert_eq!(feed.store.count_days().unwrap(), 21);
  }

  #[tokio::test]
  async fn test_pages_start_at_requested_date() {
    let feed = feed(FakeJokeSource::with_pages(10, 7));
    feed.append().await.unwrap();
    feed.append().await.unwrap();

    let mut pages = Box::pin(feed.pages(Some("2024-11-05".into())));
    let first = pages.next().await.unwrap().unwrap();
    let second = pages.next().await.unwrap().unwrap();

    assert_eq!(dates(&first)[0], "2024-11-05");
    assert_eq!(dates(&first)[6], "2024-11-11");
    assert_eq!(dates(&second), vec!["2024-11-12", "2024-11-13", "2024-11-14"]);
  }

  #[tokio::test]
  async fn test_pages_end_after_error() {
    let feed = feed(FakeJokeSource::with_pages(3, 7));
    feed_source(&feed).fail_next(SourceError::Protocol("status 503".into()));

    let items: Vec<_> = feed.pages(None).collect().await;

    assert_eq!(items.len(), 1);
    assert!(items[0].is_err());
  }

  #[tokio::test]
  async fn test_pages_end_when_source_is_empty() {
    let feed = feed(FakeJokeSource::default());

    let items: Vec<_> = feed.pages(None).collect().await;

    assert!(items.is_empty());
  }

  #[tokio::test]
  async fn test_loads_start_catch_up_once() {
    let feed = feed(FakeJokeSource::with_pages(3, 7));

    feed.append().await.unwrap();
    feed.wait_for_background().await;
    assert!(feed.mediator.catch_up_done());
    assert!(feed.store.page_by_id(2).unwrap().is_some());

    feed.append().await.unwrap();
    assert!(feed.background.lock().unwrap().is_empty());
  }

  fn feed_source(feed: &DayFeed<FakeJokeSource>) -> &FakeJokeSource {
    feed.mediator.source()
  }
}

//! Bridges the endless day sequence onto the finite set of remote pages.
//!
//! Loading forward walks logical pages past the end of the stored days;
//! loading backward walks them down towards offset 0. Logical pages beyond the
//! known remote total wrap around onto pages already seen, and jokes shown in
//! the most recent days are filtered out so a wrapped page does not repeat
//! them straight away.
//!
//! Each load fetches before it writes, and writes jokes, the page row and the
//! new days in a single store transaction, so a failed fetch leaves no trace.

use color_eyre::{Report, Result};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument, Span};

use super::calendar::DayCalendar;
use super::cursor;
use crate::jokes::api_types::ApiJoke;
use crate::jokes::types::{Day, Joke, JokePage};
use crate::jokes::{JokeSource, SourceError};
use crate::store::progress::{TOTAL_JOKES, TOTAL_PAGES};
use crate::store::{DayStore, ProgressCache, StoreTransaction};

/// How many pages of the most recent days a new page is deduplicated against.
const DEDUP_WINDOW_PAGES: usize = 4;

/// Outcome of a load that did not hit a fatal error.
#[derive(Debug)]
pub enum MediatorResult {
  Success { end_of_pagination_reached: bool },
  /// The remote source failed; nothing was written and the load can be retried.
  Error(SourceError),
}

#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadDirection {
  Append,
  Prepend,
}

/// Where a load in one direction currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
  Idle,
  Fetching,
  Committing,
  Failed,
}

/// Serialization point and state for one load direction.
struct Lane {
  lock: tokio::sync::Mutex<()>,
  state: std::sync::Mutex<LoadState>,
}

impl Lane {
  fn new() -> Self {
    Self {
      lock: tokio::sync::Mutex::new(()),
      state: std::sync::Mutex::new(LoadState::Idle),
    }
  }

  fn set(&self, next: LoadState) {
    let mut state = self.state_guard();
    let from = *state;
    debug!(?from, to = ?next, "load state");
    *state = next;
  }

  #[cfg(test)]
  fn get(&self) -> LoadState {
    *self.state_guard()
  }

  /// The state is a plain value, so a panic elsewhere cannot leave it torn.
  fn state_guard(&self) -> MutexGuard<'_, LoadState> {
    self.state.lock().unwrap_or_else(|poisoned| {
      warn!("load state lock poisoned, recovering");
      poisoned.into_inner()
    })
  }
}

enum LoadError {
  Source(SourceError),
  Fatal(Report),
}

impl From<SourceError> for LoadError {
  fn from(e: SourceError) -> Self {
    LoadError::Source(e)
  }
}

impl From<Report> for LoadError {
  fn from(e: Report) -> Self {
    LoadError::Fatal(e)
  }
}

pub struct PaginationMediator<S> {
  source: S,
  store: Arc<DayStore>,
  progress: Arc<ProgressCache>,
  calendar: DayCalendar,
  /// Parent span for everything the mediator logs
  span: Span,
  append: Lane,
  prepend: Lane,
  catch_up_done: AtomicBool,
  catch_up_running: AtomicBool,
}

impl<S: JokeSource> PaginationMediator<S> {
  pub fn new(
    source: S,
    store: Arc<DayStore>,
    progress: Arc<ProgressCache>,
    calendar: DayCalendar,
    span: Span,
  ) -> Self {
    Self {
      source,
      store,
      progress,
      calendar,
      span,
      append: Lane::new(),
      prepend: Lane::new(),
      catch_up_done: AtomicBool::new(false),
      catch_up_running: AtomicBool::new(false),
    }
  }

  #[cfg(test)]
  pub fn state(&self, direction: LoadDirection) -> LoadState {
    match direction {
      LoadDirection::Append => self.append.get(),
      LoadDirection::Prepend => self.prepend.get(),
    }
  }

  /// Append days after `last_known_offset` (or from offset 0 on an empty store).
  ///
  /// The day sequence never ends going forward, so success always reports
  /// more data.
  pub async fn load_forward(
    &self,
    last_known_offset: Option<i64>,
    page_size: u32,
  ) -> Result<MediatorResult> {
    let _guard = self.append.lock.lock().await;
    let next = last_known_offset.map_or(0, |offset| offset + 1);
    let span = info_span!(parent: &self.span, "load_forward", next_offset = next);

    let outcome = self
      .append_from(next, page_size)
      .instrument(span.clone())
      .await
      .map(|()| false);
    span.in_scope(|| self.finish(&self.append, outcome))
  }

  /// Prepend days before `first_known_offset`.
  ///
  /// Reports the end of pagination without fetching when there is nothing
  /// before it, and after the days down to offset 0 have been written.
  pub async fn load_backward(
    &self,
    first_known_offset: Option<i64>,
    page_size: u32,
  ) -> Result<MediatorResult> {
    let Some(first) = first_known_offset else {
      return Ok(MediatorResult::Success {
        end_of_pagination_reached: true,
      });
    };

    let previous = first - 1;
    if previous < 0 {
      return Ok(MediatorResult::Success {
        end_of_pagination_reached: true,
      });
    }

    let _guard = self.prepend.lock.lock().await;
    let span = info_span!(parent: &self.span, "load_backward", previous_offset = previous);

    let outcome = self
      .prepend_before(previous, page_size)
      .instrument(span.clone())
      .await;
    span.in_scope(|| self.finish(&self.prepend, outcome))
  }

  #[cfg(test)]
  pub(crate) fn source(&self) -> &S {
    &self.source
  }

  /// Fetch one random joke. Nothing is stored.
  pub async fn random_joke(&self) -> Result<ApiJoke, SourceError> {
    self.source.random().await
  }

  fn finish(&self, lane: &Lane, outcome: Result<bool, LoadError>) -> Result<MediatorResult> {
    match outcome {
      Ok(end_of_pagination_reached) => {
        lane.set(LoadState::Idle);
        Ok(MediatorResult::Success {
          end_of_pagination_reached,
        })
      }
      Err(LoadError::Source(e)) => {
        lane.set(LoadState::Failed);
        warn!("load failed, nothing written: {}", e);
        lane.set(LoadState::Idle);
        Ok(MediatorResult::Error(e))
      }
      Err(LoadError::Fatal(report)) => {
        lane.set(LoadState::Idle);
        Err(report)
      }
    }
  }

  async fn append_from(&self, next: i64, page_size: u32) -> Result<(), LoadError> {
    let limit = page_size as usize;
    let recent = self.recent_joke_ids(page_size)?;
    let first_logical = cursor::page_after(next, page_size)?;

    // Nothing is written until every fetch of this load has succeeded
    let mut fetched: Vec<(u32, Vec<Joke>)> = Vec::new();
    let mut days = Vec::new();
    let mut step = 0;
    // Every remote page gets one chance before repeats are accepted
    while step < self.total_pages().max(1) {
      let logical = first_logical + step;
      step += 1;

      let remote = cursor::resolve_remote_page(logical, self.total_pages())?;
      self.append.set(LoadState::Fetching);
      let jokes = self.fetch_page(remote, page_size).await?;

      let survivors: Vec<&Joke> = jokes
        .iter()
        .filter(|joke| !recent.contains(&joke.id))
        .take(limit)
        .collect();

      if !survivors.is_empty() {
        days = self.days_from_offset(next, &survivors)?;
        fetched.push((remote, jokes));
        break;
      }

      if jokes.is_empty() {
        debug!(logical, remote, "remote page is empty");
        continue;
      }

      debug!(logical, remote, "every joke on the page was shown recently");
      fetched.push((remote, jokes));
    }

    if days.is_empty() {
      match fetched.last() {
        Some((remote, jokes)) => {
          warn!(
            remote,
            "all known jokes were shown in the last {} days, repeating page",
            DEDUP_WINDOW_PAGES * limit
          );
          let repeats: Vec<&Joke> = jokes.iter().take(limit).collect();
          days = self.days_from_offset(next, &repeats)?;
        }
        None => {
          info!("remote source has no jokes to append");
          return Ok(());
        }
      }
    }

    self.commit(&self.append, &fetched, &days)?;
    Ok(())
  }

  async fn prepend_before(&self, previous: i64, page_size: u32) -> Result<bool, LoadError> {
    let limit = page_size as usize;
    let mut logical = cursor::page_containing(previous, page_size)?;
    let mut slots = (previous - cursor::page_start(logical, page_size) + 1) as usize;

    // Also keep away from the days right after the gap being filled
    let mut excluded = self.recent_joke_ids(page_size)?;
    let following = self.calendar.date_for_offset(previous + 1)?;
    excluded.extend(
      self
        .store
        .days_from(&following, DEDUP_WINDOW_PAGES * limit)?
        .into_iter()
        .map(|d| d.joke.id),
    );

    let mut fetched: Vec<(u32, Vec<Joke>)> = Vec::new();
    let mut placed: Option<(u32, Vec<Day>)> = None;
    let mut fallback_slots = slots;
    let mut step = 0;
    loop {
      step += 1;
      let remote = cursor::resolve_remote_page(logical, self.total_pages())?;
      self.prepend.set(LoadState::Fetching);
      let jokes = self.fetch_page(remote, page_size).await?;

      let survivors: Vec<&Joke> = jokes
        .iter()
        .filter(|joke| !excluded.contains(&joke.id))
        .take(slots)
        .collect();

      if !survivors.is_empty() {
        let start = previous - survivors.len() as i64 + 1;
        let days = self.days_from_offset(start, &survivors)?;
        fetched.push((remote, jokes));
        placed = Some((remote, days));
        break;
      }

      if !jokes.is_empty() {
        debug!(logical, remote, "every joke on the page was shown nearby");
        fetched.push((remote, jokes));
        fallback_slots = slots;
      }

      if logical == 1 || step >= self.total_pages().max(1) {
        break;
      }
      logical -= 1;
      slots = limit;
    }

    let (remote, days) = match placed {
      Some(placed) => placed,
      None => match fetched.last() {
        Some((remote, jokes)) => {
          warn!(remote, "no unseen jokes to prepend, repeating page");
          let repeats: Vec<&Joke> = jokes.iter().take(fallback_slots).collect();
          let start = previous - repeats.len() as i64 + 1;
          (*remote, self.days_from_offset(start, &repeats)?)
        }
        None => {
          info!("remote source has no jokes to prepend");
          return Ok(true);
        }
      },
    };

    self.commit(&self.prepend, &fetched, &days)?;
    // The first remote page has nothing before it
    Ok(remote == 1)
  }

  /// Run the catch-up sweep on a background task.
  ///
  /// Returns `None` when a sweep already succeeded in this process or is
  /// still running.
  pub fn spawn_catch_up(self: &Arc<Self>, page_size: u32) -> Option<JoinHandle<()>>
  where
    S: 'static,
  {
    if self.catch_up_done.load(Ordering::Acquire) {
      return None;
    }
    if self.catch_up_running.swap(true, Ordering::AcqRel) {
      return None;
    }

    let mediator = Arc::clone(self);
    Some(tokio::spawn(async move {
      mediator.catch_up(page_size).await;
      mediator.catch_up_running.store(false, Ordering::Release);
    }))
  }

  /// Refresh the newest stored page, or fetch the one after it when it is
  /// full, so jokes added upstream make it into the reuse cycle.
  ///
  /// Failures are logged and swallowed; the sweep is retried on the next call
  /// until one succeeds.
  pub async fn catch_up(&self, page_size: u32) {
    let span = info_span!(parent: &self.span, "catch_up");
    async {
      match self.sync_last_page(page_size).await {
        Ok(true) => self.catch_up_done.store(true, Ordering::Release),
        Ok(false) => debug!("no pages stored yet"),
        Err(LoadError::Source(e)) => warn!("catch-up sweep failed: {}", e),
        Err(LoadError::Fatal(report)) => warn!("catch-up sweep failed: {:?}", report),
      }
    }
    .instrument(span)
    .await
  }

  #[cfg(test)]
  pub fn catch_up_done(&self) -> bool {
    self.catch_up_done.load(Ordering::Acquire)
  }

  async fn sync_last_page(&self, page_size: u32) -> Result<bool, LoadError> {
    let Some(last) = self.store.last_page()? else {
      return Ok(false);
    };

    let page = if last.jokes.len() != page_size as usize {
      last.page.id
    } else {
      last.page.id + 1
    };

    let jokes = self.fetch_page(page, page_size).await?;
    if jokes.is_empty() {
      debug!(page, "no new jokes upstream");
      return Ok(true);
    }

    self.store.transaction(|tx| {
      tx.upsert_jokes(&jokes)?;
      tx.insert_pages_if_absent(&[JokePage { id: page }])
    })?;
    info!(page, jokes = jokes.len(), "caught up with remote page");

    Ok(true)
  }

  async fn fetch_page(&self, page: u32, limit: u32) -> Result<Vec<Joke>, LoadError> {
    let response = self.source.search(page, limit).await?;

    // Third-party API: note inconsistencies but keep going with what arrived
    if response.current_page != page {
      warn!(
        "response current_page {} does not match requested {}",
        response.current_page, page
      );
    }
    if response.results.len() > limit as usize {
      warn!(
        "response has {} jokes, more than the requested {}",
        response.results.len(),
        limit
      );
    }

    self.raise_watermark(TOTAL_PAGES, response.total_pages);
    self.raise_watermark(TOTAL_JOKES, response.total_jokes);

    Ok(
      response
        .results
        .into_iter()
        .map(|joke| joke.into_joke(page))
        .collect(),
    )
  }

  fn raise_watermark(&self, key: &str, reported: u32) {
    let reported = i64::from(reported);
    if self.progress.get(key) < reported {
      info!(key, reported, "storing new watermark");
      if let Err(e) = self.progress.set(key, reported) {
        warn!(key, "failed to persist watermark: {}", e);
      }
    }
  }

  fn total_pages(&self) -> u32 {
    u32::try_from(self.progress.get(TOTAL_PAGES)).unwrap_or(0)
  }

  fn recent_joke_ids(&self, page_size: u32) -> Result<HashSet<String>> {
    let window = DEDUP_WINDOW_PAGES * page_size as usize;
    Ok(
      self
        .store
        .most_recent_days(window)?
        .into_iter()
        .map(|d| d.joke.id)
        .collect(),
    )
  }

  fn days_from_offset(&self, start: i64, jokes: &[&Joke]) -> Result<Vec<Day>> {
    jokes
      .iter()
      .enumerate()
      .map(|(index, joke)| {
        let date = self.calendar.date_for_offset(start + index as i64)?;
        Ok(Day::new(date, joke.id.clone()))
      })
      .collect()
  }

  fn commit(&self, lane: &Lane, pages: &[(u32, Vec<Joke>)], days: &[Day]) -> Result<usize> {
    lane.set(LoadState::Committing);
    let inserted = self
      .store
      .transaction(|tx| write_pages(tx, pages, days))?;

    if inserted < days.len() {
      debug!(
        skipped = days.len() - inserted,
        "some dates were already taken"
      );
    }
    let remotes: Vec<u32> = pages.iter().map(|(remote, _)| *remote).collect();
    info!(?remotes, days = inserted, "committed pages");
    Ok(inserted)
  }
}

/// Jokes and page rows go in before the days that reference them.
fn write_pages(
  tx: &StoreTransaction<'_>,
  pages: &[(u32, Vec<Joke>)],
  days: &[Day],
) -> Result<usize> {
  for (remote, jokes) in pages {
    tx.upsert_jokes(jokes)?;
    tx.insert_pages_if_absent(&[JokePage { id: *remote }])?;
  }
  tx.insert_days_if_absent(days)
}

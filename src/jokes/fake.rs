//! Scripted joke source for tests.
//!
//! Pages are seeded up front and can be replaced between calls to simulate
//! upstream changes. Requests are recorded and individual calls can be made
//! to fail.

use super::api_types::{ApiJoke, ApiJokePage};
use super::{JokeSource, SourceError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct FakeJokeSource {
  pages: Mutex<BTreeMap<u32, Vec<String>>>,
  requests: Mutex<Vec<u32>>,
  failures: Mutex<BTreeMap<usize, SourceError>>,
  sloppy: AtomicBool,
}

impl FakeJokeSource {
  /// `pages` pages of `per_page` jokes with ids like "p2-5".
  pub fn with_pages(pages: u32, per_page: usize) -> Self {
    let source = Self::default();
    for page in 1..=pages {
      let ids = (0..per_page).map(|i| format!("p{page}-{i}")).collect();
      source.set_page(page, ids);
    }
    source
  }

  pub fn set_page(&self, page: u32, ids: Vec<String>) {
    self.pages.lock().unwrap().insert(page, ids);
  }

  /// Remote page numbers requested so far, in order.
  pub fn requests(&self) -> Vec<u32> {
    self.requests.lock().unwrap().clone()
  }

  /// Fail the next `search` call with `error`.
  pub fn fail_next(&self, error: SourceError) {
    let call = self.requests.lock().unwrap().len() + 1;
    self.fail_call(call, error);
  }

  /// Fail the `call`th `search` call (counting from 1 over the fake's life).
  pub fn fail_call(&self, call: usize, error: SourceError) {
    self.failures.lock().unwrap().insert(call, error);
  }

  /// Ignore the requested limit and echo a wrong page number.
  pub fn set_sloppy(&self, sloppy: bool) {
    self.sloppy.store(sloppy, Ordering::Relaxed);
  }
}

#[async_trait]
impl JokeSource for FakeJokeSource {
  async fn search(&self, page: u32, limit: u32) -> Result<ApiJokePage, SourceError> {
    let call = {
      let mut requests = self.requests.lock().unwrap();
      requests.push(page);
      requests.len()
    };
    if let Some(error) = self.failures.lock().unwrap().remove(&call) {
      return Err(error);
    }

    let sloppy = self.sloppy.load(Ordering::Relaxed);
    let take = if sloppy { usize::MAX } else { limit as usize };
    let pages = self.pages.lock().unwrap();
    let results = pages
      .get(&page)
      .cloned()
      .unwrap_or_default()
      .into_iter()
      .take(take)
      .map(|id| ApiJoke {
        joke: format!("text of {id}"),
        id,
      })
      .collect();

    Ok(ApiJokePage {
      current_page: if sloppy { page + 100 } else { page },
      results,
      total_jokes: pages.values().map(|ids| ids.len() as u32).sum(),
      total_pages: pages.len() as u32,
    })
  }

  async fn random(&self) -> Result<ApiJoke, SourceError> {
    Ok(ApiJoke {
      id: "random".into(),
      joke: "random joke".into(),
    })
  }
}

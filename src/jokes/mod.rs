//! Remote joke source.
//!
//! The mediator only talks to the [`JokeSource`] trait; [`JokeClient`] is the
//! reqwest implementation against icanhazdadjoke.com.

pub mod api_types;
pub mod client;
#[cfg(test)]
pub mod fake;
pub mod types;

pub use client::JokeClient;

use api_types::{ApiJoke, ApiJokePage};
use async_trait::async_trait;
use thiserror::Error;

/// Failures talking to the remote source. Both kinds are retryable.
#[derive(Debug, Error)]
pub enum SourceError {
  /// The request never produced a response (no connectivity, timeout, reset).
  #[error("transport failure: {0}")]
  Transport(String),

  /// A response arrived but had a non-success status or an unexpected shape.
  #[error("protocol failure: {0}")]
  Protocol(String),
}

#[async_trait]
pub trait JokeSource: Send + Sync {
  /// Fetch one page of jokes. Pages are numbered from 1.
  async fn search(&self, page: u32, limit: u32) -> Result<ApiJokePage, SourceError>;

  /// Fetch a single random joke.
  async fn random(&self) -> Result<ApiJoke, SourceError>;
}

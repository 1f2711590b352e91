//! Wire types for the icanhazdadjoke.com API.

use serde::Deserialize;

use super::types::Joke;

/// A single joke as returned by `GET /` and inside search results.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiJoke {
  pub id: String,
  pub joke: String,
}

impl ApiJoke {
  pub fn into_joke(self, page: u32) -> Joke {
    Joke {
      id: self.id,
      text: self.joke,
      page,
    }
  }
}

/// Response of `GET /search?page=&limit=`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiJokePage {
  pub current_page: u32,
  pub results: Vec<ApiJoke>,
  pub total_jokes: u32,
  pub total_pages: u32,
}

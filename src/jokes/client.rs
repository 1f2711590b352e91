use crate::config::ApiConfig;
use crate::jokes::api_types::{ApiJoke, ApiJokePage};
use crate::jokes::{JokeSource, SourceError};
use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

/// icanhazdadjoke.com REST client
#[derive(Clone)]
pub struct JokeClient {
  http: reqwest::Client,
  base: Url,
}

impl JokeClient {
  pub fn new(config: &ApiConfig) -> Result<Self> {
    let mut base = Url::parse(&config.base_url)
      .map_err(|e| eyre!("Invalid API base URL {}: {}", config.base_url, e))?;

    // Url::join replaces the last path segment unless the path ends in '/'
    if !base.path().ends_with('/') {
      let path = format!("{}/", base.path());
      base.set_path(&path);
    }

    let user_agent = config
      .user_agent
      .clone()
      .unwrap_or_else(|| Self::default_user_agent().to_string());

    let http = reqwest::Client::builder()
      .user_agent(user_agent)
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { http, base })
  }

  /// Identifies this app and where its source lives, as the API asks clients to.
  pub fn default_user_agent() -> &'static str {
    concat!(
      env!("CARGO_PKG_NAME"),
      "/",
      env!("CARGO_PKG_VERSION"),
      " (",
      env!("CARGO_PKG_REPOSITORY"),
      ")"
    )
  }

  fn search_url(&self, page: u32, limit: u32) -> Result<Url, SourceError> {
    let mut url = self
      .base
      .join("search")
      .map_err(|e| SourceError::Protocol(format!("invalid search URL: {}", e)))?;
    url
      .query_pairs_mut()
      .append_pair("page", &page.to_string())
      .append_pair("limit", &limit.to_string());
    Ok(url)
  }

  async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, SourceError> {
    let response = self
      .http
      .get(url.clone())
      .header(ACCEPT, "application/json")
      .send()
      .await
      .map_err(|e| SourceError::Transport(format!("GET {}: {}", url, e)))?;

    let status = response.status();
    if !status.is_success() {
      return Err(SourceError::Protocol(format!(
        "GET {} returned {}",
        url, status
      )));
    }

    let body = response
      .bytes()
      .await
      .map_err(|e| SourceError::Transport(format!("GET {}: {}", url, e)))?;

    serde_json::from_slice(&body)
      .map_err(|e| SourceError::Protocol(format!("malformed response from {}: {}", url, e)))
  }
}

#[async_trait]
impl JokeSource for JokeClient {
  async fn search(&self, page: u32, limit: u32) -> Result<ApiJokePage, SourceError> {
    let url = self.search_url(page, limit)?;
    self.get_json(url).await
  }

  async fn random(&self) -> Result<ApiJoke, SourceError> {
    self.get_json(self.base.clone()).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use httpmock::MockServer;

  fn client(base_url: &str) -> JokeClient {
    JokeClient::new(&ApiConfig {
      base_url: base_url.to_string(),
      timeout_secs: 5,
      user_agent: None,
    })
    .unwrap()
  }

  #[tokio::test]
  async fn test_search_sends_paging_and_headers() {
    let server = MockServer::start_async().await;
    let mock = server
      .mock_async(|when, then| {
        when
          .method("GET")
          .path("/search")
          .query_param("page", "2")
          .query_param("limit", "7")
          .header("accept", "application/json")
          .header("user-agent", JokeClient::default_user_agent());
        then.status(200).header("content-type", "application/json").body(
          r#"{"current_page":2,"results":[{"id":"j1","joke":"Hi"}],"total_jokes":8,"total_pages":2}"#,
        );
      })
      .await;

    let page = client(&server.base_url()).search(2, 7).await.unwrap();
    mock.assert_async().await;
    assert_eq!(page.current_page, 2);
    assert_eq!(page.results[0].id, "j1");
    assert_eq!(page.total_pages, 2);
  }

  #[tokio::test]
  async fn test_random_hits_root() {
    let server = MockServer::start_async().await;
    let mock = server
      .mock_async(|when, then| {
        when.method("GET").path("/");
        then
          .status(200)
          .header("content-type", "application/json")
          .body(r#"{"id":"r1","joke":"Random","status":200}"#);
      })
      .await;

    let joke = client(&server.base_url()).random().await.unwrap();
    mock.assert_async().await;
    assert_eq!(joke.id, "r1");
    assert_eq!(joke.joke, "Random");
  }

  #[tokio::test]
  async fn test_non_success_status_is_protocol_failure() {
    let server = MockServer::start_async().await;
    server
      .mock_async(|when, then| {
        when.method("GET").path("/search");
        then.status(503).body("unavailable");
      })
      .await;

    let err = client(&server.base_url()).search(1, 7).await.unwrap_err();
    assert!(matches!(err, SourceError::Protocol(_)));
  }

  #[tokio::test]
  async fn test_malformed_body_is_protocol_failure() {
    let server = MockServer::start_async().await;
    server
      .mock_async(|when, then| {
        when.method("GET").path("/search");
        then.status(200).body(r#"{"current_page":1}"#);
      })
      .await;

    let err = client(&server.base_url()).search(1, 7).await.unwrap_err();
    assert!(matches!(err, SourceError::Protocol(_)));
  }

  #[tokio::test]
  async fn test_unreachable_host_is_transport_failure() {
    // Nothing listens on port 1
    let err = client("http://127.0.0.1:1").search(1, 7).await.unwrap_err();
    assert!(matches!(err, SourceError::Transport(_)));
  }

  #[test]
  fn test_base_path_is_kept() {
    let client = client("https://example.com/api");
    let url = client.search_url(3, 7).unwrap();
    assert_eq!(url.as_str(), "https://example.com/api/search?page=3&limit=7");
  }

  #[test]
  fn test_invalid_base_url_is_rejected() {
    let result = JokeClient::new(&ApiConfig {
      base_url: "not a url".to_string(),
      timeout_secs: 5,
      user_agent: None,
    });
    assert!(result.is_err());
  }
}

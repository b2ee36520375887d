//! Strategy handlers for intercepted GET requests.

use color_eyre::Result;
use reqwest::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use super::classify::{classify, Strategy};
use crate::cache::{CacheStorage, CacheStore};
use crate::net::{Fetcher, Request, Response, ResponseSource};
use crate::offline::{Language, OfflineSynthesizer};

/// Marks responses generated by the worker rather than the server.
pub const SERVED_BY_HEADER: &str = "x-served-by";
const SERVED_BY_OFFLINE: &str = "ServiceWorker-Offline";

const CHAT_OFFLINE_BODY: &str =
  r#"{"message":"Offline mode. Please check your connection.","offline":true}"#;
const API_OFFLINE_BODY: &str = r#"{"error":"Service unavailable offline","offline":true}"#;

/// Routes each intercepted request through its caching strategy.
///
/// Handlers never fail: network errors, bad statuses and cache errors all end
/// in a cached or locally generated response.
pub struct FetchRouter<S: CacheStorage, F: Fetcher> {
  cache: CacheStore<S>,
  fetcher: F,
  synthesizer: OfflineSynthesizer,
  offline_page: Url,
}

impl<S: CacheStorage, F: Fetcher> FetchRouter<S, F> {
  pub fn new(
    cache: CacheStore<S>,
    fetcher: F,
    synthesizer: OfflineSynthesizer,
    offline_page: Url,
  ) -> Self {
    Self {
      cache,
      fetcher,
      synthesizer,
      offline_page,
    }
  }

  pub fn cache(&self) -> &CacheStore<S> {
    &self.cache
  }

  pub fn fetcher(&self) -> &F {
    &self.fetcher
  }

  /// Handle a request, or return `None` to let it pass through untouched.
  pub async fn handle(&self, request: &Request) -> Option<Response> {
    let strategy = classify(request)?;
    debug!(url = %request.url, ?strategy, "Intercepted request");

    let response = match strategy {
      Strategy::AiChat => self.handle_chat(request).await,
      Strategy::Api => self.handle_api(request).await,
      Strategy::StaticAsset => self.handle_static(request).await,
    };
    Some(response)
  }

  /// Network first; a synthesized reply when the chat backend is unreachable.
  async fn handle_chat(&self, request: &Request) -> Response {
    if let Some(response) = self.fetch_and_cache(request).await {
      return response;
    }

    match self.synthesize_reply(request) {
      Ok(response) => response,
      Err(e) => {
        warn!(error = %e, "Offline chat synthesis failed");
        offline_json(CHAT_OFFLINE_BODY)
      }
    }
  }

  /// Network first; the last cached copy, then a 503, when offline.
  async fn handle_api(&self, request: &Request) -> Response {
    if let Some(response) = self.fetch_and_cache(request).await {
      return response;
    }

    if let Some(cached) = self.lookup(request, None) {
      debug!(url = %request.url, "Serving cached API response");
      return cached;
    }

    offline_json(API_OFFLINE_BODY)
  }

  /// Cache first; network second; the offline page for navigations.
  async fn handle_static(&self, request: &Request) -> Response {
    if let Some(cached) = self.lookup(request, None) {
      return cached;
    }

    if let Some(response) = self.fetch_and_cache(request).await {
      return response;
    }

    if request.is_navigation() {
      let page = Request::get(self.offline_page.clone());
      if let Some(page) = self.lookup(&page, Some(self.cache.static_namespace())) {
        debug!(url = %request.url, "Serving offline page");
        return page;
      }
      warn!(page = %self.offline_page, "Offline page is not precached");
    }

    Response::text(StatusCode::SERVICE_UNAVAILABLE, "Offline")
  }

  /// Fetch from the network and keep a copy of any 2xx response.
  async fn fetch_and_cache(&self, request: &Request) -> Option<Response> {
    match self.fetcher.fetch(request).await {
      Ok(response) if response.is_success() => {
        // No await between here and return: once the response has arrived the
        // write runs to completion even if the caller abandons the event.
        if let Err(e) = self
          .cache
          .put(self.cache.dynamic_namespace(), request, &response)
        {
          warn!(url = %request.url, error = %e, "Failed to cache response");
        }
        Some(response)
      }
      Ok(response) => {
        debug!(url = %request.url, status = %response.status, "Upstream returned an error status");
        None
      }
      Err(e) => {
        debug!(url = %request.url, error = %e, "Network unavailable");
        None
      }
    }
  }

  fn lookup(&self, request: &Request, namespace: Option<&str>) -> Option<Response> {
    match self.cache.match_request(request, namespace) {
      Ok(found) => found,
      Err(e) => {
        warn!(url = %request.url, error = %e, "Cache lookup failed");
        None
      }
    }
  }

  /// Build the offline chat reply from `{message?, language?}`.
  ///
  /// Anything that is not valid JSON, or fields of the wrong type, read as
  /// the defaults. Only an unreadable body is an error.
  fn synthesize_reply(&self, request: &Request) -> Result<Response> {
    let body = request.body.read()?;
    let data: Value = serde_json::from_slice(body).unwrap_or(Value::Null);

    let message = data.get("message").and_then(Value::as_str).unwrap_or_default();
    let language = Language::from_code(
      data
        .get("language")
        .and_then(Value::as_str)
        .unwrap_or_default(),
    );

    let reply = self.synthesizer.synthesize(message, language);
    debug!(%language, "Serving synthesized offline reply");

    Ok(
      Response::json(StatusCode::OK, &reply)?.with_header(
        HeaderName::from_static(SERVED_BY_HEADER),
        HeaderValue::from_static(SERVED_BY_OFFLINE),
      ),
    )
  }
}

fn offline_json(body: &'static str) -> Response {
  Response::new(StatusCode::SERVICE_UNAVAILABLE, body)
    .with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
    .with_source(ResponseSource::Offline)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheNames, SqliteStorage};
  use crate::net::RequestBody;
  use crate::offline::{OfflineReply, KNOWLEDGE_BASE};
  use crate::testing::MockFetcher;

  const ORIGIN: &str = "http://localhost:3000";

  fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
  }

  fn router(fetcher: MockFetcher) -> FetchRouter<SqliteStorage, MockFetcher> {
    let cache = CacheStore::new(
      SqliteStorage::open_in_memory().unwrap(),
      CacheNames::new("medaid", "v1"),
    );
    cache.open_live_namespaces().unwrap();
    FetchRouter::new(cache, fetcher, OfflineSynthesizer::default(), url("/offline.html"))
  }

  #[tokio::test]
  async fn test_chat_online_response_is_cached_and_unmodified() {
    let fetcher = MockFetcher::new();
    fetcher.respond(&format!("{}/api/ai/chat", ORIGIN), StatusCode::OK, r#"{"message":"live"}"#);
    let router = router(fetcher);
    let request = Request::get(url("/api/ai/chat"));

    let response = router.handle(&request).await.unwrap();

    assert_eq!(response.source, ResponseSource::Network);
    assert_eq!(response.body, br#"{"message":"live"}"#);
    let cached = router
      .cache()
      .match_request(&request, Some("medaid-dynamic-v1"))
      .unwrap()
      .unwrap();
    assert_eq!(cached.body, response.body);
  }

  #[tokio::test]
  async fn test_chat_offline_hindi_fever() {
    let router = router(MockFetcher::offline());
    let request =
      Request::get(url("/api/ai/chat")).with_body(r#"{ "message": "fever", "language": "hi" }"#);

    let response = router.handle(&request).await.unwrap();

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header(SERVED_BY_HEADER), Some("ServiceWorker-Offline"));
    assert_eq!(response.header("content-type"), Some("application/json"));
    let reply: OfflineReply = response.json_body().unwrap();
    assert_eq!(reply.message, KNOWLEDGE_BASE[0].reply(Language::Hi).unwrap());
    assert!(reply.offline);
    assert!(chrono::DateTime::parse_from_rfc3339(&reply.timestamp).is_ok());
  }

  #[tokio::test]
  async fn test_chat_error_status_falls_back_and_is_not_cached() {
    let fetcher = MockFetcher::new();
    fetcher.respond(&format!("{}/api/ai/chat", ORIGIN), StatusCode::BAD_GATEWAY, "upstream down");
    let router = router(fetcher);
    let request = Request::get(url("/api/ai/chat")).with_body(r#"{"message":"headache"}"#);

    let response = router.handle(&request).await.unwrap();

    let reply: OfflineReply = response.json_body().unwrap();
    assert_eq!(reply.message, KNOWLEDGE_BASE[1].reply(Language::En).unwrap());
    assert!(router.cache().match_request(&request, None).unwrap().is_none());
  }

  #[tokio::test]
  async fn test_chat_malformed_body_uses_defaults() {
    let router = router(MockFetcher::offline());
    let request = Request::get(url("/api/ai/chat")).with_body("{not json");

    let response = router.handle(&request).await.unwrap();

    assert_eq!(response.status, StatusCode::OK);
    let reply: OfflineReply = response.json_body().unwrap();
    assert!(reply.message.contains("currently offline"));
    assert_eq!(reply.disclaimer, "⚠️ This is general information only. Consult a doctor.");
  }

  #[tokio::test]
  async fn test_chat_unreadable_body_returns_503_notice() {
    let router = router(MockFetcher::offline());
    let mut request = Request::get(url("/api/ai/chat"));
    request.body = RequestBody::Failed("client went away".to_string());

    let response = router.handle(&request).await.unwrap();

    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json_body().unwrap();
    assert_eq!(body["offline"], Value::Bool(true));
    assert_eq!(body["message"], "Offline mode. Please check your connection.");
  }

  #[tokio::test]
  async fn test_api_serves_stale_copy_then_503() {
    let fetcher = MockFetcher::new();
    let records = format!("{}/api/records", ORIGIN);
    fetcher.respond(&records, StatusCode::OK, "[1,2]");
    let router = router(fetcher);
    let request = Request::get(url("/api/records"));

    let online = router.handle(&request).await.unwrap();
    assert_eq!(online.source, ResponseSource::Network);

    router.fetcher().set_offline(true);
    let stale = router.handle(&request).await.unwrap();
    assert_eq!(stale.source, ResponseSource::Cache);
    assert_eq!(stale.body, b"[1,2]");

    let missing = router.handle(&Request::get(url("/api/reminders"))).await.unwrap();
    assert_eq!(missing.status, StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = missing.json_body().unwrap();
    assert_eq!(body["error"], "Service unavailable offline");
    assert_eq!(body["offline"], Value::Bool(true));
  }

  #[tokio::test]
  async fn test_static_cache_hit_skips_network() {
    let fetcher = MockFetcher::new();
    let router = router(fetcher);
    let request = Request::get(url("/static/css/main.css"));
    router
      .cache()
      .put("medaid-static-v1", &request, &Response::new(StatusCode::OK, "body{}"))
      .unwrap();

    let response = router.handle(&request).await.unwrap();

    assert_eq!(response.body, b"body{}");
    assert_eq!(router.fetcher().calls(), 0);
  }

  #[tokio::test]
  async fn test_static_miss_fetches_and_caches() {
    let fetcher = MockFetcher::new();
    fetcher.respond(&format!("{}/icons/check.png", ORIGIN), StatusCode::OK, "png");
    let router = router(fetcher);
    let request = Request::get(url("/icons/check.png"));

    router.handle(&request).await.unwrap();
    let again = router.handle(&request).await.unwrap();

    assert_eq!(again.source, ResponseSource::Cache);
    assert_eq!(router.fetcher().calls(), 1);
  }

  #[tokio::test]
  async fn test_navigation_offline_gets_fallback_page() {
    let router = router(MockFetcher::offline());
    router
      .cache()
      .put(
        "medaid-static-v1",
        &Request::get(url("/offline.html")),
        &Response::new(StatusCode::OK, "<h1>Offline</h1>"),
      )
      .unwrap();

    let response = router.handle(&Request::navigate(url("/reminders"))).await.unwrap();

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, b"<h1>Offline</h1>");
  }

  #[tokio::test]
  async fn test_subresource_offline_gets_plain_503() {
    let router = router(MockFetcher::offline());

    let response = router.handle(&Request::get(url("/logo.svg"))).await.unwrap();

    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.body, b"Offline");
  }

  #[tokio::test]
  async fn test_dropped_fetch_leaves_no_partial_write() {
    let fetcher = MockFetcher::new();
    fetcher.respond(&format!("{}/api/records", ORIGIN), StatusCode::OK, "[1,2,3]");
    let router = router(fetcher);
    let request = Request::get(url("/api/records"));
    let dynamic_count = |router: &FetchRouter<SqliteStorage, MockFetcher>| {
      router
        .cache()
        .summary()
        .unwrap()
        .into_iter()
        .find(|(name, _)| name == "medaid-dynamic-v1")
        .map(|(_, count)| count)
    };

    // Abandoned while the network call is still in flight
    let mut pending = Box::pin(router.handle(&request));
    assert!(futures::poll!(pending.as_mut()).is_pending());
    drop(pending);
    assert_eq!(router.fetcher().calls(), 1);
    assert_eq!(dynamic_count(&router), Some(0));
    assert!(router.cache().match_request(&request, None).unwrap().is_none());

    router.handle(&request).await.unwrap();
    assert_eq!(dynamic_count(&router), Some(1));
    let cached = router.cache().match_request(&request, None).unwrap().unwrap();
    assert_eq!(cached.status, StatusCode::OK);
    assert_eq!(cached.body, b"[1,2,3]");
  }

  #[tokio::test]
  async fn test_non_get_is_not_intercepted() {
    let router = router(MockFetcher::new());
    let request = Request::new(reqwest::Method::POST, url("/api/ai/chat")).with_body("{}");

    assert!(router.handle(&request).await.is_none());
    assert_eq!(router.fetcher().calls(), 0);
  }
}

//! Core types for the caching system.

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use sha2::{Digest, Sha256};

use crate::net::{Request, Response, ResponseSource};

/// Identity of a cached request: method, absolute URL and any vary headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestKey {
  pub method: String,
  pub url: String,
  /// (lowercase name, value) pairs in configured order
  pub vary: Vec<(String, String)>,
}

impl RequestKey {
  pub fn from_request(request: &Request, vary_headers: &[String]) -> Self {
    let vary = vary_headers
      .iter()
      .map(|name| {
        let value = request
          .headers
          .get(name.as_str())
          .and_then(|v| v.to_str().ok())
          .unwrap_or_default();
        (name.clone(), value.to_string())
      })
      .collect();

    Self {
      method: request.method.as_str().to_string(),
      url: request.url.as_str().to_string(),
      vary,
    }
  }

  /// Stable, fixed-length hash used as the storage key.
  pub fn cache_hash(&self) -> String {
    let mut input = format!("{} {}", self.method, self.url);
    for (name, value) in &self.vary {
      input.push('\n');
      input.push_str(name);
      input.push(':');
      input.push_str(value);
    }

    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
  }
}

/// A stored response snapshot.
#[derive(Debug, Clone)]
pub struct CachedEntry {
  pub namespace: String,
  pub status: u16,
  /// Header pairs in original order
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
  pub cached_at: DateTime<Utc>,
}

impl CachedEntry {
  /// Snapshot a response. Headers with non-UTF-8 values are dropped.
  pub fn snapshot(namespace: &str, response: &Response) -> Self {
    let headers = response
      .headers
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();

    Self {
      namespace: namespace.to_string(),
      status: response.status.as_u16(),
      headers,
      body: response.body.clone(),
      cached_at: Utc::now(),
    }
  }

  /// Rebuild a response from the snapshot.
  pub fn into_response(self) -> Response {
    let mut headers = HeaderMap::new();
    for (name, value) in &self.headers {
      if let (Ok(name), Ok(value)) = (
        HeaderName::from_bytes(name.as_bytes()),
        HeaderValue::from_str(value),
      ) {
        headers.append(name, value);
      }
    }

    Response {
      status: StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK),
      headers,
      body: self.body,
      source: ResponseSource::Cache,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use reqwest::header::ACCEPT_LANGUAGE;
  use url::Url;

  fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  #[test]
  fn test_hash_is_stable_and_distinguishes_urls() {
    let a = RequestKey::from_request(&Request::get(url("http://app/api/x")), &[]);
    let b = RequestKey::from_request(&Request::get(url("http://app/api/x")), &[]);
    let c = RequestKey::from_request(&Request::get(url("http://app/api/y")), &[]);
    assert_eq!(a.cache_hash(), b.cache_hash());
    assert_ne!(a.cache_hash(), c.cache_hash());
    assert_eq!(a.cache_hash().len(), 64);
  }

  #[test]
  fn test_vary_headers_split_identity() {
    let vary = vec!["accept-language".to_string()];
    let hi = Request::get(url("http://app/"))
      .with_header(ACCEPT_LANGUAGE, HeaderValue::from_static("hi"));
    let en = Request::get(url("http://app/"))
      .with_header(ACCEPT_LANGUAGE, HeaderValue::from_static("en"));

    assert_ne!(
      RequestKey::from_request(&hi, &vary).cache_hash(),
      RequestKey::from_request(&en, &vary).cache_hash()
    );
    // Ignored when not configured
    assert_eq!(
      RequestKey::from_request(&hi, &[]).cache_hash(),
      RequestKey::from_request(&en, &[]).cache_hash()
    );
  }

  #[test]
  fn test_snapshot_round_trip_keeps_status_and_headers() {
    let response = Response::new(StatusCode::CREATED, "body")
      .with_header(HeaderName::from_static("x-test"), HeaderValue::from_static("1"));
    let restored = CachedEntry::snapshot("ns", &response).into_response();

    assert_eq!(restored.status, StatusCode::CREATED);
    assert_eq!(restored.header("x-test"), Some("1"));
    assert_eq!(restored.body, b"body");
    assert_eq!(restored.source, ResponseSource::Cache);
  }
}

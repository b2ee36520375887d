//! Owned request and response snapshots.
//!
//! These mirror what a fetch event carries: a method, an absolute URL, headers,
//! a request mode and a body. Responses are fully buffered so they can be cloned
//! into the cache and handed back to the caller.

use color_eyre::{eyre::eyre, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use url::Url;

/// The purpose of a request, as reported by the page that issued it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RequestMode {
  /// Loading a full page/document
  Navigate,
  /// Any other sub-resource
  #[default]
  SameOrigin,
}

/// Request body as received from the page.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
  #[default]
  Empty,
  Bytes(Vec<u8>),
  /// The body stream errored before it could be read
  #[allow(dead_code)]
  Failed(String),
}

impl RequestBody {
  /// Read the whole body. An empty body reads as an empty slice.
  pub fn read(&self) -> Result<&[u8]> {
    match self {
      Self::Empty => Ok(&[]),
      Self::Bytes(bytes) => Ok(bytes),
      Self::Failed(reason) => Err(eyre!("Failed to read request body: {}", reason)),
    }
  }
}

#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub headers: HeaderMap,
  pub mode: RequestMode,
  pub body: RequestBody,
}

impl Request {
  pub fn new(method: Method, url: Url) -> Self {
    Self {
      method,
      url,
      headers: HeaderMap::new(),
      mode: RequestMode::default(),
      body: RequestBody::Empty,
    }
  }

  /// A plain GET for a sub-resource.
  pub fn get(url: Url) -> Self {
    Self::new(Method::GET, url)
  }

  /// A GET issued by a page navigation.
  #[cfg(test)]
  pub fn navigate(url: Url) -> Self {
    Self::get(url).with_mode(RequestMode::Navigate)
  }

  pub fn with_mode(mut self, mode: RequestMode) -> Self {
    self.mode = mode;
    self
  }

  pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
    self.body = RequestBody::Bytes(body.into());
    self
  }

  pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
    self.headers.insert(name, value);
    self
  }

  pub fn is_navigation(&self) -> bool {
    self.mode == RequestMode::Navigate
  }
}

/// Where a response handed back to the page came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Live network response
  Network,
  /// Previously stored snapshot
  Cache,
  /// Generated locally because neither network nor cache could answer
  Offline,
}

#[derive(Debug, Clone)]
pub struct Response {
  pub status: StatusCode,
  pub headers: HeaderMap,
  pub body: Vec<u8>,
  pub source: ResponseSource,
}

impl Response {
  pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers: HeaderMap::new(),
      body: body.into(),
      source: ResponseSource::Network,
    }
  }

  /// Build a locally generated JSON response.
  pub fn json<T: Serialize>(status: StatusCode, value: &T) -> Result<Self> {
    let body =
      serde_json::to_vec(value).map_err(|e| eyre!("Failed to serialize response body: {}", e))?;
    Ok(
      Self::new(status, body)
        .with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
        .with_source(ResponseSource::Offline),
    )
  }

  /// Build a locally generated plain-text response.
  pub fn text(status: StatusCode, text: &str) -> Self {
    Self::new(status, text.as_bytes())
      .with_header(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
      )
      .with_source(ResponseSource::Offline)
  }

  pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
    self.headers.insert(name, value);
    self
  }

  pub fn with_source(mut self, source: ResponseSource) -> Self {
    self.source = source;
    self
  }

  /// True for 2xx statuses.
  pub fn is_success(&self) -> bool {
    self.status.is_success()
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self.headers.get(name).and_then(|v| v.to_str().ok())
  }

  pub fn json_body<T: DeserializeOwned>(&self) -> Result<T> {
    serde_json::from_slice(&self.body).map_err(|e| eyre!("Failed to parse response body: {}", e))
  }
}

use color_eyre::{eyre::eyre, Result};
use std::future::Future;
use std::time::Duration;
use url::Url;

use super::types::{Request, RequestBody, Response, ResponseSource};
use crate::config::Config;

/// Network access used by the strategy handlers.
///
/// An `Err` means the network could not be reached at all. Non-2xx statuses
/// come back as `Ok` and are judged by the caller.
pub trait Fetcher: Send + Sync {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send;
}

/// HTTP fetcher backed by reqwest.
#[derive(Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
}

impl HttpFetcher {
  pub fn new(config: &Config) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.network.timeout_secs))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

impl Fetcher for HttpFetcher {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let mut builder = self
      .client
      .request(request.method.clone(), request.url.clone())
      .headers(request.headers.clone());

    match &request.body {
      RequestBody::Empty => {}
      RequestBody::Bytes(bytes) => builder = builder.body(bytes.clone()),
      RequestBody::Failed(reason) => {
        return Err(eyre!("Failed to send {}: body unreadable ({})", request.url, reason))
      }
    }

    let response = builder
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", request.url, e))?;

    let status = response.status();
    let headers = response.headers().clone();
    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body of {}: {}", request.url, e))?;

    Ok(Response {
      status,
      headers,
      body: body.to_vec(),
      source: ResponseSource::Network,
    })
  }
}

/// Resolve a possibly relative URL against the app origin.
pub fn resolve(origin: &Url, raw: &str) -> Result<Url> {
  origin
    .join(raw)
    .map_err(|e| eyre!("Invalid URL '{}': {}", raw, e))
}

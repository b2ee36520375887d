//! Cache store that manages namespace lifecycle on top of a storage backend.

use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use super::storage::CacheStorage;
use super::traits::{CachedEntry, RequestKey};
use crate::net::{Fetcher, Request, Response};

/// Names of the live namespace pair for one app version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNames {
  pub static_name: String,
  pub dynamic_name: String,
}

impl CacheNames {
  pub fn new(prefix: &str, version: &str) -> Self {
    Self {
      static_name: format!("{}-static-{}", prefix, version),
      dynamic_name: format!("{}-dynamic-{}", prefix, version),
    }
  }

  /// Namespaces that survive activation.
  pub fn keep_set(&self) -> [&str; 2] {
    [self.static_name.as_str(), self.dynamic_name.as_str()]
  }
}

/// Outcome of pruning stale namespaces.
#[derive(Debug, Default, Clone)]
pub struct PruneReport {
  pub deleted: Vec<String>,
  /// Namespaces whose deletion failed, with the error message
  pub failed: Vec<(String, String)>,
}

/// The only writer of the underlying storage.
pub struct CacheStore<S: CacheStorage> {
  storage: Arc<S>,
  names: CacheNames,
  vary_headers: Vec<String>,
}

impl<S: CacheStorage> CacheStore<S> {
  pub fn new(storage: S, names: CacheNames) -> Self {
    Self {
      storage: Arc::new(storage),
      names,
      vary_headers: Vec::new(),
    }
  }

  /// Request headers (lowercase) that take part in the cache key.
  pub fn with_vary_headers(mut self, vary_headers: Vec<String>) -> Self {
    self.vary_headers = vary_headers;
    self
  }

  pub fn static_namespace(&self) -> &str {
    &self.names.static_name
  }

  pub fn dynamic_namespace(&self) -> &str {
    &self.names.dynamic_name
  }

  pub fn names(&self) -> &CacheNames {
    &self.names
  }

  fn key(&self, request: &Request) -> RequestKey {
    RequestKey::from_request(request, &self.vary_headers)
  }

  /// Precache every asset into the static namespace.
  ///
  /// All assets are fetched concurrently; nothing is stored unless every one of
  /// them answered with a 2xx.
  pub async fn initialize_static<F: Fetcher>(&self, fetcher: &F, assets: &[Url]) -> Result<usize> {
    let namespace = self.static_namespace();

    let fetches = assets.iter().map(|url| async move {
      let request = Request::get(url.clone());
      let response = fetcher
        .fetch(&request)
        .await
        .map_err(|e| eyre!("Failed to precache {}: {}", url, e))?;
      if !response.is_success() {
        return Err(eyre!(
          "Failed to precache {}: status {}",
          url,
          response.status
        ));
      }
      Ok((self.key(&request), CachedEntry::snapshot(namespace, &response)))
    });

    let entries = try_join_all(fetches).await?;
    self.storage.put_entries(namespace, &entries)?;

    info!(namespace, count = entries.len(), "Precached static assets");
    Ok(entries.len())
  }

  /// Delete every namespace not in `keep`.
  ///
  /// A failed deletion is reported and does not stop the others.
  pub fn prune_stale_namespaces(&self, keep: &[&str]) -> Result<PruneReport> {
    let mut report = PruneReport::default();

    for name in self.storage.namespaces()? {
      if keep.contains(&name.as_str()) {
        continue;
      }

      match self.storage.delete_namespace(&name) {
        Ok(_) => {
          info!(namespace = %name, "Deleted stale cache namespace");
          report.deleted.push(name);
        }
        Err(e) => {
          warn!(namespace = %name, error = %e, "Failed to delete stale cache namespace");
          report.failed.push((name, e.to_string()));
        }
      }
    }

    Ok(report)
  }

  /// Create both live namespaces if they are missing.
  pub fn open_live_namespaces(&self) -> Result<()> {
    for name in self.names.keep_set() {
      self.storage.open_namespace(name)?;
    }
    Ok(())
  }

  /// Store a copy of `response` under the request identity, replacing any previous one.
  pub fn put(&self, namespace: &str, request: &Request, response: &Response) -> Result<()> {
    let entry = CachedEntry::snapshot(namespace, response);
    self
      .storage
      .put_entries(namespace, &[(self.key(request), entry)])?;
    debug!(namespace, url = %request.url, "Cached response");
    Ok(())
  }

  /// Exact identity lookup in `namespace`, or in every namespace oldest first.
  pub fn match_request(&self, request: &Request, namespace: Option<&str>) -> Result<Option<Response>> {
    let Some(entry) = self.storage.get_entry(namespace, &self.key(request))? else {
      return Ok(None);
    };
    debug!(namespace = %entry.namespace, url = %request.url, "Cache hit");
    Ok(Some(entry.into_response()))
  }

  /// True once every asset has an entry in the static namespace.
  pub fn is_precached(&self, assets: &[Url]) -> Result<bool> {
    let namespace = Some(self.static_namespace());
    for url in assets {
      let key = self.key(&Request::get(url.clone()));
      if self.storage.get_entry(namespace, &key)?.is_none() {
        debug!(%url, "Asset missing from static cache");
        return Ok(false);
      }
    }
    Ok(true)
  }

  /// Namespaces with their entry counts, oldest first.
  pub fn summary(&self) -> Result<Vec<(String, usize)>> {
    self
      .storage
      .namespaces()?
      .into_iter()
      .map(|name| {
        let count = self.storage.entry_count(&name)?;
        Ok((name, count))
      })
      .collect()
  }
}

impl<S: CacheStorage> Clone for CacheStore<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      names: self.names.clone(),
      vary_headers: self.vary_headers.clone(),
    }
  }
}

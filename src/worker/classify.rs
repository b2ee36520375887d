use reqwest::Method;

use crate::net::Request;

/// Caching strategy for an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
  /// Network first, synthesized reply when offline
  AiChat,
  /// Network first, last cached copy when offline
  Api,
  /// Cache first, network second
  StaticAsset,
}

/// Decide how to handle a request. `None` means it is not intercepted.
pub fn classify(request: &Request) -> Option<Strategy> {
  if request.method != Method::GET {
    return None;
  }

  let path = request.url.path();
  if path.contains("/api/ai/chat") {
    Some(Strategy::AiChat)
  } else if path.contains("/api/") {
    Some(Strategy::Api)
  } else {
    Some(Strategy::StaticAsset)
  }
}

//! Request/response model and the network seam used by the worker.

mod client;
mod types;

pub use client::{resolve, Fetcher, HttpFetcher};
#[cfg(test)]
pub use types::RequestBody;
pub use types::{Request, RequestMode, Response, ResponseSource};

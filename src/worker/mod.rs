//! The request-interception worker.
//!
//! - `classify` picks a caching strategy for each intercepted request
//! - `FetchRouter` runs the strategy against the cache and the network
//! - `Worker` drives the install/activate lifecycle and routes every event

mod classify;
mod host;
mod lifecycle;
mod notification;
mod router;

#[cfg(test)]
pub use host::WorkerHost;
pub use host::LogHost;
pub use lifecycle::{EventOutcome, ServiceWorkerState, Worker, WorkerEvent, BACKGROUND_SYNC_TAG};
pub use notification::{Notification, NotificationClick, NotificationData};
pub use router::FetchRouter;

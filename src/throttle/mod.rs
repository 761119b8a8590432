//! Per-host request and download throttling
//!
//! Every page load and file download goes through the [`RequestManager`]
//! of its host:
//! - at most one page load and one download in flight per host
//! - a randomized rest between requests, measured from the last request
//!   any process made to the host
//! - a bounded wait for another process's download to finish

mod cache;
mod factory;
mod manager;

pub use cache::{CacheError, InMemorySharedCache, SharedCache};
pub use factory::RequestManagerFactory;
pub use manager::{RequestManager, ThrottleContext, ThrottleError, ThrottleSettings};

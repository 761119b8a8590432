//! One RequestManager per host, created on first use

use crate::throttle::cache::SharedCache;
use crate::throttle::manager::{RequestManager, ThrottleSettings};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Owns every host's RequestManager for the life of the process
pub struct RequestManagerFactory {
    settings: ThrottleSettings,
    cache: Arc<dyn SharedCache>,
    managers: Mutex<HashMap<String, Arc<RequestManager>>>,
}

impl RequestManagerFactory {
    pub fn new(settings: ThrottleSettings, cache: Arc<dyn SharedCache>) -> Self {
        Self {
            settings,
            cache,
            managers: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the manager for `host`, creating it on first use
    ///
    /// Hosts are compared case-insensitively. Lookup and insertion happen
    /// under one lock, so concurrent first requests share a manager.
    pub fn manager_for(&self, host: &str) -> Arc<RequestManager> {
        let host = host.to_lowercase();
        let mut managers = self
            .managers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        managers
            .entry(host)
            .or_insert_with_key(|host| {
                tracing::debug!("Creating request manager for {}", host);
                Arc::new(RequestManager::new(
                    host.clone(),
                    self.settings.clone(),
                    self.cache.clone(),
                ))
            })
            .clone()
    }

    pub fn settings(&self) -> &ThrottleSettings {
        &self.settings
    }

    /// Number of hosts seen so far
    pub fn host_count(&self) -> usize {
        self.managers
            .lock()
            .map(|managers| managers.len())
            .unwrap_or_else(|poisoned| poisoned.into_inner().len())
    }
}

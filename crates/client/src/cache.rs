//! Read-through cache of resource metadata.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::trace;

use crate::path::clean_remote_path;
use crate::types::Resource;
use crate::{ClientError, Session};

/// Caches [`Session::info`] results keyed by cleaned remote path.
///
/// Concurrent misses on the same key may both reach the server; the last
/// response stored wins.
#[derive(Debug)]
pub struct ResourceCache {
    session: Arc<Session>,
    entries: RwLock<HashMap<String, Arc<Resource>>>,
}

impl ResourceCache {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the cached resource for `path`, fetching it on a miss.
    pub async fn info(&self, path: &str) -> Result<Arc<Resource>, ClientError> {
        let key = clean_remote_path(path);
        if let Some(hit) = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            trace!(path = %key, "resource cache hit");
            return Ok(Arc::clone(hit));
        }

        let resource = Arc::new(self.session.info(&key).await?);
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, Arc::clone(&resource));
        Ok(resource)
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

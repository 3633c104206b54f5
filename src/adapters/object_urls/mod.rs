// Object URL store - In-process stand-in for host-managed blob URLs

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::trace;
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::model::ObjectUrl;
use crate::ports::{ByteSource, UrlPort};

#[derive(Default)]
struct UrlTable {
    live: HashMap<ObjectUrl, Arc<dyn ByteSource>>,
    created: usize,
    revoked: Vec<ObjectUrl>,
}

/// Maps `blob:<uuid>` URLs to the sources they were created for
#[derive(Default)]
pub struct ObjectUrlStore {
    table: Mutex<UrlTable>,
}

impl ObjectUrlStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> std::sync::MutexGuard<'_, UrlTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Source behind a live URL
    pub fn resolve(&self, url: &ObjectUrl) -> Option<Arc<dyn ByteSource>> {
        self.table().live.get(url).cloned()
    }

    pub fn live_count(&self) -> usize {
        self.table().live.len()
    }

    pub fn created_count(&self) -> usize {
        self.table().created
    }

    /// How many times `url` was successfully revoked
    pub fn revocations_of(&self, url: &ObjectUrl) -> usize {
        self.table().revoked.iter().filter(|r| *r == url).count()
    }
}

impl UrlPort for ObjectUrlStore {
    fn create_object_url(&self, source: Arc<dyn ByteSource>) -> ObjectUrl {
        let url = ObjectUrl::new(format!("blob:{}", Uuid::new_v4()));
        let mut table = self.table();
        trace!(%url, name = source.name(), "Object URL created");
        table.live.insert(url.clone(), source);
        table.created += 1;
        url
    }

    fn revoke_object_url(&self, url: &ObjectUrl) -> Result<(), DomainError> {
        let mut table = self.table();
        match table.live.remove(url) {
            Some(_) => {
                trace!(%url, "Object URL revoked");
                table.revoked.push(url.clone());
                Ok(())
            }
            None => Err(DomainError::NotFound(format!("object URL {}", url))),
        }
    }
}

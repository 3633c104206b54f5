// Resource reclaimer - Releases object URLs and engine files of removed records

use std::sync::Arc;

use tracing::debug;

use crate::domain::model::{Job, ObjectUrl, SelectionRecord};
use crate::ports::{TranscodeEngine, UrlPort};

/// Fire-and-forget release of everything a removed record owned
#[derive(Clone)]
pub struct ResourceReclaimer {
    urls: Arc<dyn UrlPort>,
}

impl ResourceReclaimer {
    pub fn new(urls: Arc<dyn UrlPort>) -> Self {
        Self { urls }
    }

    pub fn reclaim_selection(&self, record: &SelectionRecord) {
        self.revoke(record.preview_url());
    }

    /// Releases the original URL and, when completed, the processed URL
    pub fn reclaim_job(&self, job: &Job) {
        for url in job.owned_urls() {
            self.revoke(&url);
        }
    }

    pub fn revoke(&self, url: &ObjectUrl) {
        if let Err(error) = self.urls.revoke_object_url(url) {
            debug!(%url, %error, "Ignoring object URL release failure");
        }
    }

    /// Best-effort removal of engine files; failures are swallowed
    pub async fn delete_virtual_files(engine: &dyn TranscodeEngine, names: &[&str]) {
        for name in names {
            if let Err(error) = engine.delete_file(name).await {
                debug!(file = name, %error, "Ignoring virtual file cleanup failure");
            }
        }
    }
}

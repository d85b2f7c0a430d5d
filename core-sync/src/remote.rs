//! Remote endpoint that accepts synced progress.

use crate::error::{Result, SyncError};
use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpRequest};
use core_store::ProgressRecord;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Server side of progress sync.
///
/// `Ok(())` means the server acknowledged the record and the pending item may
/// be deleted. Any error keeps the item queued.
#[async_trait]
pub trait ProgressApi: Send + Sync {
    async fn submit_progress(&self, record: &ProgressRecord) -> Result<()>;
}

/// Posts progress records as JSON over the injected [`HttpClient`].
pub struct HttpProgressApi {
    http_client: Arc<dyn HttpClient>,
    endpoint: String,
}

impl HttpProgressApi {
    /// `endpoint` is the absolute URL, e.g. `https://learn.example.com/api/progress`.
    pub fn new(http_client: Arc<dyn HttpClient>, endpoint: impl Into<String>) -> Self {
        Self {
            http_client,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ProgressApi for HttpProgressApi {
    #[instrument(skip(self, record), fields(record_id = record.id))]
    async fn submit_progress(&self, record: &ProgressRecord) -> Result<()> {
        let request = HttpRequest::post(&self.endpoint).json(record)?;
        let response = self.http_client.execute(request).await?;

        if !response.is_success() {
            return Err(SyncError::Rejected {
                status: response.status,
                message: response.text().unwrap_or_default(),
            });
        }

        debug!(status = response.status, "Progress accepted");
        Ok(())
    }
}

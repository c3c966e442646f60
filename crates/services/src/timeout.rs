use std::future::Future;
use std::time::Duration;

use storage::repository::StorageError;
use tracing::warn;

use crate::error::ServiceError;

/// Bounds a single repository call.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StorageDeadline {
    limit: Duration,
}

impl StorageDeadline {
    pub(crate) fn new(limit: Duration) -> Self {
        Self { limit }
    }

    /// Run `call`, mapping an elapsed deadline to `ServiceError::Timeout`.
    pub(crate) async fn run<T>(
        self,
        operation: &'static str,
        call: impl Future<Output = Result<T, StorageError>>,
    ) -> Result<T, ServiceError> {
        match tokio::time::timeout(self.limit, call).await {
            Ok(result) => result.map_err(ServiceError::from),
            Err(_) => {
                warn!(operation, limit = ?self.limit, "storage call timed out");
                Err(ServiceError::Timeout { operation })
            }
        }
    }
}

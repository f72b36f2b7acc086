//! Storage health check

use opendal::Operator;

use crate::error::{StorageError, StorageResult};

/// Verify the store is reachable by listing the root
pub async fn check_health(op: &Operator) -> StorageResult<()> {
    op.list("/")
        .await
        .map(|_| ())
        .map_err(|e| StorageError::from_opendal("/", e))
}

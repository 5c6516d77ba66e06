//! Data-service contract consumed by the cache engine.

use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::ServiceError;
use crate::domain::cases::UpdateStatusPayload;
use crate::domain::entities::{CaseRecord, CaseSummary};

/// Remote source of truth for cases. Every call is asynchronous and fallible.
#[async_trait]
pub trait CasesApi: Send + Sync + 'static {
    async fn list_cases(&self) -> Result<Vec<CaseSummary>, ServiceError>;

    /// Fails with `NotFound` when `id` is unknown.
    async fn get_case(&self, id: &str) -> Result<CaseRecord, ServiceError>;

    /// Returns the stored record after the change. Fails with `Validation`
    /// when the payload is rejected.
    async fn update_case_status(
        &self,
        id: &str,
        payload: &UpdateStatusPayload,
    ) -> Result<CaseRecord, ServiceError>;
}

#[async_trait]
impl<T: CasesApi + ?Sized> CasesApi for Arc<T> {
    async fn list_cases(&self) -> Result<Vec<CaseSummary>, ServiceError> {
        (**self).list_cases().await
    }

    async fn get_case(&self, id: &str) -> Result<CaseRecord, ServiceError> {
        (**self).get_case(id).await
    }

    async fn update_case_status(
        &self,
        id: &str,
        payload: &UpdateStatusPayload,
    ) -> Result<CaseRecord, ServiceError> {
        (**self).update_case_status(id, payload).await
    }
}

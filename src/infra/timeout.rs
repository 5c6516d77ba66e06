//! Execution budget for data-service calls.
//!
//! A call that does not settle within the budget fails with
//! `ServiceError::Timeout`, which the engine treats like any other failure:
//! reads record the error, mutations roll back.

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::application::api::CasesApi;
use crate::cache::ServiceError;
use crate::domain::cases::UpdateStatusPayload;
use crate::domain::entities::{CaseRecord, CaseSummary};

pub struct TimeoutApi<A> {
    inner: A,
    budget: Duration,
}

impl<A> TimeoutApi<A> {
    pub fn new(inner: A, budget: Duration) -> Self {
        Self { inner, budget }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }
}

impl<A: CasesApi> TimeoutApi<A> {
    async fn bounded<T, F>(&self, operation: &'static str, call: F) -> Result<T, ServiceError>
    where
        F: Future<Output = Result<T, ServiceError>> + Send,
    {
        match tokio::time::timeout(self.budget, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    operation,
                    budget_ms = self.budget.as_millis() as u64,
                    "data-service call exceeded its budget"
                );
                Err(ServiceError::timeout(self.budget))
            }
        }
    }
}

#[async_trait]
impl<A: CasesApi> CasesApi for TimeoutApi<A> {
    async fn list_cases(&self) -> Result<Vec<CaseSummary>, ServiceError> {
        self.bounded("list_cases", self.inner.list_cases()).await
    }

    async fn get_case(&self, id: &str) -> Result<CaseRecord, ServiceError> {
        self.bounded("get_case", self.inner.get_case(id)).await
    }

    async fn update_case_status(
        &self,
        id: &str,
        payload: &UpdateStatusPayload,
    ) -> Result<CaseRecord, ServiceError> {
        self.bounded(
            "update_case_status",
            self.inner.update_case_status(id, payload),
        )
        .await
    }
}

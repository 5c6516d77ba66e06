//! Presentation-facing facade over the cache engine for cases.

use std::sync::Arc;

use tracing::{debug, info};

use crate::application::api::CasesApi;
use crate::application::error::AppError;
use crate::application::policy::{CASES_COLLECTION, CasePolicy, case_key, cases_key};
use crate::cache::{
    CacheConfig, CacheEngine, MutationHandle, QueryData, QueryDescriptor, QueryOptions,
    QueryState, QuerySubscription, ServiceError,
};
use crate::domain::cases::{UpdateStatusPayload, validate_status_change};
use crate::domain::entities::{CaseRecord, CaseSummary};
use crate::domain::error::DomainError;
use crate::domain::types::CaseStatus;

pub type CaseEngine = CacheEngine<CaseRecord, CasePolicy>;

/// Read subscriptions and guarded status mutations for cases.
#[derive(Clone)]
pub struct CaseClient {
    api: Arc<dyn CasesApi>,
    engine: CaseEngine,
}

impl CaseClient {
    pub fn new(api: Arc<dyn CasesApi>, config: CacheConfig) -> Self {
        Self {
            api,
            engine: CacheEngine::new(config, CasePolicy),
        }
    }

    pub fn engine(&self) -> &CaseEngine {
        &self.engine
    }

    pub fn list_descriptor(&self) -> QueryDescriptor<CaseRecord> {
        let api = Arc::clone(&self.api);
        let config = self.engine.config();
        QueryDescriptor::collection(
            cases_key(),
            CASES_COLLECTION,
            move || {
                let api = Arc::clone(&api);
                async move { api.list_cases().await }
            },
            QueryOptions::new(config.list_stale_time(), config.list_retry()),
        )
    }

    pub fn detail_descriptor(&self, id: &str) -> QueryDescriptor<CaseRecord> {
        let api = Arc::clone(&self.api);
        let config = self.engine.config();
        let case_id = id.to_string();
        QueryDescriptor::entity(
            case_key(id),
            id.to_string(),
            move || {
                let api = Arc::clone(&api);
                let case_id = case_id.clone();
                async move { api.get_case(&case_id).await }
            },
            QueryOptions::new(config.detail_stale_time(), config.detail_retry()),
        )
    }

    /// Current list state; starts a background fetch when needed.
    pub fn list(&self) -> QueryState<CaseRecord> {
        self.engine.queries().query(&self.list_descriptor())
    }

    /// Current detail state; starts a background fetch when needed.
    pub fn detail(&self, id: &str) -> QueryState<CaseRecord> {
        self.engine.queries().query(&self.detail_descriptor(id))
    }

    pub async fn fetch_list(&self) -> Result<Vec<CaseSummary>, ServiceError> {
        let data = self.engine.queries().fetch(&self.list_descriptor()).await?;
        Ok(data.into_collection().unwrap_or_default())
    }

    pub async fn fetch_detail(&self, id: &str) -> Result<CaseRecord, ServiceError> {
        match self.engine.queries().fetch(&self.detail_descriptor(id)).await? {
            QueryData::Entity(record) => Ok(record),
            QueryData::Collection(_) => Err(ServiceError::not_found(id)),
        }
    }

    pub fn subscribe_list(&self) -> QuerySubscription<CaseRecord> {
        self.engine.queries().subscribe(self.list_descriptor())
    }

    pub fn subscribe_detail(&self, id: &str) -> QuerySubscription<CaseRecord> {
        self.engine.queries().subscribe(self.detail_descriptor(id))
    }

    pub fn cached_case(&self, id: &str) -> Option<CaseRecord> {
        self.engine.store().get(&id.to_string())
    }

    pub fn cached_list(&self) -> Option<Vec<CaseSummary>> {
        self.engine.store().collection(CASES_COLLECTION)
    }

    /// Status as currently cached: the detail entry, else the list projection.
    pub fn current_status(&self, id: &str) -> Option<CaseStatus> {
        if let Some(record) = self.cached_case(id) {
            return Some(record.status);
        }
        self.cached_list()?
            .into_iter()
            .find(|summary| summary.id == id)
            .map(|summary| summary.status)
    }

    /// Validate and submit a status change against cached state only.
    ///
    /// A rejected payload never reaches the engine: nothing is patched and no
    /// remote call is made.
    pub fn try_update_status(
        &self,
        id: &str,
        payload: UpdateStatusPayload,
    ) -> Result<MutationHandle<CaseRecord>, AppError> {
        let current = self
            .current_status(id)
            .ok_or_else(|| DomainError::not_found(format!("case `{id}` (not loaded)")))?;
        self.submit(id, current, payload)
    }

    /// Like [`Self::try_update_status`], fetching the detail first when the
    /// case is not cached at all.
    pub async fn update_status(
        &self,
        id: &str,
        payload: UpdateStatusPayload,
    ) -> Result<MutationHandle<CaseRecord>, AppError> {
        let current = match self.current_status(id) {
            Some(status) => status,
            None => {
                debug!(case_id = id, "status not cached; fetching detail");
                self.fetch_detail(id).await?.status
            }
        };
        self.submit(id, current, payload)
    }

    fn submit(
        &self,
        id: &str,
        current: CaseStatus,
        payload: UpdateStatusPayload,
    ) -> Result<MutationHandle<CaseRecord>, AppError> {
        validate_status_change(current, &payload)?;

        info!(
            case_id = id,
            from = %current,
            to = %payload.status,
            "Submitting status change"
        );

        let api = Arc::clone(&self.api);
        Ok(self
            .engine
            .mutations()
            .mutate(id.to_string(), payload, move |id, payload| async move {
                api.update_case_status(&id, &payload).await
            }))
    }
}

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use caseflow::application::api::CasesApi;
use caseflow::application::client::CaseClient;
use caseflow::cache::{CacheConfig, ServiceError};
use caseflow::domain::cases::UpdateStatusPayload;
use caseflow::domain::entities::{CaseRecord, CaseSummary};
use caseflow::domain::types::CaseStatus;
use time::macros::datetime;
use tokio::sync::oneshot;

pub type Reply = oneshot::Sender<Result<CaseRecord, ServiceError>>;
type HeldReply = oneshot::Receiver<Result<CaseRecord, ServiceError>>;

pub fn case(id: &str, status: CaseStatus) -> CaseRecord {
    CaseRecord {
        id: id.to_string(),
        name: format!("Entity {}", id.trim_start_matches("case-")),
        status,
        created_at: datetime!(2026-01-01 09:00 UTC),
        notes: None,
    }
}

/// Collaborator with scripted failures and manually released updates.
///
/// Reads answer from the stored cases after `latency`; queued failures are
/// returned first. Updates wait for a held reply when one is queued, else
/// apply the status and return the stored record with notes normalised.
pub struct ScriptedApi {
    cases: Mutex<BTreeMap<String, CaseRecord>>,
    latency: Duration,
    list_failures: Mutex<VecDeque<ServiceError>>,
    get_failures: Mutex<VecDeque<ServiceError>>,
    held_updates: Mutex<HashMap<String, VecDeque<HeldReply>>>,
    list_calls: AtomicUsize,
    get_calls: AtomicUsize,
    update_calls: AtomicUsize,
}

impl ScriptedApi {
    pub fn new(cases: Vec<CaseRecord>) -> Self {
        Self {
            cases: Mutex::new(cases.into_iter().map(|c| (c.id.clone(), c)).collect()),
            latency: Duration::ZERO,
            list_failures: Mutex::new(VecDeque::new()),
            get_failures: Mutex::new(VecDeque::new()),
            held_updates: Mutex::new(HashMap::new()),
            list_calls: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn fail_list(&self, error: ServiceError) {
        self.list_failures.lock().unwrap().push_back(error);
    }

    pub fn fail_get(&self, error: ServiceError) {
        self.get_failures.lock().unwrap().push_back(error);
    }

    /// The next update of `id` waits for the returned sender.
    pub fn hold_update(&self, id: &str) -> Reply {
        let (tx, rx) = oneshot::channel();
        self.held_updates
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_default()
            .push_back(rx);
        tx
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl CasesApi for ScriptedApi {
    async fn list_cases(&self) -> Result<Vec<CaseSummary>, ServiceError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if let Some(error) = self.list_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        let cases = self.cases.lock().unwrap();
        Ok(cases.values().map(CaseRecord::summary).collect())
    }

    async fn get_case(&self, id: &str) -> Result<CaseRecord, ServiceError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if let Some(error) = self.get_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        let cases = self.cases.lock().unwrap();
        cases
            .get(id)
            .cloned()
            .ok_or_else(|| ServiceError::not_found(id))
    }

    async fn update_case_status(
        &self,
        id: &str,
        payload: &UpdateStatusPayload,
    ) -> Result<CaseRecord, ServiceError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let held = self
            .held_updates
            .lock()
            .unwrap()
            .get_mut(id)
            .and_then(VecDeque::pop_front);
        if let Some(reply) = held {
            return reply
                .await
                .unwrap_or_else(|_| Err(ServiceError::server(500, "reply dropped")));
        }

        self.pause().await;
        let mut cases = self.cases.lock().unwrap();
        let record = cases
            .get_mut(id)
            .ok_or_else(|| ServiceError::not_found(id))?;
        record.status = payload.status;
        let mut returned = record.clone();
        returned.notes.get_or_insert_with(String::new);
        Ok(returned)
    }
}

pub fn client(api: Arc<ScriptedApi>) -> CaseClient {
    client_with(api, CacheConfig::default())
}

pub fn client_with(api: Arc<ScriptedApi>, config: CacheConfig) -> CaseClient {
    CaseClient::new(api, config)
}

pub fn listed_status(client: &CaseClient, id: &str) -> Option<CaseStatus> {
    client
        .cached_list()?
        .into_iter()
        .find(|summary| summary.id == id)
        .map(|summary| summary.status)
}

pub fn detail_status(client: &CaseClient, id: &str) -> Option<CaseStatus> {
    client.cached_case(id).map(|case| case.status)
}

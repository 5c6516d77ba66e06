//! Simulated remote case service.
//!
//! Holds cases in memory and answers with random latency and a random rate
//! of server failures. Validation mirrors the client-side guard, so a request
//! that slips past the guard still comes back as field errors.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use time::OffsetDateTime;
use tracing::debug;

use crate::application::api::CasesApi;
use crate::cache::ServiceError;
use crate::cache::lock::mutex_lock;
use crate::config::ServiceSettings;
use crate::domain::cases::{UpdateStatusPayload, validate_status_change};
use crate::domain::entities::{CaseRecord, CaseSummary};
use crate::domain::error::DomainError;
use crate::domain::types::CaseStatus;

const SOURCE: &str = "infra::mock";

const READ_FAILURE_MESSAGE: &str = "Server error";
const UPDATE_FAILURE_MESSAGE: &str = "Something went wrong";

/// Latency and failure injection.
#[derive(Debug, Clone, PartialEq)]
pub struct MockBehavior {
    pub read_latency_min: Duration,
    pub read_latency_max: Duration,
    pub update_latency_min: Duration,
    pub update_latency_max: Duration,
    /// Probability in `[0, 1]` that a call fails with a server error.
    pub failure_rate: f64,
}

impl MockBehavior {
    /// No latency, no random failures.
    pub fn deterministic() -> Self {
        Self {
            read_latency_min: Duration::ZERO,
            read_latency_max: Duration::ZERO,
            update_latency_min: Duration::ZERO,
            update_latency_max: Duration::ZERO,
            failure_rate: 0.0,
        }
    }
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            read_latency_min: Duration::from_millis(400),
            read_latency_max: Duration::from_millis(1_000),
            update_latency_min: Duration::from_millis(800),
            update_latency_max: Duration::from_millis(1_500),
            failure_rate: 0.08,
        }
    }
}

impl From<&ServiceSettings> for MockBehavior {
    fn from(settings: &ServiceSettings) -> Self {
        Self {
            read_latency_min: settings.read_latency_min,
            read_latency_max: settings.read_latency_max,
            update_latency_min: settings.update_latency_min,
            update_latency_max: settings.update_latency_max,
            failure_rate: settings.failure_rate,
        }
    }
}

/// `count` cases, `case-1` newest, one day apart, status cycling through
/// every variant and notes on every third case.
pub fn seed_cases(count: usize, now: OffsetDateTime) -> Vec<CaseRecord> {
    (0..count)
        .map(|index| {
            let number = index + 1;
            let id = format!("case-{number}");
            let notes = if index % 3 == 0 {
                format!("Notes for {id}")
            } else {
                String::new()
            };
            CaseRecord {
                name: format!("Entity {number}"),
                status: CaseStatus::ALL[index % CaseStatus::ALL.len()],
                created_at: now - time::Duration::days(index as i64),
                notes: Some(notes),
                id,
            }
        })
        .collect()
}

#[derive(Debug, Default)]
struct CallCounts {
    list: AtomicUsize,
    get: AtomicUsize,
    update: AtomicUsize,
}

pub struct MockCasesApi {
    cases: Mutex<Vec<CaseRecord>>,
    behavior: MockBehavior,
    rng: Mutex<StdRng>,
    /// Failures returned by the next update calls, ahead of random ones.
    scripted_update_failures: Mutex<VecDeque<ServiceError>>,
    calls: CallCounts,
}

impl MockCasesApi {
    pub fn new(cases: Vec<CaseRecord>, behavior: MockBehavior) -> Self {
        Self {
            cases: Mutex::new(cases),
            behavior,
            rng: Mutex::new(StdRng::from_entropy()),
            scripted_update_failures: Mutex::new(VecDeque::new()),
            calls: CallCounts::default(),
        }
    }

    pub fn seeded(count: usize, behavior: MockBehavior) -> Self {
        Self::new(seed_cases(count, OffsetDateTime::now_utc()), behavior)
    }

    pub fn from_settings(settings: &ServiceSettings) -> Self {
        Self::seeded(settings.seed_count, MockBehavior::from(settings))
    }

    /// Reproducible latency and failure sequence.
    pub fn with_rng_seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    /// Make the next update fail with `error` after validation passes.
    pub fn fail_next_update(&self, error: ServiceError) {
        lock(&self.scripted_update_failures, "fail_next_update").push_back(error);
    }

    pub fn stored(&self, id: &str) -> Option<CaseRecord> {
        lock(&self.cases, "stored")
            .iter()
            .find(|case| case.id == id)
            .cloned()
    }

    pub fn list_calls(&self) -> usize {
        self.calls.list.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.calls.get.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.calls.update.load(Ordering::SeqCst)
    }

    fn latency(&self, min: Duration, max: Duration) -> Duration {
        if max <= min {
            return min;
        }
        let spread = (max - min).as_millis() as u64;
        let extra = lock(&self.rng, "latency").gen_range(0..spread);
        min + Duration::from_millis(extra)
    }

    fn roll_failure(&self) -> bool {
        self.behavior.failure_rate > 0.0
            && lock(&self.rng, "roll_failure").r#gen::<f64>() < self.behavior.failure_rate
    }

    async fn simulate_read_latency(&self) {
        let delay = self.latency(self.behavior.read_latency_min, self.behavior.read_latency_max);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>, op: &'static str) -> MutexGuard<'a, T> {
    mutex_lock(mutex, SOURCE, op)
}

fn to_service_error(error: DomainError) -> ServiceError {
    match error {
        DomainError::Fields { fields } => ServiceError::validation(fields),
        DomainError::NotFound { entity } => ServiceError::not_found(entity),
        DomainError::Validation { message } => ServiceError::field("status", message),
    }
}

#[async_trait]
impl CasesApi for MockCasesApi {
    async fn list_cases(&self) -> Result<Vec<CaseSummary>, ServiceError> {
        self.calls.list.fetch_add(1, Ordering::SeqCst);
        self.simulate_read_latency().await;

        if self.roll_failure() {
            debug!("mock list failing with injected server error");
            return Err(ServiceError::server(500, READ_FAILURE_MESSAGE));
        }

        let summaries: Vec<CaseSummary> = lock(&self.cases, "list_cases")
            .iter()
            .map(CaseRecord::summary)
            .collect();
        debug!(count = summaries.len(), "mock list served");
        Ok(summaries)
    }

    async fn get_case(&self, id: &str) -> Result<CaseRecord, ServiceError> {
        self.calls.get.fetch_add(1, Ordering::SeqCst);
        self.simulate_read_latency().await;

        let found = self
            .stored(id)
            .ok_or_else(|| ServiceError::not_found(id))?;
        if self.roll_failure() {
            debug!(case_id = id, "mock detail failing with injected server error");
            return Err(ServiceError::server(500, READ_FAILURE_MESSAGE));
        }
        Ok(found)
    }

    async fn update_case_status(
        &self,
        id: &str,
        payload: &UpdateStatusPayload,
    ) -> Result<CaseRecord, ServiceError> {
        self.calls.update.fetch_add(1, Ordering::SeqCst);
        let delay = self.latency(
            self.behavior.update_latency_min,
            self.behavior.update_latency_max,
        );
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let current = self
            .stored(id)
            .ok_or_else(|| ServiceError::not_found(id))?;
        validate_status_change(current.status, payload).map_err(to_service_error)?;

        let scripted = lock(&self.scripted_update_failures, "update_case_status").pop_front();
        if let Some(error) = scripted {
            debug!(case_id = id, error = %error, "mock update failing with scripted error");
            return Err(error);
        }
        if self.roll_failure() {
            debug!(case_id = id, "mock update failing with injected server error");
            return Err(ServiceError::server(500, UPDATE_FAILURE_MESSAGE));
        }

        let mut cases = lock(&self.cases, "update_case_status");
        let stored = cases
            .iter_mut()
            .find(|case| case.id == id)
            .ok_or_else(|| ServiceError::not_found(id))?;
        stored.status = payload.status;
        stored.notes = Some(stored.notes.take().unwrap_or_default());
        debug!(case_id = id, status = %payload.status, "mock update applied");
        Ok(stored.clone())
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn api() -> MockCasesApi {
        MockCasesApi::new(
            seed_cases(8, datetime!(2025-03-10 12:00 UTC)),
            MockBehavior::deterministic(),
        )
    }

    #[test]
    fn seed_layout() {
        let cases = seed_cases(8, datetime!(2025-03-10 12:00 UTC));

        assert_eq!(cases.len(), 8);
        assert_eq!(cases[0].id, "case-1");
        assert_eq!(cases[0].name, "Entity 1");
        assert_eq!(cases[0].status, CaseStatus::New);
        assert_eq!(cases[1].status, CaseStatus::InReview);
        assert_eq!(cases[4].status, CaseStatus::New);
        assert_eq!(cases[0].notes.as_deref(), Some("Notes for case-1"));
        assert_eq!(cases[1].notes.as_deref(), Some(""));
        assert_eq!(cases[3].notes.as_deref(), Some("Notes for case-4"));
        assert_eq!(cases[2].created_at, datetime!(2025-03-08 12:00 UTC));
    }

    #[tokio::test]
    async fn list_projects_summaries() {
        let api = api();
        let list = api.list_cases().await.expect("list");
        assert_eq!(list.len(), 8);
        assert_eq!(list[0].id, "case-1");
        assert_eq!(api.list_calls(), 1);
    }

    #[tokio::test]
    async fn unknown_case_is_not_found() {
        let error = api().get_case("case-99").await.expect_err("missing");
        assert_eq!(error, ServiceError::not_found("case-99"));
    }

    #[tokio::test]
    async fn update_reports_every_violated_field() {
        let api = api();
        // case-4 is already rejected
        let payload = UpdateStatusPayload::new(CaseStatus::Rejected).with_reason("short");

        let error = api
            .update_case_status("case-4", &payload)
            .await
            .expect_err("invalid");
        let fields = error.field_errors().expect("validation error");
        assert_eq!(fields.get("status").map(String::as_str), Some("Status must change"));
        assert_eq!(
            fields.get("reason").map(String::as_str),
            Some("Reason is required and must be at least 10 characters")
        );
        assert_eq!(api.stored("case-4").map(|c| c.status), Some(CaseStatus::Rejected));
    }

    #[tokio::test]
    async fn update_persists_and_normalises_notes() {
        let cases = vec![CaseRecord {
            notes: None,
            ..seed_cases(1, datetime!(2025-03-10 12:00 UTC)).remove(0)
        }];
        let api = MockCasesApi::new(cases, MockBehavior::deterministic());

        let updated = api
            .update_case_status("case-1", &UpdateStatusPayload::new(CaseStatus::Approved))
            .await
            .expect("update");

        assert_eq!(updated.status, CaseStatus::Approved);
        assert_eq!(updated.notes.as_deref(), Some(""));
        assert_eq!(api.stored("case-1"), Some(updated));
    }

    #[tokio::test]
    async fn scripted_failure_leaves_record_untouched() {
        let api = api();
        api.fail_next_update(ServiceError::server(500, "boom"));

        let error = api
            .update_case_status("case-1", &UpdateStatusPayload::new(CaseStatus::Approved))
            .await
            .expect_err("scripted");

        assert_eq!(error, ServiceError::server(500, "boom"));
        assert_eq!(api.stored("case-1").map(|c| c.status), Some(CaseStatus::New));
    }

    #[tokio::test]
    async fn certain_failure_rate_always_fails() {
        let api = MockCasesApi::new(
            seed_cases(2, OffsetDateTime::now_utc()),
            MockBehavior {
                failure_rate: 1.0,
                ..MockBehavior::deterministic()
            },
        )
        .with_rng_seed(7);

        assert_eq!(
            api.list_cases().await,
            Err(ServiceError::server(500, "Server error"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn reads_take_configured_latency() {
        let api = MockCasesApi::new(
            seed_cases(1, OffsetDateTime::now_utc()),
            MockBehavior {
                read_latency_min: Duration::from_millis(400),
                read_latency_max: Duration::from_millis(1_000),
                ..MockBehavior::deterministic()
            },
        )
        .with_rng_seed(42);

        let started = tokio::time::Instant::now();
        api.get_case("case-1").await.expect("found");
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(400));
        assert!(elapsed < Duration::from_millis(1_000));
    }
}

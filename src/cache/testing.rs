//! Minimal resource used by the engine's unit tests.

use super::keys::QueryKey;
use super::policy::ReconciliationPolicy;
use super::resource::Resource;

#[derive(Debug, Clone, PartialEq)]
pub struct Ticket {
    pub id: String,
    pub state: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TicketSummary {
    pub id: String,
    pub state: String,
}

impl Resource for Ticket {
    type Key = String;
    type Summary = TicketSummary;

    fn key(&self) -> &String {
        &self.id
    }

    fn summary_key(summary: &TicketSummary) -> &String {
        &summary.id
    }

    fn project_summary(&self) -> TicketSummary {
        TicketSummary {
            id: self.id.clone(),
            state: self.state.clone(),
        }
    }
}

/// Payload is the next state.
pub struct TicketPolicy;

impl ReconciliationPolicy<Ticket> for TicketPolicy {
    type Payload = String;

    fn apply_patch(&self, entity: &Ticket, payload: &String) -> Ticket {
        Ticket {
            state: payload.clone(),
            ..entity.clone()
        }
    }

    fn apply_patch_to_summary(&self, summary: &TicketSummary, payload: &String) -> TicketSummary {
        TicketSummary {
            state: payload.clone(),
            ..summary.clone()
        }
    }

    fn affected_queries(&self, key: &String) -> Vec<QueryKey> {
        vec![list_key(), detail_key(key)]
    }
}

pub fn ticket(id: &str, state: &str) -> Ticket {
    Ticket {
        id: id.to_string(),
        state: state.to_string(),
        body: format!("body of {id}"),
    }
}

pub fn summaries(items: &[(&str, &str)]) -> Vec<TicketSummary> {
    items
        .iter()
        .map(|(id, state)| TicketSummary {
            id: id.to_string(),
            state: state.to_string(),
        })
        .collect()
}

pub fn list_key() -> QueryKey {
    QueryKey::new(["tickets"])
}

pub fn detail_key(id: &str) -> QueryKey {
    QueryKey::new(["ticket", id])
}

use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use crate::admission::{Decision, QueryPurpose};
use crate::models::{Event, Filter};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct FilterParams {
    // COUNT request instead of REQ
    #[serde(default)]
    pub count: bool,
}

#[derive(Debug, Serialize)]
pub struct FilterReply {
    pub accepted: bool,
    pub reason: String,
    pub events: Vec<Event>,
}

pub async fn filter_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FilterParams>,
    Json(filter): Json<Filter>,
) -> Json<FilterReply> {
    let purpose = if params.count {
        QueryPurpose::Count
    } else {
        QueryPurpose::Fetch
    };

    if let Decision::Reject { reason } = state.policy.check_filter(&filter, purpose) {
        return Json(FilterReply {
            accepted: false,
            reason,
            events: Vec::new(),
        });
    }

    let mut events = Vec::new();
    for store in &state.stores {
        match store.query(&filter).await {
            Ok(found) => events.extend(found),
            Err(e) => warn!(error = %e, "Can't read from store"),
        }
    }

    Json(FilterReply {
        accepted: true,
        reason: String::new(),
        events,
    })
}

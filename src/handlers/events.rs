use axum::{Json, extract::State};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;
use crate::admission::Decision;
use crate::models::Event;
use crate::state::AppState;

// OK-style reply: accepted flag plus the reason shown to the client
#[derive(Debug, Serialize)]
pub struct EventReply {
    pub id: String,
    pub accepted: bool,
    pub reason: String,
}

pub async fn event_handler(
    State(state): State<Arc<AppState>>,
    Json(event): Json<Event>,
) -> Json<EventReply> {
    if let Decision::Reject { reason } = state.policy.check_event(&event) {
        return Json(EventReply {
            id: event.id,
            accepted: false,
            reason,
        });
    }

    for store in &state.stores {
        if let Err(e) = store.save(&event).await {
            warn!(id = %event.id, error = %e, "Can't store event");
            return Json(EventReply {
                id: event.id,
                accepted: false,
                reason: "error: could not store event".to_string(),
            });
        }
    }

    Json(EventReply {
        id: event.id,
        accepted: true,
        reason: String::new(),
    })
}

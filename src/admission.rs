use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::clock::Clock;
use crate::metrics::{EVENTS_ACCEPTED, EVENTS_REJECTED, FILTERS_REJECTED, RATE_LIMITED};
use crate::models::{Event, Filter, is_supported_kind};
use crate::rate_limit::RateLimiter;

/// Outcome of an admission check. A rejection is advisory: the protocol
/// layer decides how to report the reason to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Reject { reason: String },
}

impl Decision {
    fn reject(reason: impl Into<String>) -> Self {
        Decision::Reject {
            reason: reason.into(),
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Decision::Accept)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Decision::Accept => None,
            Decision::Reject { reason } => Some(reason),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryPurpose {
    Fetch,
    Count,
}

// Gate for inbound events and query filters
#[derive(Debug)]
pub struct AdmissionPolicy {
    acceptance_window: Duration,
    limiter: Arc<RateLimiter>,
    clock: Arc<dyn Clock>,
}

impl AdmissionPolicy {
    pub fn new(acceptance_window: Duration, limiter: Arc<RateLimiter>, clock: Arc<dyn Clock>) -> Self {
        Self {
            acceptance_window,
            limiter,
            clock,
        }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn check_filter(&self, filter: &Filter, purpose: QueryPurpose) -> Decision {
        let decision = filter_decision(filter, purpose);
        if let Decision::Reject { reason } = &decision {
            FILTERS_REJECTED.inc();
            debug!(reason = %reason, "Filter rejected");
        }
        decision
    }

    // Kind and time checks run before the limiter so bad events never use up quota
    pub fn check_event(&self, event: &Event) -> Decision {
        let decision = self.event_decision(event);
        match &decision {
            Decision::Accept => EVENTS_ACCEPTED.inc(),
            Decision::Reject { reason } => {
                EVENTS_REJECTED.inc();
                debug!(id = %event.id, pubkey = %event.pubkey, reason = %reason, "Event rejected");
            }
        }
        decision
    }

    fn event_decision(&self, event: &Event) -> Decision {
        if !is_supported_kind(event.kind) {
            return Decision::reject("blocked: only kind 24133 and 24135 are accepted");
        }

        if !self.in_time_window(event.created_at) {
            return Decision::reject(format!(
                "invalid: events must be created within {} of now",
                describe_window(self.acceptance_window)
            ));
        }

        if !self.limiter.allow(&event.pubkey) {
            RATE_LIMITED.inc();
            return Decision::reject("rate-limited: too many events, slow down");
        }

        Decision::Accept
    }

    fn in_time_window(&self, created_at: i64) -> bool {
        let now = self.clock.unix_now();
        // client supplied, may be anything
        created_at.abs_diff(now) <= self.acceptance_window.as_secs()
    }
}

fn filter_decision(filter: &Filter, purpose: QueryPurpose) -> Decision {
    if purpose == QueryPurpose::Count {
        return Decision::reject("blocked: count filters are not accepted");
    }

    if filter.kinds.is_empty() {
        return Decision::reject("blocked: please add kind 24133 or 24135");
    }

    if filter.authors.is_empty() && filter.tag("p").is_empty() {
        return Decision::reject("blocked: please add authors or #p");
    }

    if filter.kinds.iter().any(|&kind| !is_supported_kind(kind)) {
        return Decision::reject("blocked: only kind 24133 and 24135 are kept");
    }

    Decision::Accept
}

fn describe_window(window: Duration) -> String {
    let secs = window.as_secs();
    match secs {
        60 => "1 minute".to_string(),
        s if s % 60 == 0 => format!("{} minutes", s / 60),
        s => format!("{s} seconds"),
    }
}

use std::sync::Arc;
use crate::admission::AdmissionPolicy;
use crate::store::EventStore;

// app's shared state
#[derive(Clone)]
pub struct AppState {
    pub policy: Arc<AdmissionPolicy>,     // event/filter gate, owns the rate limiter
    pub stores: Vec<Arc<dyn EventStore>>, // accepted events are saved to all of them
}

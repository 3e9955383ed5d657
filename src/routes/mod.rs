pub mod api;

use std::sync::Arc;

use crate::auth::hash_token;
use crate::scheduler::Scheduler;

/// Shared state of the admin surface.
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    /// SHA-256 of the admin token; `None` leaves the API open.
    pub admin_token_hash: Option<Arc<str>>,
}

impl AppState {
    pub fn new(scheduler: Arc<Scheduler>, admin_token: Option<&str>) -> Self {
        Self {
            scheduler,
            admin_token_hash: admin_token
                .filter(|t| !t.is_empty())
                .map(|t| Arc::from(hash_token(t))),
        }
    }
}

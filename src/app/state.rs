//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::Tuning;
use crate::session::SessionManager;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionManager>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let sessions = Arc::new(SessionManager::new(Arc::new(Tuning::default())));

        Self {
            config: Arc::new(config),
            sessions,
        }
    }
}

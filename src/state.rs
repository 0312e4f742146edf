// src/state.rs
use std::sync::Arc;

use crate::identity::IdentityProvider;
use crate::polls::PollService;

#[derive(Clone)]
pub struct AppState {
    pub polls: Arc<PollService>,
    pub identity: Arc<dyn IdentityProvider>,
}

impl AppState {
    pub fn new(polls: PollService, identity: impl IdentityProvider + 'static) -> Self {
        Self {
            polls: Arc::new(polls),
            identity: Arc::new(identity),
        }
    }
}

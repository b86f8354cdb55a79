use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use tracing::{info, warn};

/// Value reported as `usuario_id` when nobody is logged in.
pub const NO_SESSION: u64 = 0;

pub type UserId = u64;

/// Logged-in user, shared by the router and the orchestrator.
///
/// The id is write-once: the first positive `set` wins and later calls are
/// ignored until `close` ends the session.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    user_id: Arc<AtomicU64>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, id: UserId) -> bool {
        if id == NO_SESSION {
            warn!(target = "studio.session", "ignoring zero user id");
            return false;
        }
        match self
            .user_id
            .compare_exchange(NO_SESSION, id, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                info!(target = "studio.session", user_id = id, "session_started");
                true
            }
            Err(existing) => {
                warn!(
                    target = "studio.session",
                    user_id = existing,
                    attempted = id,
                    "session_already_set_ignoring_overwrite"
                );
                false
            }
        }
    }

    pub fn get(&self) -> Option<UserId> {
        match self.user_id.load(Ordering::Acquire) {
            NO_SESSION => None,
            id => Some(id),
        }
    }

    pub fn id_or_sentinel(&self) -> u64 {
        self.get().unwrap_or_else(|| {
            warn!(target = "studio.session", "user id requested without a session");
            NO_SESSION
        })
    }

    pub fn is_logged_in(&self) -> bool {
        self.get().is_some()
    }

    pub fn close(&self) {
        let previous = self.user_id.swap(NO_SESSION, Ordering::AcqRel);
        if previous != NO_SESSION {
            info!(target = "studio.session", user_id = previous, "session_closed");
        }
    }
}

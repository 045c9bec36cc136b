//! Implements NotificationPermission from a configured flag.

use crate::domain::DomainError;
use crate::ports::NotificationPermission;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct StaticPermission {
    granted: AtomicBool,
}

impl StaticPermission {
    pub fn new(granted: bool) -> Self {
        Self {
            granted: AtomicBool::new(granted),
        }
    }

    pub fn set(&self, granted: bool) {
        self.granted.store(granted, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl NotificationPermission for StaticPermission {
    async fn is_authorized(&self) -> Result<bool, DomainError> {
        Ok(self.granted.load(Ordering::SeqCst))
    }
}

// Local application/instance identity, filled in asynchronously by registration.

use std::sync::atomic::{AtomicI32, Ordering};

/// Sentinel for "not registered yet".
const UNSET: i32 = 0;

#[derive(Debug)]
pub struct RegistrationState {
    application_id: AtomicI32,
    instance_id: AtomicI32,
}

impl Default for RegistrationState {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistrationState {
    pub fn new() -> Self {
        Self {
            application_id: AtomicI32::new(UNSET),
            instance_id: AtomicI32::new(UNSET),
        }
    }

    pub fn set_application_id(&self, id: i32) {
        self.application_id.store(id, Ordering::Release);
    }

    pub fn set_instance_id(&self, id: i32) {
        self.instance_id.store(id, Ordering::Release);
    }

    pub fn application_id(&self) -> Option<i32> {
        match self.application_id.load(Ordering::Acquire) {
            UNSET => None,
            id => Some(id),
        }
    }

    pub fn instance_id(&self) -> Option<i32> {
        match self.instance_id.load(Ordering::Acquire) {
            UNSET => None,
            id => Some(id),
        }
    }

    /// Both identities are set. Checked on every tick, never cached.
    pub fn is_registered(&self) -> bool {
        self.application_id().is_some() && self.instance_id().is_some()
    }
}

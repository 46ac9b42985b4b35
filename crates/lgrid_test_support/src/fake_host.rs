use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use lgrid_core::{GridError, HostShell, PolicyChecker};

/// Policy checker whose grants can change during a test. Records every
/// policy name it was asked about.
#[derive(Clone, Default)]
pub struct FakePolicy {
    granted: Arc<Mutex<HashSet<String>>>,
    checked: Arc<Mutex<Vec<String>>>,
}

impl FakePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn granting(policy: &str) -> Self {
        let fake = Self::default();
        fake.grant(policy);
        fake
    }

    pub fn grant(&self, policy: &str) {
        mutex_lock(&self.granted).insert(policy.to_string());
    }

    pub fn revoke(&self, policy: &str) {
        mutex_lock(&self.granted).remove(policy);
    }

    pub fn checked(&self) -> Vec<String> {
        mutex_lock(&self.checked).clone()
    }
}

#[async_trait]
impl PolicyChecker for FakePolicy {
    async fn is_in_policy(&self, policy: &str) -> bool {
        mutex_lock(&self.checked).push(policy.to_string());
        mutex_lock(&self.granted).contains(policy)
    }
}

/// Host shell that keeps what the grid showed to the user.
#[derive(Clone, Default)]
pub struct RecordingShell {
    errors: Arc<Mutex<Vec<String>>>,
    notices: Arc<Mutex<Vec<String>>>,
}

impl RecordingShell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> Vec<String> {
        mutex_lock(&self.errors).clone()
    }

    pub fn notices(&self) -> Vec<String> {
        mutex_lock(&self.notices).clone()
    }

    pub fn clear(&self) {
        mutex_lock(&self.errors).clear();
        mutex_lock(&self.notices).clear();
    }
}

impl HostShell for RecordingShell {
    fn show_error(&self, error: &GridError) {
        mutex_lock(&self.errors).push(error.to_string());
    }

    fn notify_success(&self, message: &str) {
        mutex_lock(&self.notices).push(message.to_string());
    }
}

fn mutex_lock<T>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poison_error) => poison_error.into_inner(),
    }
}

//! Capabilities the hosting application hands to a grid at construction.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::storage::{LocalStorage, MemoryStorage};
use crate::{GridError, HttpTransport};

/// Checks whether the current user holds a named policy.
#[async_trait]
pub trait PolicyChecker: Send + Sync {
    async fn is_in_policy(&self, policy: &str) -> bool;
}

/// Fixed set of granted policies.
#[derive(Debug, Clone, Default)]
pub struct StaticPolicies {
    granted: HashSet<String>,
}

impl StaticPolicies {
    pub fn new<I, S>(granted: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            granted: granted.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl PolicyChecker for StaticPolicies {
    async fn is_in_policy(&self, policy: &str) -> bool {
        self.granted.contains(policy)
    }
}

pub trait Translator: Send + Sync {
    fn translate(&self, key: &str) -> String;
}

/// Returns keys unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTranslator;

impl Translator for IdentityTranslator {
    fn translate(&self, key: &str) -> String {
        key.to_string()
    }
}

/// Error display and notifications of the host shell.
pub trait HostShell: Send + Sync {
    fn show_error(&self, error: &GridError);
    fn notify_success(&self, message: &str);
}

/// Shell that only writes to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogShell;

impl HostShell for LogShell {
    fn show_error(&self, error: &GridError) {
        log::error!("{}", error);
    }

    fn notify_success(&self, message: &str) {
        log::info!("{}", message);
    }
}

/// Everything a grid needs from its host.
#[derive(Clone)]
pub struct GridContext {
    pub storage: Arc<dyn LocalStorage>,
    pub policy: Arc<dyn PolicyChecker>,
    pub translator: Arc<dyn Translator>,
    pub shell: Arc<dyn HostShell>,
    /// Required when the grid talks to a remote controller.
    pub transport: Option<Arc<dyn HttpTransport>>,
}

impl GridContext {
    pub fn new(storage: Arc<dyn LocalStorage>) -> Self {
        Self {
            storage,
            policy: Arc::new(StaticPolicies::default()),
            translator: Arc::new(IdentityTranslator),
            shell: Arc::new(LogShell),
            transport: None,
        }
    }

    /// In-memory storage, no policies, log-only shell.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    pub fn with_policy(mut self, policy: Arc<dyn PolicyChecker>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = translator;
        self
    }

    pub fn with_shell(mut self, shell: Arc<dyn HostShell>) -> Self {
        self.shell = shell;
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn tr(&self, key: &str) -> String {
        self.translator.translate(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_policies_grant_listed_names() {
        let policies = StaticPolicies::new(["GridViewProfileAdmin"]);
        assert!(policies.is_in_policy("GridViewProfileAdmin").await);
        assert!(!policies.is_in_policy("Editor").await);
    }

    #[test]
    fn identity_translator_returns_key() {
        let context = GridContext::in_memory();
        assert_eq!(context.tr("Save"), "Save");
    }
}

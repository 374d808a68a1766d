use std::sync::{Arc, RwLock};

use crate::policy::policy::CollectionPolicy;
use crate::types::Operation;

/// Ordered, immutable set of collection policies.
///
/// Built once at startup; replaced wholesale through [`SharedRegistry`]
/// rather than mutated, so in-flight requests keep the snapshot they resolved.
#[derive(Debug, Default)]
pub struct PolicyRegistry {
    policies: Vec<CollectionPolicy>,
    default_connection: Option<String>,
}

impl PolicyRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// A registry that permits nothing
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every policy matching the request, in registration order
    pub fn resolve(&self, database: &str, collection: &str) -> Vec<&CollectionPolicy> {
        self.policies.iter().filter(|p| p.matches(database, collection)).collect()
    }

    pub fn is_allowed(&self, database: &str, collection: &str, operation: Operation) -> bool {
        crate::policy::gate::AuthorizationGate::is_allowed(&self.resolve(database, collection), operation)
    }

    pub fn default_connection(&self) -> Option<&str> {
        self.default_connection.as_deref()
    }

    /// Connection of the first resolved policy, else the registry default
    pub fn connection_for<'a>(&'a self, resolved: &[&'a CollectionPolicy]) -> Option<&'a str> {
        let policy: &'a CollectionPolicy = resolved.first().copied()?;
        policy.connection().or(self.default_connection())
    }

    pub fn policies(&self) -> &[CollectionPolicy] {
        &self.policies
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct RegistryBuilder {
    policies: Vec<CollectionPolicy>,
    default_connection: Option<String>,
}

impl RegistryBuilder {
    pub fn register(&mut self, policy: CollectionPolicy) -> &mut Self {
        tracing::debug!(
            "Registered policy for {} (allow={}, filters={}, shape={})",
            policy.binding(),
            policy.allowed(),
            policy.filters().len(),
            policy.shape().name()
        );
        self.policies.push(policy);
        self
    }

    pub fn with_default_connection(&mut self, connection: impl Into<String>) -> &mut Self {
        self.default_connection = Some(connection.into());
        self
    }

    pub fn build(self) -> PolicyRegistry {
        tracing::info!("Policy registry built with {} policies", self.policies.len());
        PolicyRegistry {
            policies: self.policies,
            default_connection: self.default_connection,
        }
    }
}

/// Registry handle shared across request handlers
#[derive(Debug, Clone)]
pub struct SharedRegistry {
    current: Arc<RwLock<Arc<PolicyRegistry>>>,
}

impl SharedRegistry {
    pub fn new(registry: PolicyRegistry) -> Self {
        Self { current: Arc::new(RwLock::new(Arc::new(registry))) }
    }

    /// The registry as of now; later swaps do not affect it
    pub fn snapshot(&self) -> Arc<PolicyRegistry> {
        let guard = self.current.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    /// Swap in a new registry, returning the previous one
    pub fn replace(&self, registry: PolicyRegistry) -> Arc<PolicyRegistry> {
        let mut guard = self.current.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        tracing::info!("Replacing policy registry ({} -> {} policies)", guard.len(), registry.len());
        std::mem::replace(&mut *guard, Arc::new(registry))
    }
}

impl From<PolicyRegistry> for SharedRegistry {
    fn from(registry: PolicyRegistry) -> Self {
        Self::new(registry)
    }
}

use thiserror::Error;

use crate::config::config;
use crate::policy::policy::CollectionPolicy;
use crate::types::Operation;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Operation '{operation}' is not permitted on {database}/{collection}")]
pub struct AuthorizationDenied {
    pub database: String,
    pub collection: String,
    pub operation: Operation,
}

/// Deny-by-default check over the resolved policies
pub struct AuthorizationGate;

impl AuthorizationGate {
    /// True when any resolved policy permits the operation
    pub fn is_allowed(policies: &[&CollectionPolicy], operation: Operation) -> bool {
        policies.iter().any(|p| p.allows(operation))
    }

    pub fn authorize(
        policies: &[&CollectionPolicy],
        database: &str,
        collection: &str,
        operation: Operation,
    ) -> Result<(), AuthorizationDenied> {
        if Self::is_allowed(policies, operation) {
            if config().security.enable_audit_logging {
                tracing::info!("Authorized {} on {}/{}", operation, database, collection);
            }
            return Ok(());
        }

        if policies.is_empty() {
            tracing::warn!("Denied {} on {}/{}: no policy registered", operation, database, collection);
        } else {
            tracing::warn!(
                "Denied {} on {}/{}: {} matching policies, none allow it",
                operation, database, collection, policies.len()
            );
        }

        Err(AuthorizationDenied {
            database: database.to_string(),
            collection: collection.to_string(),
            operation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_policies_means_denied() {
        let err = AuthorizationGate::authorize(&[], "demo", "todos", Operation::Read).unwrap_err();
        assert_eq!(err.operation, Operation::Read);
        assert_eq!(err.to_string(), "Operation 'read' is not permitted on demo/todos");
    }

    #[test]
    fn one_permitting_policy_is_enough() {
        let deny = CollectionPolicy::builder("demo", "todos").build().unwrap();
        let allow = CollectionPolicy::builder("*", "todos").allow([Operation::Delete]).build().unwrap();

        assert!(AuthorizationGate::authorize(&[&deny, &allow], "demo", "todos", Operation::Delete).is_ok());
        assert!(AuthorizationGate::authorize(&[&deny], "demo", "todos", Operation::Delete).is_err());
    }
}

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::intercept::error::InterceptError;

/// Ambient per-request data handed to every data filter and mutator.
///
/// Built once by the identity middleware (or by callers embedding the
/// gateway) and never read from thread or global state.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user: Option<String>,
    pub user_id: Option<Uuid>,
    pub request_id: Uuid,
    pub received_at: DateTime<Utc>,
}

impl RequestContext {
    pub fn anonymous() -> Self {
        Self {
            user: None,
            user_id: None,
            request_id: Uuid::new_v4(),
            received_at: Utc::now(),
        }
    }

    pub fn for_user(user: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            ..Self::anonymous()
        }
    }

    pub fn with_user_id(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// The current user name, or `MissingIdentity` for anonymous requests
    pub fn require_user(&self) -> Result<&str, InterceptError> {
        self.user
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or(InterceptError::MissingIdentity)
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::anonymous()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_context_has_no_identity() {
        let ctx = RequestContext::anonymous();
        assert!(!ctx.is_authenticated());
        assert!(matches!(ctx.require_user(), Err(InterceptError::MissingIdentity)));
    }

    #[test]
    fn empty_user_name_is_not_an_identity() {
        let ctx = RequestContext::for_user("");
        assert!(ctx.require_user().is_err());
        assert_eq!(RequestContext::for_user("alice").require_user().unwrap(), "alice");
    }
}

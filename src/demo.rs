// Built-in policies served when no policy file is given
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::policy::{CollectionPolicy, PolicyError, PolicyRegistry};

/// Typed model for `typed/todos`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Todo {
    #[serde(rename = "Title", default)]
    pub title: String,
    #[serde(rename = "Username", default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(rename = "CreatedDateUtc", default, skip_serializing_if = "Option::is_none")]
    pub created_date_utc: Option<DateTime<Utc>>,
}

pub const USER_FIELD: &str = "Username";

/// `demo/todos`: raw documents scoped to their owner.
/// `typed/todos`: the same, plus a creation stamp on the typed model.
pub fn demo_registry() -> Result<PolicyRegistry, PolicyError> {
    let untyped = CollectionPolicy::builder("demo", "todos")
        .allow_all()
        .with_user_filter(USER_FIELD)
        .build()?;

    let typed = CollectionPolicy::typed::<Todo>("typed", "todos")
        .allow_all()
        .with_user_filter(USER_FIELD)
        .before_add(|todo, ctx| {
            todo.created_date_utc = Some(ctx.received_at);
            Ok(())
        })
        .build()?;

    let mut builder = PolicyRegistry::builder();
    builder.register(untyped).register(typed);
    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Operation;

    #[test]
    fn demo_policies_allow_everything_on_their_bindings_only() {
        let registry = demo_registry().unwrap();
        for op in Operation::ALL {
            assert!(registry.is_allowed("demo", "todos", op));
            assert!(registry.is_allowed("typed", "todos", op));
            assert!(!registry.is_allowed("demo", "notes", op));
        }
    }

    #[test]
    fn typed_todo_ignores_unknown_fields() {
        let todo: Todo = serde_json::from_value(serde_json::json!({"Title": "x", "Priority": 3})).unwrap();
        assert_eq!(todo.title, "x");
        assert!(todo.created_date_utc.is_none());
    }
}

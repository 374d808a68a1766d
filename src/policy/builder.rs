use std::marker::PhantomData;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::document::Document;
use crate::filter::Query;
use crate::intercept::{DataFilter, InterceptError, OperationMutators, Raw, RequestContext, Shape};
use crate::policy::policy::{CollectionPolicy, OperationSet};
use crate::types::Operation;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Policy database and collection names must not be empty")]
    EmptyBinding,

    #[error("Policy for {binding} has an invalid connection '{connection}': {reason}")]
    InvalidConnection {
        binding: String,
        connection: String,
        reason: String,
    },

    #[error("Policy for {binding} registers an intercept on read; only add, update and delete carry a document")]
    InterceptOnRead { binding: String },
}

/// Fluent construction of a [`CollectionPolicy`].
///
/// `S` fixes what `before_*` mutators receive: [`Raw`] documents, or a typed
/// model via [`CollectionPolicy::typed`]. The `_raw` variants always see the
/// document and run before the shaped ones.
pub struct PolicyBuilder<S: Shape = Raw> {
    database: String,
    collection: String,
    allowed: OperationSet,
    filters: Vec<DataFilter>,
    raw: OperationMutators<Document>,
    shaped: OperationMutators<S::Target>,
    connection: Option<String>,
    intercepts_read: bool,
    _shape: PhantomData<S>,
}

impl<S: Shape> PolicyBuilder<S> {
    pub(crate) fn new(database: String, collection: String) -> Self {
        Self {
            database,
            collection,
            allowed: OperationSet::none(),
            filters: Vec::new(),
            raw: OperationMutators::new(),
            shaped: OperationMutators::new(),
            connection: None,
            intercepts_read: false,
            _shape: PhantomData,
        }
    }

    pub fn allow(mut self, operations: impl IntoIterator<Item = Operation>) -> Self {
        self.allowed = self.allowed.union(OperationSet::only(operations));
        self
    }

    pub fn allow_all(mut self) -> Self {
        self.allowed = OperationSet::Any;
        self
    }

    pub fn with_allowed(mut self, allowed: OperationSet) -> Self {
        self.allowed = self.allowed.union(allowed);
        self
    }

    /// Predicate ANDed into every read, update and delete query on this binding
    pub fn with_data_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&RequestContext) -> Result<Query, InterceptError> + Send + Sync + 'static,
    {
        self.filters.push(Arc::new(filter));
        self
    }

    pub fn with_static_filter(self, query: Query) -> Self {
        self.with_data_filter(move |_ctx| Ok(query.clone()))
    }

    /// Scope the collection to the caller: reads, updates and deletes only
    /// see documents whose `field` equals the user, and writes are stamped
    /// with it. Anonymous callers fail every operation.
    pub fn with_user_filter(self, field: impl Into<String>) -> Self {
        let field: Arc<str> = Arc::from(field.into());
        let filter_field = field.clone();

        self.with_data_filter(move |ctx| {
            let user = ctx.require_user()?;
            Ok(Query::eq(filter_field.as_ref(), Value::String(user.to_string())))
        })
        .before_raw(Operation::Add, stamp_user(field.clone()))
        .before_raw(Operation::Update, stamp_user(field))
        .before_raw(Operation::Delete, |_doc, ctx| ctx.require_user().map(|_| ()))
    }

    /// Write the request timestamp (RFC 3339, UTC) into `field`
    pub fn with_timestamp(self, operation: Operation, field: impl Into<String>) -> Self {
        let field = field.into();
        self.before_raw(operation, move |doc, ctx| {
            doc.insert(field.clone(), Value::String(ctx.received_at.to_rfc3339()));
            Ok(())
        })
    }

    pub fn before<F>(mut self, operation: Operation, mutator: F) -> Self
    where
        F: Fn(&mut S::Target, &RequestContext) -> Result<(), InterceptError> + Send + Sync + 'static,
    {
        if !self.shaped.push(operation, Arc::new(mutator)) {
            self.intercepts_read = true;
        }
        self
    }

    pub fn before_add<F>(self, mutator: F) -> Self
    where
        F: Fn(&mut S::Target, &RequestContext) -> Result<(), InterceptError> + Send + Sync + 'static,
    {
        self.before(Operation::Add, mutator)
    }

    pub fn before_update<F>(self, mutator: F) -> Self
    where
        F: Fn(&mut S::Target, &RequestContext) -> Result<(), InterceptError> + Send + Sync + 'static,
    {
        self.before(Operation::Update, mutator)
    }

    pub fn before_delete<F>(self, mutator: F) -> Self
    where
        F: Fn(&mut S::Target, &RequestContext) -> Result<(), InterceptError> + Send + Sync + 'static,
    {
        self.before(Operation::Delete, mutator)
    }

    pub fn before_raw<F>(mut self, operation: Operation, mutator: F) -> Self
    where
        F: Fn(&mut Document, &RequestContext) -> Result<(), InterceptError> + Send + Sync + 'static,
    {
        if !self.raw.push(operation, Arc::new(mutator)) {
            self.intercepts_read = true;
        }
        self
    }

    pub fn before_add_raw<F>(self, mutator: F) -> Self
    where
        F: Fn(&mut Document, &RequestContext) -> Result<(), InterceptError> + Send + Sync + 'static,
    {
        self.before_raw(Operation::Add, mutator)
    }

    pub fn before_update_raw<F>(self, mutator: F) -> Self
    where
        F: Fn(&mut Document, &RequestContext) -> Result<(), InterceptError> + Send + Sync + 'static,
    {
        self.before_raw(Operation::Update, mutator)
    }

    pub fn before_delete_raw<F>(self, mutator: F) -> Self
    where
        F: Fn(&mut Document, &RequestContext) -> Result<(), InterceptError> + Send + Sync + 'static,
    {
        self.before_raw(Operation::Delete, mutator)
    }

    pub fn with_connection(mut self, connection: impl Into<String>) -> Self {
        self.connection = Some(connection.into());
        self
    }

    pub fn build(self) -> Result<CollectionPolicy, PolicyError> {
        if self.database.trim().is_empty() || self.collection.trim().is_empty() {
            return Err(PolicyError::EmptyBinding);
        }

        if self.intercepts_read {
            return Err(PolicyError::InterceptOnRead {
                binding: format!("{}/{}", self.database, self.collection),
            });
        }

        if let Some(connection) = &self.connection {
            if let Err(e) = url::Url::parse(connection) {
                return Err(PolicyError::InvalidConnection {
                    binding: format!("{}/{}", self.database, self.collection),
                    connection: connection.clone(),
                    reason: e.to_string(),
                });
            }
        }

        let mut raw = self.raw;
        let shape = S::finish(&mut raw, self.shaped);

        Ok(CollectionPolicy {
            database: self.database,
            collection: self.collection,
            allowed: self.allowed,
            filters: self.filters,
            intercepts: raw,
            shape,
            connection: self.connection,
        })
    }
}

fn stamp_user(field: Arc<str>) -> impl Fn(&mut Document, &RequestContext) -> Result<(), InterceptError> + Send + Sync + 'static {
    move |doc, ctx| {
        let user = ctx.require_user()?;
        doc.insert(field.to_string(), Value::String(user.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::into_document;
    use crate::intercept::InterceptShape;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize)]
    struct Todo {
        #[serde(rename = "Title")]
        title: String,
        #[serde(rename = "Done", default)]
        done: bool,
    }

    #[test]
    fn allow_accumulates() {
        let policy = CollectionPolicy::builder("demo", "todos")
            .allow([Operation::Read])
            .allow([Operation::Add])
            .build()
            .unwrap();
        assert!(policy.allows(Operation::Read));
        assert!(policy.allows(Operation::Add));
        assert!(!policy.allows(Operation::Delete));
    }

    #[test]
    fn defaults_deny_everything() {
        let policy = CollectionPolicy::builder("demo", "todos").build().unwrap();
        assert!(Operation::ALL.iter().all(|op| !policy.allows(*op)));
        assert!(policy.filters().is_empty());
        assert!(matches!(policy.shape(), InterceptShape::Raw));
    }

    #[test]
    fn empty_binding_is_rejected() {
        assert!(matches!(CollectionPolicy::builder("", "todos").build(), Err(PolicyError::EmptyBinding)));
        assert!(matches!(CollectionPolicy::builder("demo", "  ").build(), Err(PolicyError::EmptyBinding)));
    }

    #[test]
    fn invalid_connection_is_rejected() {
        let err = CollectionPolicy::builder("demo", "todos").with_connection("not a url").build().unwrap_err();
        assert!(matches!(err, PolicyError::InvalidConnection { .. }));
    }

    #[test]
    fn intercept_on_read_is_rejected() {
        let err = CollectionPolicy::builder("demo", "todos")
            .allow_all()
            .before(Operation::Read, |_doc, _ctx| Ok(()))
            .build()
            .unwrap_err();
        assert!(matches!(err, PolicyError::InterceptOnRead { ref binding } if binding == "demo/todos"));

        let err = CollectionPolicy::typed::<Todo>("typed", "todos")
            .before_raw(Operation::Read, |_doc, _ctx| Ok(()))
            .build()
            .unwrap_err();
        assert!(matches!(err, PolicyError::InterceptOnRead { .. }));

        let err = CollectionPolicy::builder("demo", "todos")
            .with_timestamp(Operation::Read, "SeenAt")
            .build()
            .unwrap_err();
        assert!(matches!(err, PolicyError::InterceptOnRead { .. }));
    }

    #[test]
    fn user_filter_scopes_and_stamps() {
        let policy = CollectionPolicy::builder("demo", "todos").allow_all().with_user_filter("Username").build().unwrap();
        let ctx = RequestContext::for_user("alice");

        let filter = (policy.filters()[0])(&ctx).unwrap();
        assert_eq!(serde_json::to_value(&filter).unwrap(), json!({"Username": "alice"}));

        let mut doc = into_document(json!({"Title": "x", "Username": "mallory"})).unwrap();
        for mutator in policy.intercepts_for(Operation::Add) {
            mutator(&mut doc, &ctx).unwrap();
        }
        assert_eq!(doc.get("Username"), Some(&json!("alice")));
    }

    #[test]
    fn user_filter_rejects_anonymous_callers() {
        let policy = CollectionPolicy::builder("demo", "todos").allow_all().with_user_filter("Username").build().unwrap();
        let anonymous = RequestContext::anonymous();

        assert!(matches!((policy.filters()[0])(&anonymous), Err(InterceptError::MissingIdentity)));
        let mut doc = Document::new();
        let delete = &policy.intercepts_for(Operation::Delete)[0];
        assert!(matches!(delete(&mut doc, &anonymous), Err(InterceptError::MissingIdentity)));
    }

    #[test]
    fn typed_builder_produces_typed_shape_and_keeps_raw_mutators() {
        let policy = CollectionPolicy::typed::<Todo>("typed", "todos")
            .allow_all()
            .with_timestamp(Operation::Add, "CreatedDateUtc")
            .before_add(|todo, _ctx| {
                todo.done = false;
                Ok(())
            })
            .build()
            .unwrap();

        match policy.shape() {
            InterceptShape::Typed(chain) => {
                assert!(chain.type_name().ends_with("Todo"));
                assert!(chain.handles(Operation::Add));
                assert!(!chain.handles(Operation::Update));
            }
            InterceptShape::Raw => panic!("expected typed shape"),
        }
        assert_eq!(policy.intercepts_for(Operation::Add).len(), 1);
    }

    #[test]
    fn raw_builder_chains_shaped_after_raw() {
        let policy = CollectionPolicy::builder("demo", "notes")
            .before_add(|doc, _ctx| {
                let seen = doc.get("step").cloned().unwrap_or(Value::Null);
                doc.insert("after".into(), seen);
                Ok(())
            })
            .before_add_raw(|doc, _ctx| {
                doc.insert("step".into(), json!("raw"));
                Ok(())
            })
            .build()
            .unwrap();

        let mut doc = Document::new();
        for mutator in policy.intercepts_for(Operation::Add) {
            mutator(&mut doc, &RequestContext::anonymous()).unwrap();
        }
        assert_eq!(doc.get("after"), Some(&json!("raw")));
    }
}

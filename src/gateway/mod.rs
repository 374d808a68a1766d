// Orchestrates the four CRUD operations:
// resolve -> authorize -> parse -> intercept -> filter -> backend

pub mod error;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::config;
use crate::document::{identity, parse_document, strip_identity, Document, ID_FIELD};
use crate::filter::{FilterComposer, Query, SortSpec};
use crate::intercept::{InterceptError, InterceptPipeline, RequestContext};
use crate::policy::{AuthorizationGate, CollectionPolicy, PolicyRegistry, SharedRegistry};
use crate::storage::{BackendError, CollectionRef, FindOptions, StorageBackend};
use crate::types::Operation;

pub use error::GatewayError;

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Read parameters exactly as supplied by the client
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReadParams {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default)]
    pub skip: Option<String>,
    #[serde(default)]
    pub limit: Option<String>,
    #[serde(default, rename = "inlineCount", alias = "inline_count")]
    pub inline_count: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ReadResult {
    Documents(Vec<Document>),
    Counted { count: u64, data: Vec<Document> },
}

impl ReadResult {
    pub fn documents(&self) -> &[Document] {
        match self {
            ReadResult::Documents(data) | ReadResult::Counted { data, .. } => data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeleteResult {
    pub deleted: u64,
    pub query: Document,
}

#[derive(Debug, Clone)]
pub struct GatewayLimits {
    pub max_limit: Option<u64>,
    pub allow_empty_delete: bool,
    pub default_connection: Option<String>,
    pub timeout: Duration,
}

impl GatewayLimits {
    pub fn from_config() -> Self {
        let config = config();
        Self {
            max_limit: config.filter.max_limit,
            allow_empty_delete: config.filter.allow_empty_delete,
            default_connection: config.storage.default_connection.clone(),
            timeout: Duration::from_millis(config.storage.timeout_ms),
        }
    }
}

/// Policy-enforcing front for a storage backend
#[derive(Clone)]
pub struct Gateway {
    registry: SharedRegistry,
    backend: Arc<dyn StorageBackend>,
    limits: GatewayLimits,
}

impl Gateway {
    pub fn new(registry: impl Into<SharedRegistry>, backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            registry: registry.into(),
            backend,
            limits: GatewayLimits::from_config(),
        }
    }

    pub fn with_limits(mut self, limits: GatewayLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn limits(&self) -> &GatewayLimits {
        &self.limits
    }

    pub async fn read(
        &self,
        database: &str,
        collection: &str,
        params: ReadParams,
        ctx: &RequestContext,
    ) -> GatewayResult<ReadResult> {
        let op = Operation::Read;
        let registry = self.registry.snapshot();
        let policies = registry.resolve(database, collection);
        AuthorizationGate::authorize(&policies, database, collection, op)?;
        let target = self.target(&registry, &policies, database, collection)?;

        let query = Query::parse(params.query.as_deref().unwrap_or_default())?;
        let sort = SortSpec::parse(params.sort.as_deref().unwrap_or_default())?;
        let skip = parse_bound("skip", params.skip.as_deref())?;
        let limit = parse_bound("limit", params.limit.as_deref())?.map(|limit| match self.limits.max_limit {
            Some(max) => limit.min(max),
            None => limit,
        });

        let query = FilterComposer::apply_filters(&policies, query, ctx).map_err(GatewayError::intercept(op))?;
        let options = FindOptions { sort, skip, limit };

        let data = self.call(op, &target, self.backend.find(&target, &query, &options)).await?;
        tracing::info!("Read {} documents from {}", data.len(), target);

        if !params.inline_count {
            return Ok(ReadResult::Documents(data));
        }

        let count = self.call(op, &target, self.backend.count(&target, &query)).await?;
        Ok(ReadResult::Counted { count, data })
    }

    pub async fn add(&self, database: &str, collection: &str, body: &str, ctx: &RequestContext) -> GatewayResult<Document> {
        let op = Operation::Add;
        let registry = self.registry.snapshot();
        let policies = registry.resolve(database, collection);
        AuthorizationGate::authorize(&policies, database, collection, op)?;
        let target = self.target(&registry, &policies, database, collection)?;

        let mut document = parse_document(body)?;
        if strip_identity(&mut document).is_some() {
            tracing::debug!("Dropped client-supplied {} on add to {}", ID_FIELD, target);
        }

        let mut document = InterceptPipeline::apply(&policies, op, document, ctx).map_err(GatewayError::intercept(op))?;
        if strip_identity(&mut document).is_some() {
            tracing::warn!("Intercept on {} set {} during add; dropped", target, ID_FIELD);
        }

        let saved = self.call(op, &target, self.backend.save(&target, document)).await?;
        tracing::info!("Added document {} to {}", identity(&saved).cloned().unwrap_or_default(), target);
        Ok(saved)
    }

    pub async fn update(&self, database: &str, collection: &str, body: &str, ctx: &RequestContext) -> GatewayResult<Document> {
        let op = Operation::Update;
        let registry = self.registry.snapshot();
        let policies = registry.resolve(database, collection);
        AuthorizationGate::authorize(&policies, database, collection, op)?;
        let target = self.target(&registry, &policies, database, collection)?;

        let document = parse_document(body)?;
        let id = identity(&document)
            .cloned()
            .ok_or_else(|| GatewayError::malformed(format!("update requires an {} field", ID_FIELD)))?;

        let document = InterceptPipeline::apply(&policies, op, document, ctx).map_err(GatewayError::intercept(op))?;
        if identity(&document) != Some(&id) {
            return Err(GatewayError::InterceptFailure {
                operation: op,
                source: InterceptError::rejected(format!("intercepts must not change {}", ID_FIELD)),
            });
        }

        let query = FilterComposer::apply_filters(&policies, Query::eq(ID_FIELD, id.clone()), ctx)
            .map_err(GatewayError::intercept(op))?;

        let result = self.call(op, &target, self.backend.update_one(&target, &query, document.clone())).await?;
        if result.matched == 0 {
            // Hidden and missing records are indistinguishable to the caller
            return Err(GatewayError::NotFound(format!("No document with {} {} in {}", ID_FIELD, id, target)));
        }

        tracing::info!("Updated document {} in {} (modified={})", id, target, result.modified);
        Ok(document)
    }

    /// The filter comes from `query` when non-blank, otherwise from `body`
    pub async fn delete(
        &self,
        database: &str,
        collection: &str,
        query: Option<&str>,
        body: &str,
        ctx: &RequestContext,
    ) -> GatewayResult<DeleteResult> {
        let op = Operation::Delete;
        let registry = self.registry.snapshot();
        let policies = registry.resolve(database, collection);
        AuthorizationGate::authorize(&policies, database, collection, op)?;
        let target = self.target(&registry, &policies, database, collection)?;

        let source = match query.map(str::trim).filter(|q| !q.is_empty()) {
            Some(q) => q,
            None => body.trim(),
        };
        if source.is_empty() {
            return Err(GatewayError::malformed("delete requires a query parameter or a query body"));
        }

        let filter = parse_document(source)?;
        if filter.is_empty() && !self.limits.allow_empty_delete {
            return Err(GatewayError::malformed("delete with an empty query is disabled"));
        }

        let filter = InterceptPipeline::apply(&policies, op, filter, ctx).map_err(GatewayError::intercept(op))?;
        let composed = FilterComposer::apply_filters(&policies, Query::from_document(filter.clone())?, ctx)
            .map_err(GatewayError::intercept(op))?;

        let result = self.call(op, &target, self.backend.remove(&target, &composed)).await?;
        tracing::info!("Deleted {} documents from {}", result.matched, target);

        Ok(DeleteResult { deleted: result.matched, query: filter })
    }

    fn target(
        &self,
        registry: &PolicyRegistry,
        policies: &[&CollectionPolicy],
        database: &str,
        collection: &str,
    ) -> GatewayResult<CollectionRef> {
        if policies.is_empty() {
            return Err(GatewayError::ConfigurationMissing(format!("no policy for {}/{}", database, collection)));
        }

        let connection = registry
            .connection_for(policies)
            .or(self.limits.default_connection.as_deref())
            .ok_or_else(|| GatewayError::ConfigurationMissing(format!("no connection configured for {}/{}", database, collection)))?;

        if let Err(e) = url::Url::parse(connection) {
            tracing::error!("Connection for {}/{} is not a valid URL: {}", database, collection, e);
            return Err(GatewayError::ConfigurationMissing(format!("unusable connection for {}/{}", database, collection)));
        }

        Ok(CollectionRef::new(connection, database, collection))
    }

    async fn call<T, F>(&self, operation: Operation, target: &CollectionRef, call: F) -> GatewayResult<T>
    where
        F: Future<Output = Result<T, BackendError>>,
    {
        let start = Instant::now();
        let outcome = tokio::time::timeout(self.limits.timeout, call).await;

        match outcome {
            Ok(Ok(value)) => {
                tracing::debug!("Backend {} on {} took {:?}", operation, target, start.elapsed());
                Ok(value)
            }
            Ok(Err(e)) => {
                tracing::error!("Backend {} on {} failed: {}", operation, target, e);
                Err(GatewayError::BackendFailure(e))
            }
            Err(_) => {
                let ms = self.limits.timeout.as_millis() as u64;
                tracing::error!("Backend {} on {} timed out after {}ms", operation, target, ms);
                Err(GatewayError::BackendFailure(BackendError::Timeout(ms)))
            }
        }
    }
}

/// `skip`/`limit` text: blank or "null" is unset, non-positive is unset
fn parse_bound(name: &str, raw: Option<&str>) -> GatewayResult<Option<u64>> {
    let Some(text) = raw.map(str::trim) else {
        return Ok(None);
    };
    if text.is_empty() || text.eq_ignore_ascii_case("null") {
        return Ok(None);
    }

    let value: i64 = text
        .parse()
        .map_err(|_| GatewayError::malformed(format!("{} must be an integer, got '{}'", name, text)))?;

    Ok(u64::try_from(value).ok().filter(|v| *v > 0))
}

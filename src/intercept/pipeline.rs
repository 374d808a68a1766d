use std::time::Instant;

use crate::document::Document;
use crate::intercept::context::RequestContext;
use crate::intercept::error::InterceptError;
use crate::intercept::shape::InterceptShape;
use crate::intercept::traits::run_chain;
use crate::policy::CollectionPolicy;
use crate::types::Operation;

/// Applies every resolved policy's mutators for an operation, in registration order
pub struct InterceptPipeline;

impl InterceptPipeline {
    /// Each policy runs its raw mutators first, then branches once on its shape.
    /// The first failure aborts the pipeline; the caller must not persist.
    pub fn apply(
        policies: &[&CollectionPolicy],
        operation: Operation,
        mut document: Document,
        ctx: &RequestContext,
    ) -> Result<Document, InterceptError> {
        if !operation.is_write() {
            return Ok(document);
        }

        for policy in policies {
            let start = Instant::now();
            let raw = policy.intercepts_for(operation);

            run_chain(raw, &mut document, ctx).map_err(|e| {
                tracing::warn!("Intercept for {} on {} failed: {}", operation, policy.binding(), e);
                e
            })?;

            let typed = match policy.shape() {
                InterceptShape::Raw => false,
                InterceptShape::Typed(chain) if chain.handles(operation) => {
                    chain.apply(operation, &mut document, ctx).map_err(|e| {
                        tracing::warn!("Typed intercept ({}) for {} on {} failed: {}", chain.type_name(), operation, policy.binding(), e);
                        e
                    })?;
                    true
                }
                InterceptShape::Typed(_) => false,
            };

            if !raw.is_empty() || typed {
                tracing::debug!(
                    "Intercepts for {} on {} completed in {:?} (raw={}, typed={})",
                    operation, policy.binding(), start.elapsed(), raw.len(), typed
                );
            }
        }

        Ok(document)
    }
}

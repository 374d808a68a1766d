use crate::filter::Query;
use crate::intercept::{InterceptError, RequestContext};
use crate::policy::CollectionPolicy;

/// Layers policy data filters over a client query
pub struct FilterComposer;

impl FilterComposer {
    /// AND every resolved policy's filters (registration order) into `query`.
    ///
    /// The result matches a subset of what `query` matches; a filter that
    /// cannot be built fails the whole request.
    pub fn apply_filters(
        policies: &[&CollectionPolicy],
        query: Query,
        ctx: &RequestContext,
    ) -> Result<Query, InterceptError> {
        let mut composed = query;

        for policy in policies {
            for filter in policy.filters() {
                let predicate = filter(ctx).map_err(|e| {
                    tracing::warn!("Data filter on {} failed: {}", policy.binding(), e);
                    e
                })?;
                composed = composed.and(predicate);
            }
        }

        if crate::config::config().filter.debug_logging {
            tracing::debug!("Composed query: {}", composed);
        }

        Ok(composed)
    }
}

// Document interception: request context, mutator chains, raw/typed shapes
// and the pipeline that folds them over a document before persistence

pub mod context;
pub mod error;
pub mod pipeline;
pub mod shape;
pub mod traits;

pub use context::RequestContext;
pub use error::InterceptError;
pub use pipeline::InterceptPipeline;
pub use shape::{InterceptShape, Raw, Shape, Typed, TypedChain};
pub use traits::{DataFilter, DocumentMutator, Mutator, OperationMutators};

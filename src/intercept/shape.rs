// Raw vs typed document handling, chosen once per policy at registration
use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::document::Document;
use crate::intercept::context::RequestContext;
use crate::intercept::error::InterceptError;
use crate::intercept::traits::{run_chain, OperationMutators};
use crate::types::Operation;

/// Compile-time selector for the value a policy's mutators operate on
pub trait Shape: Send + Sync + 'static {
    type Target: Send + 'static;

    /// Fold the shaped mutators into the policy's final intercept shape
    fn finish(raw: &mut OperationMutators<Document>, shaped: OperationMutators<Self::Target>) -> InterceptShape;
}

/// Mutators see the document exactly as submitted
pub struct Raw;

impl Shape for Raw {
    type Target = Document;

    fn finish(raw: &mut OperationMutators<Document>, shaped: OperationMutators<Document>) -> InterceptShape {
        raw.append(shaped);
        InterceptShape::Raw
    }
}

/// Mutators see the document deserialized into `T`
pub struct Typed<T>(PhantomData<fn() -> T>);

impl<T> Shape for Typed<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    type Target = T;

    fn finish(_raw: &mut OperationMutators<Document>, shaped: OperationMutators<T>) -> InterceptShape {
        InterceptShape::Typed(Arc::new(TypedMutators { mutators: shaped }))
    }
}

/// Type-erased typed mutator chain
pub trait TypedChain: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn handles(&self, operation: Operation) -> bool;

    fn apply(&self, operation: Operation, document: &mut Document, ctx: &RequestContext) -> Result<(), InterceptError>;
}

#[derive(Clone)]
pub enum InterceptShape {
    Raw,
    Typed(Arc<dyn TypedChain>),
}

impl InterceptShape {
    pub fn name(&self) -> &'static str {
        match self {
            InterceptShape::Raw => "raw",
            InterceptShape::Typed(chain) => chain.type_name(),
        }
    }
}

impl fmt::Debug for InterceptShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterceptShape::Raw => f.write_str("Raw"),
            InterceptShape::Typed(chain) => f.debug_tuple("Typed").field(&chain.type_name()).finish(),
        }
    }
}

struct TypedMutators<T> {
    mutators: OperationMutators<T>,
}

impl<T> TypedChain for TypedMutators<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn handles(&self, operation: Operation) -> bool {
        !self.mutators.for_operation(operation).is_empty()
    }

    /// One deserialize, the whole chain, one serialize. Only fields whose
    /// value changed are written back, so fields `T` does not model (or would
    /// coerce) keep their submitted value.
    fn apply(&self, operation: Operation, document: &mut Document, ctx: &RequestContext) -> Result<(), InterceptError> {
        let chain = self.mutators.for_operation(operation);
        if chain.is_empty() {
            return Ok(());
        }

        let mut typed: T = serde_json::from_value(Value::Object(document.clone())).map_err(shape_error::<T>)?;
        let baseline = to_document(&typed)?;

        run_chain(chain, &mut typed, ctx)?;

        let updated = to_document(&typed)?;
        write_back(document, &baseline, updated);
        Ok(())
    }
}

fn shape_error<T>(source: serde_json::Error) -> InterceptError {
    InterceptError::Shape { type_name: type_name::<T>(), source }
}

fn to_document<T: Serialize>(value: &T) -> Result<Document, InterceptError> {
    match serde_json::to_value(value).map_err(shape_error::<T>)? {
        Value::Object(map) => Ok(map),
        _ => Err(shape_error::<T>(<serde_json::Error as serde::ser::Error>::custom(
            "typed shape must serialize to an object",
        ))),
    }
}

fn write_back(document: &mut Document, baseline: &Document, updated: Document) {
    for key in baseline.keys() {
        if !updated.contains_key(key) {
            document.remove(key);
        }
    }
    for (key, value) in updated {
        if baseline.get(&key) != Some(&value) {
            document.insert(key, value);
        }
    }
}

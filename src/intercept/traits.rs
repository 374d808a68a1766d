use std::sync::Arc;

use crate::document::Document;
use crate::filter::Query;
use crate::intercept::context::RequestContext;
use crate::intercept::error::InterceptError;
use crate::types::Operation;

/// A pre-persistence hook that edits one document in place
pub type Mutator<T> = Arc<dyn Fn(&mut T, &RequestContext) -> Result<(), InterceptError> + Send + Sync>;

/// Mutator over the raw document form
pub type DocumentMutator = Mutator<Document>;

/// Produces the predicate a policy ANDs into every query it governs
pub type DataFilter = Arc<dyn Fn(&RequestContext) -> Result<Query, InterceptError> + Send + Sync>;

/// Mutators for one policy, kept in registration order per write operation
pub struct OperationMutators<T> {
    add: Vec<Mutator<T>>,
    update: Vec<Mutator<T>>,
    delete: Vec<Mutator<T>>,
}

impl<T> OperationMutators<T> {
    pub fn new() -> Self {
        Self { add: Vec::new(), update: Vec::new(), delete: Vec::new() }
    }

    /// Returns false for read, which carries no document to mutate
    pub fn push(&mut self, operation: Operation, mutator: Mutator<T>) -> bool {
        let chain = match operation {
            Operation::Add => &mut self.add,
            Operation::Update => &mut self.update,
            Operation::Delete => &mut self.delete,
            Operation::Read => return false,
        };
        chain.push(mutator);
        true
    }

    pub fn for_operation(&self, operation: Operation) -> &[Mutator<T>] {
        match operation {
            Operation::Add => &self.add,
            Operation::Update => &self.update,
            Operation::Delete => &self.delete,
            Operation::Read => &[],
        }
    }

    pub fn append(&mut self, other: OperationMutators<T>) {
        self.add.extend(other.add);
        self.update.extend(other.update);
        self.delete.extend(other.delete);
    }

    pub fn len(&self) -> usize {
        self.add.len() + self.update.len() + self.delete.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for OperationMutators<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Run a chain of mutators against one value, stopping at the first failure
pub fn run_chain<T>(chain: &[Mutator<T>], target: &mut T, ctx: &RequestContext) -> Result<(), InterceptError> {
    chain.iter().try_for_each(|mutator| mutator(target, ctx))
}

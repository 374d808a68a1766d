use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::document::Document;
use crate::intercept::{DataFilter, DocumentMutator, InterceptShape, OperationMutators, Raw, Typed};
use crate::policy::builder::PolicyBuilder;
use crate::types::{Operation, UnknownOperation};

/// Matches any database or collection name, or any operation in an allow-list
pub const WILDCARD: &str = "*";

/// Operations a policy permits
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationSet {
    Any,
    Only(Vec<Operation>),
}

impl OperationSet {
    pub fn none() -> Self {
        OperationSet::Only(Vec::new())
    }

    pub fn only(operations: impl IntoIterator<Item = Operation>) -> Self {
        let mut ops: Vec<Operation> = Vec::new();
        for op in operations {
            if !ops.contains(&op) {
                ops.push(op);
            }
        }
        OperationSet::Only(ops)
    }

    /// Parse configured names; `*` anywhere grants everything
    pub fn parse<I, S>(names: I) -> Result<Self, UnknownOperation>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ops = Vec::new();
        for name in names {
            let name = name.as_ref();
            if name.trim() == WILDCARD {
                return Ok(OperationSet::Any);
            }
            ops.push(name.parse::<Operation>()?);
        }
        Ok(Self::only(ops))
    }

    pub fn contains(&self, operation: Operation) -> bool {
        match self {
            OperationSet::Any => true,
            OperationSet::Only(ops) => ops.contains(&operation),
        }
    }

    pub fn union(self, other: OperationSet) -> Self {
        match (self, other) {
            (OperationSet::Any, _) | (_, OperationSet::Any) => OperationSet::Any,
            (OperationSet::Only(mut a), OperationSet::Only(b)) => {
                a.extend(b);
                Self::only(a)
            }
        }
    }
}

impl fmt::Display for OperationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationSet::Any => f.write_str(WILDCARD),
            OperationSet::Only(ops) if ops.is_empty() => f.write_str("(none)"),
            OperationSet::Only(ops) => {
                let names: Vec<&str> = ops.iter().map(Operation::as_str).collect();
                f.write_str(&names.join(","))
            }
        }
    }
}

/// Authorization, filtering and interception rules for one (database, collection) binding.
///
/// Built once through [`PolicyBuilder`] and immutable afterwards.
pub struct CollectionPolicy {
    pub(crate) database: String,
    pub(crate) collection: String,
    pub(crate) allowed: OperationSet,
    pub(crate) filters: Vec<DataFilter>,
    pub(crate) intercepts: OperationMutators<Document>,
    pub(crate) shape: InterceptShape,
    pub(crate) connection: Option<String>,
}

impl CollectionPolicy {
    /// Policy whose mutators operate on raw documents
    pub fn builder(database: impl Into<String>, collection: impl Into<String>) -> PolicyBuilder<Raw> {
        PolicyBuilder::new(database.into(), collection.into())
    }

    /// Policy whose mutators operate on documents deserialized into `T`
    pub fn typed<T>(database: impl Into<String>, collection: impl Into<String>) -> PolicyBuilder<Typed<T>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
    {
        PolicyBuilder::new(database.into(), collection.into())
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn allowed(&self) -> &OperationSet {
        &self.allowed
    }

    pub fn filters(&self) -> &[DataFilter] {
        &self.filters
    }

    pub fn intercepts_for(&self, operation: Operation) -> &[DocumentMutator] {
        self.intercepts.for_operation(operation)
    }

    pub fn shape(&self) -> &InterceptShape {
        &self.shape
    }

    pub fn connection(&self) -> Option<&str> {
        self.connection.as_deref()
    }

    /// "database/collection" as configured, wildcards included
    pub fn binding(&self) -> String {
        format!("{}/{}", self.database, self.collection)
    }

    pub fn matches(&self, database: &str, collection: &str) -> bool {
        (self.collection == WILDCARD || self.collection == collection)
            && (self.database == WILDCARD || self.database == database)
    }

    pub fn allows(&self, operation: Operation) -> bool {
        self.allowed.contains(operation)
    }
}

impl fmt::Debug for CollectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionPolicy")
            .field("database", &self.database)
            .field("collection", &self.collection)
            .field("allowed", &self.allowed)
            .field("filters", &self.filters.len())
            .field("intercepts", &self.intercepts.len())
            .field("shape", &self.shape)
            .field("connection", &self.connection)
            .finish()
    }
}

use serde::{Serialize, Serializer};
use serde_json::{json, Value};

use super::error::FilterError;
use super::filter_where::FilterWhere;
use super::types::{Condition, FilterOp, FilterWhereInfo};
use crate::document::{into_document, Document};

/// A validated query document.
///
/// Queries are only ever combined through [`Query::and`], so anything layered
/// on top of a client query can narrow what it matches but never widen it.
#[derive(Debug, Clone, Default)]
pub struct Query {
    document: Document,
    conditions: Vec<Condition>,
}

impl Query {
    /// The match-all query `{}`
    pub fn all() -> Self {
        Self::default()
    }

    /// Parse client query text; blank text is the match-all query
    pub fn parse(text: &str) -> Result<Self, FilterError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(Self::all());
        }
        let value: Value = serde_json::from_str(trimmed)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, FilterError> {
        let document = into_document(value).map_err(|e| FilterError::InvalidWhereClause(e.to_string()))?;
        Self::from_document(document)
    }

    pub fn from_document(document: Document) -> Result<Self, FilterError> {
        let max_depth = crate::config::config().filter.max_nested_depth;
        let conditions = FilterWhere::parse(&document, max_depth)?;
        Ok(Self { document, conditions })
    }

    /// `{field: value}`; object values are wrapped in `$eq` so they stay literal
    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        let field = field.into();
        let mut document = Document::new();
        let stored = if value.is_object() { json!({ "$eq": value.clone() }) } else { value.clone() };
        document.insert(field.clone(), stored);
        let conditions = vec![Condition::Field(FilterWhereInfo { column: field, operator: FilterOp::Eq, data: value })];
        Self { document, conditions }
    }

    pub fn is_empty(&self) -> bool {
        self.document.is_empty()
    }

    pub fn as_document(&self) -> &Document {
        &self.document
    }

    pub fn into_document(self) -> Document {
        self.document
    }

    /// Conjunction of both queries; the empty query is the identity
    pub fn and(self, other: Query) -> Query {
        if other.is_empty() {
            return self;
        }
        if self.is_empty() {
            return other;
        }
        let mut clauses = self.conjuncts();
        clauses.extend(other.conjuncts());
        let mut conditions = self.conditions;
        conditions.extend(other.conditions);
        let mut document = Document::new();
        document.insert("$and".to_string(), Value::Array(clauses));
        Query { document, conditions }
    }

    /// Does the document satisfy every condition of this query?
    pub fn matches(&self, document: &Document) -> bool {
        FilterWhere::evaluate(&self.conditions, document)
    }

    // A query that is exactly `{ "$and": [...] }` contributes its entries directly
    fn conjuncts(&self) -> Vec<Value> {
        if self.document.len() == 1 {
            if let Some(Value::Array(items)) = self.document.get("$and") {
                return items.clone();
            }
        }
        vec![Value::Object(self.document.clone())]
    }
}

impl Serialize for Query {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.document.serialize(serializer)
    }
}

impl PartialEq for Query {
    fn eq(&self, other: &Self) -> bool {
        self.document == other.document
    }
}

impl From<Query> for Value {
    fn from(query: Query) -> Self {
        Value::Object(query.document)
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", json!(self.document))
    }
}

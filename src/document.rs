// Documents are plain JSON objects; field order is preserved end to end
use serde_json::{Map, Value};
use thiserror::Error;

/// A schema-less document as stored by the backend
pub type Document = Map<String, Value>;

/// Field carrying the backend-assigned identity of a document
pub const ID_FIELD: &str = "_id";

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Document body is empty")]
    Empty,

    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Expected a JSON object, found {0}")]
    NotAnObject(&'static str),
}

/// Parse client-supplied JSON text into a document
pub fn parse_document(text: &str) -> Result<Document, DocumentError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(DocumentError::Empty);
    }
    let value: Value = serde_json::from_str(trimmed)?;
    into_document(value)
}

pub fn into_document(value: Value) -> Result<Document, DocumentError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(DocumentError::NotAnObject(kind_of(&other))),
    }
}

/// Remove the identity field, returning whatever the client supplied
pub fn strip_identity(document: &mut Document) -> Option<Value> {
    document.remove(ID_FIELD)
}

pub fn identity(document: &Document) -> Option<&Value> {
    document.get(ID_FIELD).filter(|v| !v.is_null())
}

/// Resolve a dotted path ("address.city") against a document
pub fn get_path<'a>(document: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut current = document.get(first)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

pub fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

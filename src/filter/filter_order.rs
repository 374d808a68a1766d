use std::cmp::Ordering;

use serde_json::Value;

use super::error::FilterError;
use super::types::{FilterOrderInfo, SortDirection};
use crate::document::{get_path, Document};

/// Ordered list of sort keys; empty means "no ordering"
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortSpec(Vec<FilterOrderInfo>);

impl SortSpec {
    pub fn none() -> Self {
        Self(Vec::new())
    }

    pub fn keys(&self) -> &[FilterOrderInfo] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse client sort text; blank text means no ordering
    pub fn parse(text: &str) -> Result<Self, FilterError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(Self::none());
        }
        let value: Value = serde_json::from_str(trimmed)?;
        FilterOrder::validate_and_parse(&value).map(Self)
    }

    /// Stable sort of documents by every key in order
    pub fn sort(&self, documents: &mut [Document]) {
        if self.0.is_empty() {
            return;
        }
        documents.sort_by(|a, b| self.compare(a, b));
    }

    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        for info in &self.0 {
            let ordering = total_compare(get_path(a, &info.column), get_path(b, &info.column));
            let ordering = match info.sort {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

pub struct FilterOrder;

impl FilterOrder {
    pub fn validate_and_parse(order: &Value) -> Result<Vec<FilterOrderInfo>, FilterError> {
        match order {
            Value::Null => Ok(vec![]),
            Value::String(s) => Self::parse_order_string(s),
            Value::Array(arr) => {
                // Expect array of strings like ["created desc", "name asc"]
                let mut out = Vec::new();
                for v in arr {
                    match v {
                        Value::String(s) => out.extend(Self::parse_order_string(s)?),
                        other => return Err(FilterError::InvalidSort(format!("unexpected sort entry {}", other))),
                    }
                }
                Ok(out)
            }
            Value::Object(obj) => {
                // { "created": -1, "name": "asc" }
                let mut out = Vec::with_capacity(obj.len());
                for (k, v) in obj {
                    out.push(FilterOrderInfo { column: k.clone(), sort: Self::parse_direction(k, v)? });
                }
                Ok(out)
            }
            other => Err(FilterError::InvalidSort(format!("sort must be an object, string or array, found {}", other))),
        }
    }

    fn parse_direction(column: &str, value: &Value) -> Result<SortDirection, FilterError> {
        match value {
            // 1 and 1.0 are the same direction
            Value::Number(n) => match n.as_f64() {
                Some(d) if d == 1.0 => Ok(SortDirection::Asc),
                Some(d) if d == -1.0 => Ok(SortDirection::Desc),
                _ => Err(FilterError::InvalidSort(format!("direction for '{}' must be 1 or -1", column))),
            },
            Value::String(s) if s.eq_ignore_ascii_case("asc") => Ok(SortDirection::Asc),
            Value::String(s) if s.eq_ignore_ascii_case("desc") => Ok(SortDirection::Desc),
            _ => Err(FilterError::InvalidSort(format!("direction for '{}' must be 1, -1, \"asc\" or \"desc\"", column))),
        }
    }

    fn parse_order_string(s: &str) -> Result<Vec<FilterOrderInfo>, FilterError> {
        // split on commas, then each token into column and direction
        let mut out = Vec::new();
        for part in s.split(',') {
            let trimmed = part.trim();
            if trimmed.is_empty() { continue; }
            let mut it = trimmed.split_whitespace();
            if let Some(col) = it.next() {
                let dir = it.next().unwrap_or("asc");
                let sort = if dir.eq_ignore_ascii_case("desc") { SortDirection::Desc } else { SortDirection::Asc };
                out.push(FilterOrderInfo { column: col.to_string(), sort });
            }
        }
        Ok(out)
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

/// Ordering between two values of the same kind; `None` across kinds
pub fn partial_compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// Total order used for sorting: null < bool < number < string < array < object
pub fn total_compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let (ra, rb) = (type_rank(a), type_rank(b));
    if ra != rb {
        return ra.cmp(&rb);
    }
    match (a, b) {
        (Some(Value::Array(x)), Some(Value::Array(y))) => {
            for (l, r) in x.iter().zip(y) {
                let o = total_compare(Some(l), Some(r));
                if o != Ordering::Equal {
                    return o;
                }
            }
            x.len().cmp(&y.len())
        }
        (Some(Value::Object(x)), Some(Value::Object(y))) => x.len().cmp(&y.len()),
        (Some(x), Some(y)) => partial_compare(x, y).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    }
}

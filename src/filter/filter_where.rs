use std::cmp::Ordering;

use serde_json::{Map, Value};

use super::error::FilterError;
use super::filter_order::partial_compare;
use super::types::{Condition, FilterOp, FilterWhereInfo};
use crate::document::{get_path, Document};

/// Parses query documents into a condition tree and evaluates it against documents
pub struct FilterWhere {
    max_depth: u32,
}

impl FilterWhere {
    pub fn new(max_depth: u32) -> Self {
        Self { max_depth }
    }

    pub fn parse(where_data: &Map<String, Value>, max_depth: u32) -> Result<Vec<Condition>, FilterError> {
        Self::new(max_depth).parse_clause(where_data, 0)
    }

    fn parse_clause(&self, obj: &Map<String, Value>, depth: u32) -> Result<Vec<Condition>, FilterError> {
        if depth > self.max_depth {
            return Err(FilterError::TooDeep { depth, max_depth: self.max_depth });
        }
        let mut conditions = Vec::with_capacity(obj.len());
        for (key, value) in obj {
            if key.starts_with('$') {
                conditions.push(self.parse_logical_operator(key, value, depth)?);
            } else {
                self.parse_field_condition(key, value, &mut conditions)?;
            }
        }
        Ok(conditions)
    }

    fn parse_logical_operator(&self, op: &str, value: &Value, depth: u32) -> Result<Condition, FilterError> {
        match op {
            "$and" | "$or" | "$nor" => {
                let arr = value
                    .as_array()
                    .ok_or_else(|| FilterError::InvalidOperatorData(format!("{} requires array", op)))?;
                if arr.is_empty() {
                    return Err(FilterError::InvalidOperatorData(format!("{} requires a non-empty array", op)));
                }
                let mut clauses = Vec::with_capacity(arr.len());
                for v in arr {
                    let sub = v
                        .as_object()
                        .ok_or_else(|| FilterError::InvalidOperatorData(format!("{} entries must be objects", op)))?;
                    clauses.push(self.parse_clause(sub, depth + 1)?);
                }
                let operator = match op {
                    "$and" => FilterOp::And,
                    "$or" => FilterOp::Or,
                    _ => FilterOp::NOr,
                };
                Ok(Condition::Logical { operator, clauses })
            }
            "$not" => {
                let sub = value
                    .as_object()
                    .ok_or_else(|| FilterError::InvalidOperatorData("$not requires an object".to_string()))?;
                Ok(Condition::Logical { operator: FilterOp::Not, clauses: vec![self.parse_clause(sub, depth + 1)?] })
            }
            _ => Err(FilterError::UnsupportedOperator(op.to_string())),
        }
    }

    fn parse_field_condition(&self, field: &str, value: &Value, out: &mut Vec<Condition>) -> Result<(), FilterError> {
        if field.is_empty() {
            return Err(FilterError::InvalidWhereClause("Field name cannot be empty".to_string()));
        }
        match value {
            Value::Object(obj) if obj.keys().next().map_or(false, |k| k.starts_with('$')) => {
                for (op_key, op_val) in obj {
                    if !op_key.starts_with('$') {
                        return Err(FilterError::InvalidWhereClause(format!(
                            "Cannot mix operators and fields in condition for '{}'",
                            field
                        )));
                    }
                    let operator = Self::map_operator(op_key)?;
                    Self::validate_operator_data(operator, op_val)?;
                    out.push(Condition::Field(FilterWhereInfo { column: field.to_string(), operator, data: op_val.clone() }));
                }
            }
            _ => {
                // Implicit equality: { field: value }
                out.push(Condition::Field(FilterWhereInfo { column: field.to_string(), operator: FilterOp::Eq, data: value.clone() }));
            }
        }
        Ok(())
    }

    fn map_operator(op_key: &str) -> Result<FilterOp, FilterError> {
        Ok(match op_key {
            "$eq" => FilterOp::Eq,
            "$ne" | "$neq" => FilterOp::Ne,
            "$gt" => FilterOp::Gt,
            "$gte" => FilterOp::Gte,
            "$lt" => FilterOp::Lt,
            "$lte" => FilterOp::Lte,
            "$in" => FilterOp::In,
            "$nin" => FilterOp::NIn,
            "$between" => FilterOp::Between,
            "$any" => FilterOp::Any,
            "$all" => FilterOp::All,
            "$size" => FilterOp::Size,
            "$exists" => FilterOp::Exists,
            other => return Err(FilterError::UnsupportedOperator(other.to_string())),
        })
    }

    fn validate_operator_data(operator: FilterOp, data: &Value) -> Result<(), FilterError> {
        match operator {
            FilterOp::In | FilterOp::NIn | FilterOp::Any | FilterOp::All if !data.is_array() => Err(
                FilterError::InvalidOperatorData(format!("{:?} requires an array", operator)),
            ),
            FilterOp::Between => match data.as_array() {
                Some(values) if values.len() == 2 => Ok(()),
                _ => Err(FilterError::InvalidOperatorData("$between requires array with 2 values".to_string())),
            },
            FilterOp::Size if data.as_u64().is_none() => {
                Err(FilterError::InvalidOperatorData("$size requires a non-negative integer".to_string()))
            }
            FilterOp::Exists if !data.is_boolean() => {
                Err(FilterError::InvalidOperatorData("$exists requires a boolean".to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Every condition in the clause must hold
    pub fn evaluate(conditions: &[Condition], document: &Document) -> bool {
        conditions.iter().all(|c| Self::evaluate_condition(c, document))
    }

    fn evaluate_condition(condition: &Condition, document: &Document) -> bool {
        match condition {
            Condition::Field(info) => Self::evaluate_field(info, get_path(document, &info.column)),
            Condition::Logical { operator, clauses } => match operator {
                FilterOp::And => clauses.iter().all(|c| Self::evaluate(c, document)),
                FilterOp::Or => clauses.iter().any(|c| Self::evaluate(c, document)),
                FilterOp::NOr => !clauses.iter().any(|c| Self::evaluate(c, document)),
                FilterOp::Not => !clauses.iter().all(|c| Self::evaluate(c, document)),
                _ => false,
            },
        }
    }

    fn evaluate_field(info: &FilterWhereInfo, actual: Option<&Value>) -> bool {
        let data = &info.data;
        match info.operator {
            FilterOp::Eq => matches_eq(actual, data),
            FilterOp::Ne => !matches_eq(actual, data),
            FilterOp::Gt => matches_ordering(actual, data, |o| o == Ordering::Greater),
            FilterOp::Gte => matches_ordering(actual, data, |o| o != Ordering::Less),
            FilterOp::Lt => matches_ordering(actual, data, |o| o == Ordering::Less),
            FilterOp::Lte => matches_ordering(actual, data, |o| o != Ordering::Greater),
            FilterOp::In => as_slice(data).iter().any(|v| matches_eq(actual, v)),
            FilterOp::NIn => !as_slice(data).iter().any(|v| matches_eq(actual, v)),
            FilterOp::Between => {
                let bounds = as_slice(data);
                bounds.len() == 2
                    && matches_ordering(actual, &bounds[0], |o| o != Ordering::Less)
                    && matches_ordering(actual, &bounds[1], |o| o != Ordering::Greater)
            }
            FilterOp::Any => match actual {
                Some(Value::Array(items)) => as_slice(data).iter().any(|v| items.iter().any(|i| values_equal(i, v))),
                _ => false,
            },
            FilterOp::All => match actual {
                Some(Value::Array(items)) => as_slice(data).iter().all(|v| items.iter().any(|i| values_equal(i, v))),
                _ => false,
            },
            FilterOp::Size => match (actual, data.as_u64()) {
                (Some(Value::Array(items)), Some(n)) => items.len() as u64 == n,
                _ => false,
            },
            FilterOp::Exists => {
                let present = actual.is_some();
                data.as_bool().map_or(false, |want| want == present)
            }
            _ => false,
        }
    }
}

fn as_slice(value: &Value) -> &[Value] {
    value.as_array().map(Vec::as_slice).unwrap_or(&[])
}

/// Equality with document-store semantics: null matches a missing field and
/// a scalar matches an array field that contains it
fn matches_eq(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        None => expected.is_null(),
        Some(value) if values_equal(value, expected) => true,
        Some(Value::Array(items)) if !expected.is_array() => items.iter().any(|i| values_equal(i, expected)),
        _ => false,
    }
}

fn matches_ordering(actual: Option<&Value>, bound: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    match actual {
        Some(Value::Array(items)) => items.iter().any(|i| partial_compare(i, bound).map_or(false, &accept)),
        Some(value) => partial_compare(value, bound).map_or(false, accept),
        None => false,
    }
}

/// Numbers compare by value so that 1 and 1.0 are equal
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(x), Value::Array(y)) => x.len() == y.len() && x.iter().zip(y).all(|(l, r)| values_equal(l, r)),
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len() && x.iter().all(|(k, v)| y.get(k).map_or(false, |w| values_equal(v, w)))
        }
        _ => a == b,
    }
}

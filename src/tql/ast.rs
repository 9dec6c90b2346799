//! TQL query structures
//!
//! A query targets one thread kind and ANDs its conditions. There is no OR,
//! no expression and no cross-kind join.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::threads::ThreadKind;

/// Condition operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "in")]
    In,
    /// Inclusive on both ends
    #[serde(rename = "between")]
    Between,
    #[serde(rename = "exists")]
    Exists,
    /// Substring on strings, membership on arrays
    #[serde(rename = "contains")]
    Contains,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::In => "in",
            Operator::Between => "between",
            Operator::Exists => "exists",
            Operator::Contains => "contains",
        }
    }

    /// Operators that pin a query to an explicit scope
    pub fn is_scoping(&self) -> bool {
        matches!(self, Operator::Eq | Operator::In)
    }
}

fn exists_default() -> Value {
    Value::Bool(true)
}

/// A single `(field, operator, value)` condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub op: Operator,
    #[serde(default = "exists_default")]
    pub value: Value,
}

impl Condition {
    pub fn new(field: impl Into<String>, op: Operator, value: Value) -> Self {
        Self {
            field: field.into(),
            op,
            value,
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::Eq, value.into())
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::Ne, value.into())
    }

    pub fn in_list<V: Into<Value>>(field: impl Into<String>, values: Vec<V>) -> Self {
        Self::new(
            field,
            Operator::In,
            Value::Array(values.into_iter().map(Into::into).collect()),
        )
    }

    pub fn between(field: impl Into<String>, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Self::new(
            field,
            Operator::Between,
            Value::Array(vec![low.into(), high.into()]),
        )
    }

    pub fn exists(field: impl Into<String>, present: bool) -> Self {
        Self::new(field, Operator::Exists, Value::Bool(present))
    }

    pub fn contains(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::Contains, value.into())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Parsed or deserialized TQL query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TqlQuery {
    pub from: ThreadKind,
    #[serde(default, rename = "where")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_by: Option<OrderBy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<String>,
    /// Projection; empty means every whitelisted field
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub show: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl TqlQuery {
    pub fn new(from: ThreadKind) -> Self {
        Self {
            from,
            conditions: Vec::new(),
            order_by: None,
            group_by: None,
            show: Vec::new(),
            limit: None,
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Scopes the query to one sphere
    pub fn in_sphere(self, sphere: impl Into<String>) -> Self {
        let sphere: String = sphere.into();
        self.with_condition(Condition::eq("sphere_id", sphere))
    }

    pub fn with_order(mut self, order: OrderBy) -> Self {
        self.order_by = Some(order);
        self
    }

    pub fn with_group(mut self, field: impl Into<String>) -> Self {
        self.group_by = Some(field.into());
        self
    }

    pub fn with_show(mut self, fields: &[&str]) -> Self {
        self.show = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Every field name the query mentions, in clause order
    pub fn referenced_fields(&self) -> Vec<&str> {
        self.conditions
            .iter()
            .map(|c| c.field.as_str())
            .chain(self.order_by.iter().map(|o| o.field.as_str()))
            .chain(self.group_by.iter().map(String::as_str))
            .chain(self.show.iter().map(String::as_str))
            .collect()
    }
}

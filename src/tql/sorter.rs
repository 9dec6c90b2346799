//! Deterministic ordering of thread views

use std::cmp::Ordering;

use serde_json::Value;

use super::ast::{OrderBy, SortDirection};
use crate::threads::ThreadView;

/// Sorts thread views
pub struct ViewSorter;

impl ViewSorter {
    /// Stable sort on one whitelisted field
    pub fn sort(views: &mut [ThreadView], order: &OrderBy) {
        views.sort_by(|a, b| {
            let ordering = Self::compare_values(a.get(&order.field), b.get(&order.field));
            match order.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });
    }

    /// Ordering rules:
    /// - missing < null < bool < number < string < array
    /// - natural ordering within a type
    fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
        match (a, b) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a_val), Some(b_val)) => {
                let type_order = |v: &Value| -> u8 {
                    match v {
                        Value::Null => 0,
                        Value::Bool(_) => 1,
                        Value::Number(_) => 2,
                        Value::String(_) => 3,
                        Value::Array(_) => 4,
                        Value::Object(_) => 5,
                    }
                };

                let a_type = type_order(a_val);
                let b_type = type_order(b_val);
                if a_type != b_type {
                    return a_type.cmp(&b_type);
                }

                match (a_val, b_val) {
                    (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
                    (Value::Number(x), Value::Number(y)) => {
                        let x = x.as_f64().unwrap_or(0.0);
                        let y = y.as_f64().unwrap_or(0.0);
                        x.partial_cmp(&y).unwrap_or(Ordering::Equal)
                    }
                    (Value::String(x), Value::String(y)) => x.cmp(y),
                    // sphere_id lists compare element-wise
                    (Value::Array(x), Value::Array(y)) => {
                        for (xi, yi) in x.iter().zip(y.iter()) {
                            let o = Self::compare_values(Some(xi), Some(yi));
                            if o != Ordering::Equal {
                                return o;
                            }
                        }
                        x.len().cmp(&y.len())
                    }
                    _ => Ordering::Equal,
                }
            }
        }
    }
}
